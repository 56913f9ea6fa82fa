//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the platform gateway and run
//! full ticks against an on-disk SQLite store.

use serde_json::json;
use social_harvest::accounts::{ChainedCredentials, ConfigCredentials};
use social_harvest::config::{load_config_with_hash, Config};
use social_harvest::crawl::CrawlSettings;
use social_harvest::monitor::FileMonitor;
use social_harvest::platform::{build_http_client, GatewayConnector};
use social_harvest::registry::MergedRegistry;
use social_harvest::store::{open_store, DocumentStore, Filter, RunLedger, RunStatus, SqliteStore};
use social_harvest::window::WindowTracker;
use social_harvest::{Orchestrator, Platform, StreamKind, Target};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config pointing at `gateway` and returns it with its hash
fn write_config(dir: &TempDir, gateway: &str) -> (Config, String) {
    let db_path = dir.path().join("harvest.db");
    let heartbeat_path = dir.path().join("heartbeat.json");
    let config_path = dir.path().join("harvest.toml");

    let content = format!(
        r#"
[job]
platform = "telegram"
interval = 60
period = 3600
stream-kinds = ["profiles", "posts"]
num-accounts = 1
cooldown = 0

[store]
database-path = "{}"

[gateway]
base-url = "{}"
timeout = 5

[monitor]
key = "telegram_channels"
path = "{}"
grace = 30

[[accounts]]
slot = 0
username = "harvester"
password = "secret"

[targets]
handles = ["chan_a", "chan_b"]
"#,
        db_path.display(),
        gateway,
        heartbeat_path.display()
    );
    std::fs::write(&config_path, content).unwrap();

    load_config_with_hash(&config_path).unwrap()
}

fn build_orchestrator(config: &Config, hash: &str, store: Arc<SqliteStore>) -> Orchestrator {
    let client = build_http_client(Duration::from_secs(config.gateway.timeout)).unwrap();
    let connector = GatewayConnector::new(
        client,
        Url::parse(&config.gateway.base_url).unwrap(),
        config.job.platform,
    );
    let credentials =
        ChainedCredentials::new().with(ConfigCredentials::from_accounts(&config.accounts));
    let registry = MergedRegistry::from_config(&config.targets, store.clone());
    let monitor = FileMonitor::new(config.monitor.as_ref().unwrap().path.clone().into());

    Orchestrator::new(
        CrawlSettings::from_config(config, hash),
        store.clone(),
        store,
        Arc::new(registry),
        Arc::new(connector),
        Arc::new(credentials),
    )
    .with_monitor(Arc::new(monitor))
}

async fn mount_gateway(server: &MockServer) {
    let now = chrono::Utc::now().timestamp();

    Mock::given(method("POST"))
        .and(path("/v1/telegram/sessions"))
        .and(body_partial_json(json!({"username": "harvester", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-0"})))
        .expect(1..)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/telegram/targets/chan_a/profile"))
        .and(header("authorization", "Bearer tok-0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1001",
            "handle": "chan_a",
            "displayName": "Channel A",
            "counts": {"participants": 1200, "kicked": 4},
            "extra": {"_": "Channel", "about": "news", "photo": {"_": "ChatPhoto", "dc_id": 2}}
        })))
        .mount(server)
        .await;

    // Second page first so it wins over the cursorless mock below
    Mock::given(method("GET"))
        .and(path("/v1/telegram/targets/chan_a/posts"))
        .and(query_param("cursor", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "1", "timestamp": now - 300, "metrics": {"views": 7}}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/telegram/targets/chan_a/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "3",
                    "authorId": "77",
                    "timestamp": now - 100,
                    "text": "gm",
                    "metrics": {"views": 40, "likes": 2},
                    "extra": {"_": "Message", "fwd_from": null, "reply_to": {"_": "MessageReplyHeader", "reply_to_msg_id": 2}}
                },
                {"id": "2", "timestamp": now - 200, "metrics": {"views": 12}}
            ],
            "nextCursor": "page-2"
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/telegram/targets/chan_b/profile"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "0")
                .set_body_string("slow down"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_tick_harvests_and_records_run() {
    let server = MockServer::start().await;
    mount_gateway(&server).await;

    let dir = TempDir::new().unwrap();
    let (config, hash) = write_config(&dir, &server.uri());
    let store = Arc::new(open_store(Path::new(&config.store.database_path)).unwrap());
    let orchestrator = build_orchestrator(&config, &hash, store.clone());

    let summary = orchestrator.run_tick().await.unwrap();

    assert_eq!(summary.targets, 2);
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.rate_limited, 1);
    assert_eq!(summary.documents, 4);

    // Posts from both pages, normalized and scoped to the target
    assert_eq!(store.count("telegram_posts", &Filter::all()).unwrap(), 3);
    let post = store.get("telegram_posts", "chan_a_3").unwrap().unwrap();
    assert_eq!(post["target"], "chan_a");
    assert_eq!(post["type"], "Message");
    assert_eq!(post["replyTo"]["replyToMsgId"], 2);
    assert_eq!(post["metrics"]["views"], 40);
    assert_eq!(post["impressionLogs"].as_object().unwrap().len(), 1);

    // Profile with counters and a count snapshot
    let profile = store.get("telegram_actors", "chan_a_1001").unwrap().unwrap();
    assert_eq!(profile["displayName"], "Channel A");
    assert_eq!(profile["photo"]["dcId"], 2);
    assert_eq!(profile["counts"]["participants"], 1200);
    assert_eq!(profile["countLogs"].as_object().unwrap().len(), 1);

    // Crawl state advanced for the completed target
    let window = WindowTracker::new(store.clone(), config.job.period_secs());
    let target = Target::new(Platform::Telegram, "chan_a");
    let state = window.load(&target, StreamKind::Profiles).unwrap().unwrap();
    assert_eq!(state.counters["participants"], 1200);
    assert_eq!(state.member_logs.len(), 1);
    assert!(window.get_cutoff(&target, StreamKind::Posts).unwrap().is_some());

    // Ledger and heartbeat
    let runs = store.latest_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(runs[0].config_hash, hash);

    let heartbeats = FileMonitor::new(config.monitor.as_ref().unwrap().path.clone().into())
        .load()
        .unwrap();
    assert_eq!(heartbeats["telegram_channels"].threshold, 90);
}

#[tokio::test]
async fn test_second_tick_is_incremental_and_idempotent() {
    let server = MockServer::start().await;
    mount_gateway(&server).await;

    let dir = TempDir::new().unwrap();
    let (config, hash) = write_config(&dir, &server.uri());
    let store = Arc::new(open_store(Path::new(&config.store.database_path)).unwrap());
    let orchestrator = build_orchestrator(&config, &hash, store.clone());

    orchestrator.run_tick().await.unwrap();
    orchestrator.run_tick().await.unwrap();

    // Same ids on the second pass
    assert_eq!(store.count("telegram_posts", &Filter::all()).unwrap(), 3);
    assert_eq!(store.latest_runs(5).unwrap().len(), 2);

    // The second pass asks the gateway only for posts since the cutoff
    let requests = server.received_requests().await.unwrap();
    let posts_requests: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/v1/telegram/targets/chan_a/posts")
        .collect();
    assert_eq!(posts_requests.len(), 4);
    assert!(posts_requests[..2]
        .iter()
        .all(|r| !r.url.query_pairs().any(|(k, _)| k == "since")));
    assert!(posts_requests[2..]
        .iter()
        .all(|r| r.url.query_pairs().any(|(k, _)| k == "since")));
}

#[tokio::test]
async fn test_rejected_credentials_fail_slot_not_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telegram/sessions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("account banned"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (config, hash) = write_config(&dir, &server.uri());
    let store = Arc::new(open_store(Path::new(&config.store.database_path)).unwrap());
    let orchestrator = build_orchestrator(&config, &hash, store.clone());

    let summary = orchestrator.run_tick().await.unwrap();

    assert_eq!(summary.auth_failed, 2);
    assert_eq!(summary.completed, 0);
    assert!(store.collections().unwrap().is_empty());
    assert_eq!(store.latest_runs(1).unwrap()[0].status, RunStatus::Completed);
}
