//! The job loop: one run per tick, one worker per owned slot

use crate::accounts::{distribute, CredentialSource, SessionPool, SlotKey};
use crate::backoff::{BackoffController, TargetOutcome};
use crate::crawl::pipeline::TargetPipeline;
use crate::crawl::CrawlSettings;
use crate::monitor::Monitor;
use crate::platform::{PlatformConnector, StreamKind, Target};
use crate::registry::TargetRegistry;
use crate::store::{DocumentStore, RunLedger, RunStatus, RunSummary};
use crate::window::WindowTracker;
use crate::HarvestResult;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;

/// Runs harvest ticks against the configured collaborators
pub struct Orchestrator {
    settings: CrawlSettings,
    store: Arc<dyn DocumentStore>,
    ledger: Arc<dyn RunLedger>,
    registry: Arc<dyn TargetRegistry>,
    connector: Arc<dyn PlatformConnector>,
    credentials: Arc<dyn CredentialSource>,
    monitor: Option<Arc<dyn Monitor>>,
}

impl Orchestrator {
    pub fn new(
        settings: CrawlSettings,
        store: Arc<dyn DocumentStore>,
        ledger: Arc<dyn RunLedger>,
        registry: Arc<dyn TargetRegistry>,
        connector: Arc<dyn PlatformConnector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            settings,
            store,
            ledger,
            registry,
            connector,
            credentials,
            monitor: None,
        }
    }

    /// Records a heartbeat after every completed run
    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Runs a single tick to completion
    pub async fn run_tick(&self) -> HarvestResult<RunSummary> {
        let (_shutdown_tx, shutdown) = watch::channel(false);
        self.tick(&shutdown).await
    }

    /// Ticks every `interval` until `shutdown` becomes true
    ///
    /// A failed run is logged and the loop carries on with the next tick.
    /// Shutdown is observed between targets; the current target finishes
    /// first, and a run that left targets behind is recorded as interrupted.
    pub async fn run_forever(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.tick(&shutdown).await {
                Ok(summary) => tracing::info!(
                    completed = summary.completed,
                    targets = summary.targets,
                    "Tick finished, next in {}s",
                    self.settings.interval.as_secs()
                ),
                Err(e) => tracing::error!(error = %e, "Run failed, retrying next tick"),
            }

            if is_set(&shutdown) {
                break;
            }

            tokio::select! {
                _ = sleep(self.settings.interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        tracing::info!("Job loop stopped");
    }

    async fn tick(&self, shutdown: &watch::Receiver<bool>) -> HarvestResult<RunSummary> {
        let run_id = self.ledger.create_run(&self.settings.config_hash)?;
        tracing::info!(
            run_id,
            platform = %self.settings.platform,
            "Starting run"
        );

        let report = match self.execute(shutdown).await {
            Ok(report) => report,
            Err(e) => {
                if let Err(ledger_err) =
                    self.ledger
                        .finish_run(run_id, RunStatus::Failed, &RunSummary::default())
                {
                    tracing::warn!(run_id, error = %ledger_err, "Failed to close run");
                }
                return Err(e);
            }
        };

        let summary = report.summary;
        let status = if report.interrupted {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.ledger.finish_run(run_id, status, &summary)?;

        tracing::info!(
            run_id,
            status = status.to_db_string(),
            targets = summary.targets,
            completed = summary.completed,
            rate_limited = summary.rate_limited,
            skipped = summary.skipped,
            auth_failed = summary.auth_failed,
            documents = summary.documents,
            "Run finished"
        );

        if status == RunStatus::Completed {
            self.record_heartbeat();
        }
        Ok(summary)
    }

    /// Resolves targets, shards them and waits for every slot worker
    ///
    /// The first worker that loses the store aborts the others.
    async fn execute(&self, shutdown: &watch::Receiver<bool>) -> HarvestResult<SlotReport> {
        let targets = self.registry.list_targets(self.settings.platform)?;
        if targets.is_empty() {
            tracing::warn!(platform = %self.settings.platform, "Registry returned no targets");
        }
        let slots = distribute(
            &targets,
            self.settings.num_accounts,
            self.settings.slot_offset,
        );
        tracing::info!(
            targets = targets.len(),
            slots = slots.len(),
            "Resolved targets"
        );

        let pool = Arc::new(SessionPool::new(
            self.connector.clone(),
            self.credentials.clone(),
        ));
        let window = Arc::new(WindowTracker::new(self.store.clone(), self.settings.period));
        let stream_kinds: Arc<[StreamKind]> = self.settings.stream_kinds.clone().into();

        let mut workers = JoinSet::new();
        for (slot, slot_targets) in slots {
            if !self.settings.owns(slot) {
                tracing::debug!(%slot, targets = slot_targets.len(), "Slot not owned, skipping");
                continue;
            }

            let worker = SlotWorker {
                slot,
                pool: pool.clone(),
                store: self.store.clone(),
                window: window.clone(),
                backoff: BackoffController::new(self.settings.cooldown),
                stream_kinds: stream_kinds.clone(),
                limit: self.settings.limit,
                shutdown: shutdown.clone(),
            };
            workers.spawn(worker.run(slot_targets));
        }

        let mut report = SlotReport::default();
        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(slot_report)) => report.merge(&slot_report),
                Ok(Err(e)) => {
                    if failure.is_none() {
                        workers.abort_all();
                        failure = Some(e);
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!(error = %e, "Slot worker aborted"),
            }
        }

        tracing::debug!(sessions = pool.authenticated(), "Sessions used this run");
        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn record_heartbeat(&self) {
        let (Some(monitor), Some(key)) = (&self.monitor, &self.settings.monitor_key) else {
            return;
        };

        let now = chrono::Utc::now().timestamp();
        if let Err(e) = monitor.record_last_success(key, now, self.settings.alert_threshold()) {
            tracing::warn!(key = %key, error = %e, "Failed to record heartbeat");
        }
    }
}

/// What one slot worker did this run
#[derive(Debug, Default)]
struct SlotReport {
    summary: RunSummary,
    /// Targets were left uncrawled because of shutdown
    interrupted: bool,
}

impl SlotReport {
    fn merge(&mut self, other: &SlotReport) {
        self.summary.merge(&other.summary);
        self.interrupted |= other.interrupted;
    }
}

/// Crawls one slot's share of the targets with that slot's session
struct SlotWorker {
    slot: SlotKey,
    pool: Arc<SessionPool>,
    store: Arc<dyn DocumentStore>,
    window: Arc<WindowTracker>,
    backoff: BackoffController,
    stream_kinds: Arc<[StreamKind]>,
    limit: Option<usize>,
    shutdown: watch::Receiver<bool>,
}

impl SlotWorker {
    async fn run(self, targets: Vec<Target>) -> HarvestResult<SlotReport> {
        let mut report = SlotReport {
            summary: RunSummary {
                targets: targets.len(),
                ..Default::default()
            },
            interrupted: false,
        };
        let summary = &mut report.summary;

        let client = match self.pool.resolve_session(self.slot.index()).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(
                    slot = %self.slot,
                    targets = targets.len(),
                    error = %e,
                    "Slot has no usable session, its targets are skipped this run"
                );
                summary.auth_failed = targets.len();
                return Ok(report);
            }
        };

        let pipeline = TargetPipeline::new(
            client.as_ref(),
            self.store.as_ref(),
            &self.window,
            &self.stream_kinds,
            self.limit,
        );

        for (position, target) in targets.iter().enumerate() {
            let remaining = targets.len() - position;

            if is_set(&self.shutdown) {
                tracing::info!(slot = %self.slot, remaining, "Shutdown requested, stopping slot");
                summary.skipped += remaining;
                report.interrupted = true;
                break;
            }

            tracing::debug!(slot = %self.slot, handle = %target, "Crawling target");
            let now = chrono::Utc::now().timestamp();

            match self.backoff.guard(target, pipeline.run(target, now)).await {
                TargetOutcome::Completed(report) => {
                    summary.completed += 1;
                    summary.documents += report.documents();
                }
                TargetOutcome::RateLimited { .. } => summary.rate_limited += 1,
                TargetOutcome::Skipped => summary.skipped += 1,
                TargetOutcome::AuthRevoked(reason) => {
                    tracing::error!(
                        slot = %self.slot,
                        remaining,
                        reason = %reason,
                        "Session revoked, abandoning slot for this run"
                    );
                    summary.auth_failed += remaining;
                    break;
                }
                TargetOutcome::StoreUnavailable(e) => {
                    tracing::error!(slot = %self.slot, remaining, "Stopping slot, store unavailable");
                    return Err(e);
                }
            }
        }

        Ok(report)
    }
}

fn is_set(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Resolves once shutdown is requested; never if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
