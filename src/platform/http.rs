//! HTTP client for a platform scraping gateway
//!
//! The gateway fronts the platform-specific scraping libraries and exposes a
//! small JSON API per platform:
//!
//! | Request | Response |
//! |---------|----------|
//! | `POST v1/{platform}/sessions` | `{"token": ...}` |
//! | `GET v1/{platform}/targets/{handle}/profile` | `RawActor` |
//! | `GET v1/{platform}/targets/{handle}/posts?cursor=&since=` | page of `RawPost` |
//! | `GET v1/{platform}/targets/{handle}/members?cursor=` | page of `RawActor` |
//! | `GET v1/{platform}/targets/{handle}/followings?cursor=` | page of `RawActor` |
//! | `GET v1/{platform}/targets/{handle}/members/{id}` | `RawActor` or 404 |
//!
//! Pages are `{"items": [...], "nextCursor": "..."}`; a missing cursor ends
//! the sequence.

use crate::platform::client::{ItemStream, PlatformClient, PlatformConnector};
use crate::platform::types::{Credentials, Platform, RawActor, RawPost, Target};
use crate::platform::{PlatformError, PlatformResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = concat!("social-harvest/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client used to talk to the gateway
///
/// # Example
///
/// ```no_run
/// use social_harvest::platform::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    items: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Opens gateway sessions for one platform
#[derive(Debug, Clone)]
pub struct GatewayConnector {
    client: Client,
    base: Url,
    platform: Platform,
}

impl GatewayConnector {
    pub fn new(client: Client, base: Url, platform: Platform) -> Self {
        Self {
            client,
            base,
            platform,
        }
    }
}

#[async_trait]
impl PlatformConnector for GatewayConnector {
    async fn authenticate(
        &self,
        slot: usize,
        credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>> {
        let url = endpoint(&self.base, &["v1", self.platform.as_str(), "sessions"])?;
        tracing::debug!(slot, username = %credentials.username, "Opening gateway session");

        let resp = self.client.post(url).json(credentials).send().await?;
        let resp = check_status(resp).await?;
        let session: SessionResponse = resp
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;

        Ok(Arc::new(GatewaySession {
            client: self.client.clone(),
            base: self.base.clone(),
            platform: self.platform,
            token: session.token,
        }))
    }
}

/// An authenticated gateway session
#[derive(Debug, Clone)]
pub struct GatewaySession {
    client: Client,
    base: Url,
    platform: Platform,
    token: String,
}

impl GatewaySession {
    fn target_url(&self, target: &Target, tail: &[&str]) -> PlatformResult<Url> {
        let mut segments = vec!["v1", self.platform.as_str(), "targets", target.handle.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.base, &segments)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> PlatformResult<T> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        mut url: Url,
        cursor: Option<&str>,
        since: Option<i64>,
    ) -> PlatformResult<Page<T>> {
        {
            let mut query = url.query_pairs_mut();
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
            if let Some(since) = since {
                query.append_pair("since", &since.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.get_json(url).await
    }

    /// Streams every item of a cursor-paginated endpoint
    fn paged<'a, T>(&'a self, url: PlatformResult<Url>, since: Option<i64>) -> ItemStream<'a, T>
    where
        T: DeserializeOwned + Send + 'a,
    {
        let url = match url {
            Ok(url) => url,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        // State: Some(cursor) while pages remain, None once exhausted
        stream::try_unfold(Some(None::<String>), move |state| {
            let url = url.clone();
            async move {
                let Some(cursor) = state else {
                    return Ok::<_, PlatformError>(None);
                };
                let page: Page<T> = self.get_page(url, cursor.as_deref(), since).await?;
                Ok(Some((page.items, page.next_cursor.map(Some))))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}

#[async_trait]
impl PlatformClient for GatewaySession {
    async fn fetch_profile(&self, target: &Target) -> PlatformResult<RawActor> {
        let url = self.target_url(target, &["profile"])?;
        self.get_json(url).await
    }

    fn fetch_posts<'a>(
        &'a self,
        target: &'a Target,
        since: Option<i64>,
    ) -> ItemStream<'a, RawPost> {
        self.paged(self.target_url(target, &["posts"]), since)
    }

    fn fetch_members<'a>(&'a self, target: &'a Target) -> ItemStream<'a, RawActor> {
        self.paged(self.target_url(target, &["members"]), None)
    }

    fn fetch_followings<'a>(&'a self, target: &'a Target) -> ItemStream<'a, RawActor> {
        self.paged(self.target_url(target, &["followings"]), None)
    }

    async fn fetch_member(
        &self,
        target: &Target,
        user_id: &str,
    ) -> PlatformResult<Option<RawActor>> {
        let url = self.target_url(target, &["members", user_id])?;
        match self.get_json(url).await {
            Ok(actor) => Ok(Some(actor)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Appends path segments to the gateway base URL, percent-encoding each one
fn endpoint(base: &Url, segments: &[&str]) -> PlatformResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| PlatformError::Decode(format!("gateway URL {} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Maps non-success statuses onto the platform error taxonomy
async fn check_status(resp: Response) -> PlatformResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let message = resp.text().await.unwrap_or_default();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited {
            wait: retry_after,
            message,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Auth(message),
        StatusCode::NOT_FOUND => PlatformError::NotFound(message),
        _ => PlatformError::Api {
            status: status.as_u16(),
            message,
        },
    })
}
