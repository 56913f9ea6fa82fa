//! Failure classification and backoff
//!
//! Every unit of per-target work runs inside [`BackoffController::guard`].
//! Rate limits sleep for the requested duration and other failures sleep a
//! short cooldown; in both cases the target is left for the next tick. Only a
//! lost document store is handed back to the caller, since no later target
//! could be written either.

use crate::platform::{PlatformError, Target};
use crate::store::StoreError;
use crate::HarvestError;
use regex::Regex;
use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::sleep;

/// Cooldown after a failure that is not a rate limit
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

fn wait_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"A wait of (\d+) seconds is required").expect("valid wait regex")
    })
}

/// Extracts the wait embedded in a flood-control message
///
/// # Example
///
/// ```
/// use social_harvest::backoff::parse_wait;
/// use std::time::Duration;
///
/// assert_eq!(
///     parse_wait("A wait of 42 seconds is required (caused by GetHistoryRequest)"),
///     Some(Duration::from_secs(42))
/// );
/// assert_eq!(parse_wait("connection reset"), None);
/// ```
pub fn parse_wait(message: &str) -> Option<Duration> {
    wait_pattern()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// How a per-target failure is handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// The platform requires a wait before the next request
    RateLimited(Duration),
    /// The session's credentials stopped working
    AuthRevoked(String),
    /// The document store cannot be reached; the run cannot continue
    StoreUnavailable,
    /// Anything else: network, decoding, bad document, missing entity
    Other,
}

pub fn classify(error: &HarvestError) -> FailureClass {
    match error {
        HarvestError::Auth { reason, .. } => FailureClass::AuthRevoked(reason.clone()),
        HarvestError::Platform(PlatformError::Auth(reason)) => {
            FailureClass::AuthRevoked(reason.clone())
        }
        HarvestError::Platform(PlatformError::RateLimited {
            wait: Some(wait), ..
        }) => FailureClass::RateLimited(*wait),
        HarvestError::Store(
            StoreError::Database(_) | StoreError::Sqlite(_) | StoreError::Io(_),
        ) => FailureClass::StoreUnavailable,
        other => match parse_wait(&other.to_string()) {
            Some(wait) => FailureClass::RateLimited(wait),
            None => FailureClass::Other,
        },
    }
}

/// Result of one guarded unit of work
#[derive(Debug)]
pub enum TargetOutcome<T> {
    Completed(T),
    /// Slept for the requested wait; retried next tick
    RateLimited { waited: Duration },
    /// Failed for another reason; retried next tick
    Skipped,
    /// The slot's session is no longer usable
    AuthRevoked(String),
    /// The store failed; the run must stop
    StoreUnavailable(HarvestError),
}

/// Applies the backoff policy around per-target work
#[derive(Debug, Clone)]
pub struct BackoffController {
    cooldown: Duration,
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl BackoffController {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    /// Runs `work` for `target` and absorbs its failure
    ///
    /// Store outages come back as [`TargetOutcome::StoreUnavailable`] without
    /// sleeping.
    ///
    /// There is no in-process retry: a rate-limited target is attempted again
    /// on the next tick.
    pub async fn guard<T, F>(&self, target: &Target, work: F) -> TargetOutcome<T>
    where
        F: Future<Output = Result<T, HarvestError>>,
    {
        let error = match work.await {
            Ok(value) => return TargetOutcome::Completed(value),
            Err(e) => e,
        };

        match classify(&error) {
            FailureClass::RateLimited(wait) => {
                tracing::warn!(
                    handle = %target,
                    wait_secs = wait.as_secs(),
                    "Rate limited, sleeping before next target"
                );
                sleep(wait).await;
                TargetOutcome::RateLimited { waited: wait }
            }
            FailureClass::AuthRevoked(reason) => {
                tracing::error!(handle = %target, reason = %reason, "Session credentials rejected");
                TargetOutcome::AuthRevoked(reason)
            }
            FailureClass::StoreUnavailable => {
                tracing::error!(handle = %target, error = %error, "Document store unavailable");
                TargetOutcome::StoreUnavailable(error)
            }
            FailureClass::Other => {
                tracing::warn!(handle = %target, error = %error, "Target failed, skipping");
                sleep(self.cooldown).await;
                TargetOutcome::Skipped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use tokio::time::Instant;

    fn target() -> Target {
        Target::new(Platform::Telegram, "chan")
    }

    fn flood(message: &str) -> HarvestError {
        HarvestError::Platform(PlatformError::Api {
            status: 420,
            message: message.to_string(),
        })
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&flood("A wait of 42 seconds is required")),
            FailureClass::RateLimited(Duration::from_secs(42))
        );
        assert_eq!(
            classify(&HarvestError::Platform(PlatformError::RateLimited {
                wait: Some(Duration::from_secs(7)),
                message: String::new(),
            })),
            FailureClass::RateLimited(Duration::from_secs(7))
        );
        assert_eq!(
            classify(&HarvestError::Platform(PlatformError::Auth("revoked".into()))),
            FailureClass::AuthRevoked("revoked".into())
        );
        assert_eq!(
            classify(&HarvestError::Store(StoreError::Database("locked".into()))),
            FailureClass::StoreUnavailable
        );
        assert_eq!(
            classify(&HarvestError::Store(StoreError::MissingId("posts".into()))),
            FailureClass::Other
        );
    }

    #[test]
    fn test_rate_limit_without_wait_is_other() {
        let error = HarvestError::Platform(PlatformError::RateLimited {
            wait: None,
            message: "slow down".into(),
        });
        assert_eq!(classify(&error), FailureClass::Other);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sleeps_requested_wait() {
        let controller = BackoffController::default();
        let start = Instant::now();

        let outcome: TargetOutcome<()> = controller
            .guard(&target(), async {
                Err(flood("A wait of 42 seconds is required"))
            })
            .await;

        let elapsed = start.elapsed();
        assert!(matches!(
            outcome,
            TargetOutcome::RateLimited { waited } if waited == Duration::from_secs(42)
        ));
        assert!(elapsed >= Duration::from_secs(42));
        assert!(elapsed < Duration::from_secs(43));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_failure_sleeps_cooldown() {
        let controller = BackoffController::default();
        let start = Instant::now();

        let outcome: TargetOutcome<()> = controller
            .guard(&target(), async {
                Err(HarvestError::Registry("boom".into()))
            })
            .await;

        let elapsed = start.elapsed();
        assert!(matches!(outcome, TargetOutcome::Skipped));
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_does_not_sleep() {
        let controller = BackoffController::default();
        let start = Instant::now();

        let outcome = controller.guard(&target(), async { Ok(5) }).await;

        assert!(matches!(outcome, TargetOutcome::Completed(5)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_revoked_does_not_sleep() {
        let controller = BackoffController::default();
        let start = Instant::now();

        let outcome: TargetOutcome<()> = controller
            .guard(&target(), async {
                Err(HarvestError::Auth {
                    slot: 2,
                    reason: "banned".into(),
                })
            })
            .await;

        assert!(matches!(outcome, TargetOutcome::AuthRevoked(reason) if reason == "banned"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_outage_is_returned_without_sleeping() {
        let controller = BackoffController::default();
        let start = Instant::now();

        let outcome: TargetOutcome<()> = controller
            .guard(&target(), async {
                Err(HarvestError::Store(StoreError::Database(
                    "connection lost".into(),
                )))
            })
            .await;

        assert!(matches!(
            outcome,
            TargetOutcome::StoreUnavailable(HarvestError::Store(StoreError::Database(_)))
        ));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
