//! Lazily authenticated sessions, one per slot

use crate::accounts::CredentialSource;
use crate::platform::{PlatformClient, PlatformConnector, PlatformError};
use crate::{HarvestError, HarvestResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

type SessionCell = Arc<OnceCell<Arc<dyn PlatformClient>>>;

/// Sessions authenticated during one run
///
/// A pool is created per tick and dropped at its end, so credentials revoked
/// between ticks are picked up on the next one. Authentication of different
/// slots proceeds concurrently; concurrent callers for the same slot share
/// one attempt.
pub struct SessionPool {
    connector: Arc<dyn PlatformConnector>,
    credentials: Arc<dyn CredentialSource>,
    sessions: Mutex<HashMap<usize, SessionCell>>,
}

impl SessionPool {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            connector,
            credentials,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session bound to `slot`, authenticating it on first use
    ///
    /// Rejected credentials surface as [`HarvestError::Auth`]; a failed
    /// attempt is not cached.
    pub async fn resolve_session(&self, slot: usize) -> HarvestResult<Arc<dyn PlatformClient>> {
        let cell = {
            let mut sessions = self
                .sessions
                .lock()
                .map_err(|_| HarvestError::Auth {
                    slot,
                    reason: "session pool lock poisoned".to_string(),
                })?;
            sessions.entry(slot).or_default().clone()
        };

        let session = cell
            .get_or_try_init(|| async {
                let credentials = self
                    .credentials
                    .credentials(slot)
                    .ok_or(HarvestError::MissingCredentials { slot })?;

                tracing::info!(slot, username = %credentials.username, "Authenticating session");
                self.connector
                    .authenticate(slot, &credentials)
                    .await
                    .map_err(|e| match e {
                        PlatformError::Auth(reason) => HarvestError::Auth { slot, reason },
                        other => HarvestError::Platform(other),
                    })
            })
            .await?;

        Ok(session.clone())
    }

    /// Number of slots with an authenticated session
    pub fn authenticated(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.values().filter(|cell| cell.initialized()).count())
            .unwrap_or(0)
    }
}
