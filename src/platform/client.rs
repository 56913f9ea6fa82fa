//! Platform client capability
//!
//! The crawler only depends on these traits. Concrete clients reach a platform
//! through whatever library or service fits; the crate ships an HTTP client
//! for a scraping gateway in [`crate::platform::http`].

use crate::platform::types::{Credentials, RawActor, RawPost, Target};
use crate::platform::PlatformResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A lazy, finite sequence of items fetched page by page
pub type ItemStream<'a, T> = BoxStream<'a, PlatformResult<T>>;

/// An authenticated session on one platform
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Fetches the target's own profile
    async fn fetch_profile(&self, target: &Target) -> PlatformResult<RawActor>;

    /// Streams the target's posts newest-first
    ///
    /// `since` is a hint for sources that can filter server-side; callers
    /// still apply their own cutoff. Each call restarts from the newest post.
    fn fetch_posts<'a>(&'a self, target: &'a Target, since: Option<i64>)
        -> ItemStream<'a, RawPost>;

    /// Streams the target's members (participants or followers)
    fn fetch_members<'a>(&'a self, target: &'a Target) -> ItemStream<'a, RawActor>;

    /// Streams the accounts the target follows
    fn fetch_followings<'a>(&'a self, target: &'a Target) -> ItemStream<'a, RawActor>;

    /// Fetches one member of the target by platform user id
    async fn fetch_member(&self, target: &Target, user_id: &str)
        -> PlatformResult<Option<RawActor>>;
}

/// Creates authenticated sessions from credential sets
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    /// Authenticates a session for `slot`
    ///
    /// Invalid credentials must be reported as [`crate::platform::PlatformError::Auth`].
    async fn authenticate(
        &self,
        slot: usize,
        credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>>;
}
