//! Platform access
//!
//! This module defines what the crawler needs from a social platform:
//! - typed raw payloads (`RawPost`, `RawActor`) with a nested `extra` tree
//! - the `PlatformClient`/`PlatformConnector` capability traits
//! - an HTTP client for a scraping gateway that speaks JSON
//! - the platform error taxonomy

mod client;
pub mod http;
mod types;

pub use client::{ItemStream, PlatformClient, PlatformConnector};
pub use http::{build_http_client, GatewayConnector, GatewaySession};
pub use types::{
    Credentials, Platform, RawActor, RawPost, RawPostMetrics, StreamKind, Target,
};

use std::time::Duration;
use thiserror::Error;

/// Errors reported by platform clients
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Credentials were rejected; fatal for the slot holding them
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// The platform asked us to slow down
    #[error("Rate limited: {message}")]
    RateLimited {
        wait: Option<Duration>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;
