//! Social-Harvest: an incremental social-platform harvester
//!
//! This crate pulls channel membership, messages, profiles, posts and follow
//! edges for a monitored set of targets, normalizes the nested platform payloads
//! into flat time-stamped documents and upserts them into a document store,
//! tracking per-target crawl progress across runs.

pub mod accounts;
pub mod backoff;
pub mod config;
pub mod crawl;
pub mod metrics;
pub mod monitor;
pub mod normalize;
pub mod output;
pub mod platform;
pub mod registry;
pub mod store;
pub mod window;

use thiserror::Error;

/// Main error type for Social-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] platform::PlatformError),

    #[error("Authentication failed for slot {slot}: {reason}")]
    Auth { slot: usize, reason: String },

    #[error("No credentials configured for slot {slot}")]
    MissingCredentials { slot: usize },

    #[error("Target registry error: {0}")]
    Registry(String),

    #[error("Monitor error: {0}")]
    Monitor(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Social-Harvest operations
pub type HarvestResult<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawl::Orchestrator;
pub use normalize::{normalize, RawValue};
pub use platform::{Platform, StreamKind, Target};
