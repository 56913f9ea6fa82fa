use crate::platform::{Platform, StreamKind};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Main configuration structure for Social-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub job: JobConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub targets: TargetsConfig,
}

/// Harvest job behavior
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Platform crawled by this job
    pub platform: Platform,

    /// Seconds between ticks
    pub interval: u64,

    /// Lookback window in seconds
    pub period: u64,

    /// Maximum items per target per stream and tick
    #[serde(default)]
    pub limit: Option<usize>,

    /// Streams collected for each target
    #[serde(rename = "stream-kinds")]
    pub stream_kinds: Vec<StreamKind>,

    /// Number of credential slots the target list is sharded across
    #[serde(rename = "num-accounts")]
    pub num_accounts: usize,

    /// Added to every slot index (0 for the primary pool, 10 for the secondary)
    #[serde(rename = "slot-offset", default)]
    pub slot_offset: usize,

    /// Slots owned by this process; all slots when absent
    #[serde(default)]
    pub slots: Option<Vec<usize>>,

    /// Seconds slept after a failure that is not a rate limit
    #[serde(default = "default_cooldown")]
    pub cooldown: u64,
}

fn default_cooldown() -> u64 {
    3
}

impl JobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn period_secs(&self) -> i64 {
        self.period as i64
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown)
    }

    /// Slot indices this job may ever produce
    pub fn slot_range(&self) -> std::ops::Range<usize> {
        self.slot_offset..self.slot_offset + self.num_accounts
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Platform gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Heartbeat configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub key: String,
    pub path: String,
    /// Seconds added to the interval before the heartbeat counts as stale
    #[serde(default)]
    pub grace: u64,
}

/// One credential set bound to a slot
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    pub slot: usize,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "email-password", default)]
    pub email_password: Option<String>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("slot", &self.slot)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Sources of the target list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetsConfig {
    #[serde(default)]
    pub handles: Vec<String>,

    /// JSON file holding an array of handles
    #[serde(default)]
    pub file: Option<String>,

    /// Project collection scanned for `settings.socialMedia` entries
    #[serde(default)]
    pub collection: Option<String>,

    /// Collection of KOL documents carrying `userName`
    #[serde(rename = "kol-collection", default)]
    pub kol_collection: Option<String>,

    /// Restricts the KOL collection to documents with this `elite` flag
    #[serde(default)]
    pub elite: Option<bool>,

    /// Maximum targets taken from each collection
    #[serde(rename = "batch-size", default)]
    pub batch_size: Option<usize>,
}
