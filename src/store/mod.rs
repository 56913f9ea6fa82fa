//! Document store
//!
//! This module persists everything the harvester writes:
//! - content items, actors, relationships and followings summaries
//! - crawl states of the incremental window tracker
//! - the run ledger used for `--stats` and auditing
//!
//! Documents are JSON objects identified by a string `_id` within a
//! collection. Metric logs rely on [`MergePolicy::MergeSubmaps`] so that
//! re-crawled items gain new snapshot keys without losing old ones.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    Condition, DocumentStore, Filter, MergePolicy, RunLedger, StoreError, StoreResult,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Field holding a document's identity
pub const ID_FIELD: &str = "_id";

/// A stored document
pub type Document = Map<String, Value>;

/// Opens or creates the SQLite store at `path`
pub fn open_store(path: &Path) -> StoreResult<SqliteStore> {
    SqliteStore::new(path)
}

/// Recursively merges `incoming` into `existing`
///
/// Objects present on both sides are merged key by key; any other value from
/// `incoming` replaces the stored one.
pub fn deep_merge(existing: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        match (existing.get_mut(&key), value) {
            (Some(Value::Object(stored)), Value::Object(update)) => deep_merge(stored, update),
            (_, value) => {
                existing.insert(key, value);
            }
        }
    }
}

/// Per-run counts recorded in the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub targets: usize,
    pub completed: usize,
    pub rate_limited: usize,
    pub skipped: usize,
    pub auth_failed: usize,
    pub documents: usize,
}

impl RunSummary {
    /// Adds the counts of another slot's summary
    pub fn merge(&mut self, other: &RunSummary) {
        self.targets += other.targets;
        self.completed += other.completed;
        self.rate_limited += other.rate_limited;
        self.skipped += other.skipped;
        self.auth_failed += other.auth_failed;
        self.documents += other.documents;
    }
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub summary: Option<RunSummary>,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
