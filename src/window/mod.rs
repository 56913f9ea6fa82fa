//! Incremental window tracking
//!
//! Every `(target, stream kind)` pair owns one [`CrawlState`]. A run reads
//! the previous state to compute its pagination cutoff, then immediately
//! advances `lastRunTimestamp` to the run's start time before any data is
//! written. The next run therefore pages back to `start - period`, which lets
//! a `period` wider than the tick interval absorb lag between ticks.
//!
//! Advancing at the start rather than at the end means a run that dies
//! midway still moves the window; the just-started period may then be
//! under-crawled, but a backlog can never grow without bound.

mod paginator;

pub use paginator::{Admission, Paginator};

use crate::metrics::{counts_to_value, CountMetrics, MEMBER_LOGS};
use crate::platform::{Platform, StreamKind, Target};
use crate::store::{Document, DocumentStore, MergePolicy, StoreResult, ID_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Collection holding crawl states
pub const CRAWL_STATES: &str = "crawl_states";

/// Progress record of one `(target, stream kind)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlState {
    #[serde(rename = "_id")]
    pub id: String,
    pub target: String,
    pub platform: Platform,
    pub stream_kind: StreamKind,
    /// Start time of the latest run, seconds since epoch
    pub last_run_timestamp: i64,
    /// Platform-specific counters from the latest profile check
    #[serde(default)]
    pub counters: Map<String, Value>,
    /// Snapshots of `counters` keyed by observation time
    #[serde(default)]
    pub member_logs: Map<String, Value>,
}

/// Identity of the crawl state for `target` and `kind`
pub fn state_id(target: &Target, kind: StreamKind) -> String {
    format!("{}_{}_{}", target.handle, target.platform, kind)
}

/// Reads and advances crawl states in the document store
#[derive(Clone)]
pub struct WindowTracker {
    store: Arc<dyn DocumentStore>,
    period: i64,
}

impl WindowTracker {
    /// Creates a tracker for a lookback window of `period` seconds
    pub fn new(store: Arc<dyn DocumentStore>, period: i64) -> Self {
        Self { store, period }
    }

    pub fn period(&self) -> i64 {
        self.period
    }

    /// Loads the stored state, if any
    pub fn load(&self, target: &Target, kind: StreamKind) -> StoreResult<Option<CrawlState>> {
        match self.store.get(CRAWL_STATES, &state_id(target, kind))? {
            Some(document) => Ok(Some(serde_json::from_value(Value::Object(document))?)),
            None => Ok(None),
        }
    }

    /// Oldest timestamp this run must reach
    ///
    /// Returns `None` when the pair has never been crawled, meaning pagination
    /// is unbounded.
    pub fn get_cutoff(&self, target: &Target, kind: StreamKind) -> StoreResult<Option<i64>> {
        Ok(self
            .load(target, kind)?
            .map(|state| state.last_run_timestamp - self.period))
    }

    /// Records that a run of `kind` for `target` started at `now`
    ///
    /// Counters and member logs from earlier runs are kept.
    pub fn mark_run_start(&self, target: &Target, kind: StreamKind, now: i64) -> StoreResult<()> {
        let document = header(target, kind, now);
        self.store
            .upsert(CRAWL_STATES, &[document], MergePolicy::MergeSubmaps)?;
        tracing::debug!(handle = %target, stream = %kind, now, "Advanced crawl window");
        Ok(())
    }

    /// Stores the latest counters and appends them to the member log
    ///
    /// `now` must be the same run start passed to [`Self::mark_run_start`].
    pub fn record_counters(
        &self,
        target: &Target,
        kind: StreamKind,
        counters: &CountMetrics,
        now: i64,
    ) -> StoreResult<()> {
        let snapshot = counts_to_value(counters);
        let mut log = Map::new();
        log.insert(now.to_string(), snapshot.clone());

        let mut document = header(target, kind, now);
        document.insert("counters".to_string(), snapshot);
        document.insert(MEMBER_LOGS.to_string(), Value::Object(log));

        self.store
            .upsert(CRAWL_STATES, &[document], MergePolicy::MergeSubmaps)?;
        Ok(())
    }
}

fn header(target: &Target, kind: StreamKind, now: i64) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD.to_string(), Value::String(state_id(target, kind)));
    document.insert("target".to_string(), Value::String(target.handle.clone()));
    document.insert("platform".to_string(), json!(target.platform));
    document.insert("streamKind".to_string(), json!(kind));
    document.insert("lastRunTimestamp".to_string(), json!(now));
    document
}
