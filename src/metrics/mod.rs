//! Point-in-time metric logs
//!
//! Content items carry an `impressionLogs` map and actors a `countLogs` map,
//! both keyed by the crawl wall-clock time (seconds, stringified). This module
//! only decides whether a fresh snapshot is attached to a newly built document;
//! merging with previously stored snapshots is done by the store's
//! sub-map merge on upsert.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Field holding snapshots on content items
pub const IMPRESSION_LOGS: &str = "impressionLogs";

/// Field holding snapshots on actors
pub const COUNT_LOGS: &str = "countLogs";

/// Field holding membership snapshots on crawl states
pub const MEMBER_LOGS: &str = "memberLogs";

/// Engagement counters of a content item at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpressionMetrics {
    pub views: u64,
    pub likes: u64,
    pub replies: u64,
    pub shares: u64,
}

impl ImpressionMetrics {
    pub fn to_value(&self) -> Value {
        json!({
            "views": self.views,
            "likes": self.likes,
            "replies": self.replies,
            "shares": self.shares,
        })
    }
}

/// Cumulative counters of an actor (followers, friends, posts, ...)
pub type CountMetrics = BTreeMap<String, u64>;

/// Converts cumulative counters into a snapshot value
pub fn counts_to_value(counts: &CountMetrics) -> Value {
    Value::Object(
        counts
            .iter()
            .map(|(name, count)| (name.clone(), Value::from(*count)))
            .collect(),
    )
}

/// Returns true when an item observed at `timestamp` is still inside the
/// active window at `now`
///
/// Missing timestamps and timestamps in the future never qualify.
pub fn within_period(timestamp: Option<i64>, now: i64, period: i64) -> bool {
    match timestamp {
        Some(ts) if ts <= now => now - ts < period,
        _ => false,
    }
}

/// Attaches `snapshot` under `doc[field][now]` if the item is inside the window
///
/// Returns whether a snapshot was attached.
///
/// # Example
///
/// ```
/// use serde_json::{json, Map};
/// use social_harvest::metrics::{attach_snapshot, IMPRESSION_LOGS};
///
/// let mut doc = Map::new();
/// assert!(attach_snapshot(&mut doc, IMPRESSION_LOGS, Some(1000), 1050, 100, json!({"views": 3})));
/// assert_eq!(doc[IMPRESSION_LOGS], json!({"1050": {"views": 3}}));
/// ```
pub fn attach_snapshot(
    doc: &mut Map<String, Value>,
    field: &str,
    timestamp: Option<i64>,
    now: i64,
    period: i64,
    snapshot: Value,
) -> bool {
    if !within_period(timestamp, now, period) {
        return false;
    }

    let mut log = Map::new();
    log.insert(now.to_string(), snapshot);
    doc.insert(field.to_string(), Value::Object(log));
    true
}
