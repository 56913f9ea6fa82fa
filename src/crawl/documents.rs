//! Builds store documents from raw platform payloads

use crate::metrics::{attach_snapshot, counts_to_value, COUNT_LOGS, IMPRESSION_LOGS};
use crate::normalize::normalize_object;
use crate::platform::{RawActor, RawPost, Target};
use crate::store::{Document, ID_FIELD};
use serde_json::{json, Value};

/// Builds documents for one target during one run
///
/// `now` is captured once per target run, so every snapshot written for the
/// target shares the same key.
#[derive(Debug, Clone)]
pub struct DocumentBuilder<'a> {
    target: &'a Target,
    now: i64,
    period: i64,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(target: &'a Target, now: i64, period: i64) -> Self {
        Self {
            target,
            now,
            period,
        }
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    /// Document identity scoped to the target
    pub fn scoped_id(&self, platform_id: &str) -> String {
        format!("{}_{}", self.target.handle, platform_id)
    }

    /// Content item keyed `{target}_{postId}`
    ///
    /// An impression snapshot is attached only while the post is younger than
    /// the period.
    pub fn post(&self, post: &RawPost) -> Document {
        let mut doc = normalize_object(&post.extra);
        let metrics = post.metrics.snapshot().to_value();

        doc.insert(ID_FIELD.to_string(), json!(self.scoped_id(&post.id)));
        self.stamp(&mut doc);
        doc.insert("postId".to_string(), json!(post.id));
        doc.insert("authorId".to_string(), json!(post.author_id));
        doc.insert("authorName".to_string(), json!(post.author_name));
        doc.insert("timestamp".to_string(), json!(post.timestamp));
        doc.insert("text".to_string(), json!(post.text));
        doc.insert("metrics".to_string(), metrics.clone());

        attach_snapshot(
            &mut doc,
            IMPRESSION_LOGS,
            post.timestamp,
            self.now,
            self.period,
            metrics,
        );
        doc
    }

    /// Actor keyed `{target}_{userId}`
    ///
    /// Counters are snapshotted at observation time, so every observed actor
    /// with counters gets a count-log entry.
    pub fn actor(&self, actor: &RawActor) -> Document {
        let mut doc = normalize_object(&actor.extra);

        doc.insert(ID_FIELD.to_string(), json!(self.scoped_id(&actor.id)));
        self.stamp(&mut doc);
        doc.insert("userId".to_string(), json!(actor.id));
        doc.insert("userName".to_string(), json!(actor.handle));
        doc.insert("displayName".to_string(), json!(actor.display_name));
        doc.insert("createdAt".to_string(), json!(actor.created_at));

        if !actor.counts.is_empty() {
            let counts = counts_to_value(&actor.counts);
            doc.insert("counts".to_string(), counts.clone());
            attach_snapshot(
                &mut doc,
                COUNT_LOGS,
                Some(self.now),
                self.now,
                self.period,
                counts,
            );
        }
        doc
    }

    /// Directed edge keyed `{from}_{to}`
    pub fn relationship(&self, from: &str, to: &str) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), json!(format!("{}_{}", from, to)));
        doc.insert("from".to_string(), json!(from));
        doc.insert("to".to_string(), json!(to));
        self.stamp(&mut doc);
        doc
    }

    /// Per-target list of followed accounts, keyed by the target handle
    pub fn followings_summary(&self, followings: Vec<String>) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD.to_string(), json!(self.target.handle));
        doc.insert("userName".to_string(), json!(self.target.handle));
        doc.insert("platform".to_string(), json!(self.target.platform));
        doc.insert("lastUpdate".to_string(), json!(self.now));
        doc.insert(
            "followings".to_string(),
            Value::Array(followings.into_iter().map(Value::String).collect()),
        );
        doc
    }

    fn stamp(&self, doc: &mut Document) {
        doc.insert("target".to_string(), json!(self.target.handle));
        doc.insert("platform".to_string(), json!(self.target.platform));
        doc.insert("lastUpdatedTime".to_string(), json!(self.now));
    }
}

/// Name used for an actor in edges and summaries
pub fn actor_ref(actor: &RawActor) -> String {
    match &actor.handle {
        Some(handle) if !handle.is_empty() => handle.to_lowercase(),
        _ => actor.id.clone(),
    }
}
