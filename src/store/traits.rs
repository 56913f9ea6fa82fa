//! Store traits and error types
//!
//! This module defines the interface of the document store used by the
//! harvester, the filter language accepted by `find`, and the run ledger.

use crate::store::{Document, RunRecord, RunStatus, RunSummary};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document in collection '{0}' has no string _id")]
    MissingId(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// How an upsert combines a new document with the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// The new document replaces the stored one
    Replace,
    /// Objects are merged recursively: new values win, stored keys absent
    /// from the new document are kept
    MergeSubmaps,
}

/// One condition of a [`Filter`]
///
/// Field paths use dots for nesting (`settings.platform`).
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    Gte(String, Value),
    Exists(String, bool),
}

/// A conjunction of conditions with an optional result limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub limit: Option<usize>,
}

impl Filter {
    /// A filter matching every document
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.to_string(), value.into()));
        self
    }

    pub fn ne(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Ne(field.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Gte(field.to_string(), value.into()));
        self
    }

    pub fn exists(mut self, field: &str, exists: bool) -> Self {
        self.conditions.push(Condition::Exists(field.to_string(), exists));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A collection-oriented document store
///
/// Implementations must make each document's upsert atomic; nothing else is
/// assumed about concurrent writers.
pub trait DocumentStore: Send + Sync {
    /// Upserts documents keyed by their `_id` field
    ///
    /// # Arguments
    ///
    /// * `collection` - Target collection
    /// * `documents` - Documents to write; each must carry a string `_id`
    /// * `policy` - How to combine with an existing document
    ///
    /// # Returns
    ///
    /// The number of documents written
    fn upsert(
        &self,
        collection: &str,
        documents: &[Document],
        policy: MergePolicy,
    ) -> StoreResult<usize>;

    /// Finds documents matching `filter`, in `_id` order
    ///
    /// With a projection only the listed top-level fields (plus `_id`) are
    /// returned.
    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> StoreResult<Vec<Document>>;

    /// Finds the first document matching `filter`
    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Document>> {
        let filter = filter.clone().limit(1);
        Ok(self.find(collection, &filter, None)?.into_iter().next())
    }

    /// Gets a document by `_id`
    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Counts documents matching `filter`
    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Lists collections with their document counts
    fn collections(&self) -> StoreResult<Vec<(String, u64)>>;
}

/// Records one row per harvest tick
pub trait RunLedger: Send + Sync {
    /// Opens a run and returns its ID
    fn create_run(&self, config_hash: &str) -> StoreResult<i64>;

    /// Closes a run with its final status and counts
    fn finish_run(&self, run_id: i64, status: RunStatus, summary: &RunSummary)
        -> StoreResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StoreResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn latest_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>>;
}
