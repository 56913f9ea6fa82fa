//! SQLite store implementation
//!
//! This module provides a SQLite-backed implementation of the
//! `DocumentStore` and `RunLedger` traits. The connection sits behind a
//! mutex so the store can be shared between slot workers.

use crate::store::schema::initialize_schema;
use crate::store::traits::{
    Condition, DocumentStore, Filter, MergePolicy, RunLedger, StoreError, StoreResult,
};
use crate::store::{deep_merge, Document, RunRecord, RunStatus, RunSummary, ID_FIELD};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite document store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StoreError)` - Failed to open database
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }
}

impl DocumentStore for SqliteStore {
    fn upsert(
        &self,
        collection: &str,
        documents: &[Document],
        policy: MergePolicy,
    ) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut written = 0;

        for document in documents {
            let id = document
                .get(ID_FIELD)
                .and_then(Value::as_str)
                .ok_or_else(|| StoreError::MissingId(collection.to_string()))?;

            let body = match policy {
                MergePolicy::Replace => document.clone(),
                MergePolicy::MergeSubmaps => {
                    let existing: Option<String> = tx
                        .query_row(
                            "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                            params![collection, id],
                            |row| row.get(0),
                        )
                        .optional()?;

                    match existing {
                        Some(body) => {
                            let mut stored: Document = serde_json::from_str(&body)?;
                            deep_merge(&mut stored, document.clone());
                            stored
                        }
                        None => document.clone(),
                    }
                }
            };

            tx.execute(
                "INSERT INTO documents (collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                params![collection, id, serde_json::to_string(&body)?, now],
            )?;
            written += 1;
        }

        tx.commit()?;
        Ok(written)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        projection: Option<&[&str]>,
    ) -> StoreResult<Vec<Document>> {
        let (clause, mut values) = where_clause(collection, filter);
        let mut sql = format!("SELECT body FROM documents WHERE {} ORDER BY id", clause);
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(SqlValue::Integer(limit as i64));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), |row| row.get::<_, String>(0))?;

        let mut documents = Vec::new();
        for body in rows {
            let document: Document = serde_json::from_str(&body?)?;
            documents.push(match projection {
                Some(fields) => project(document, fields),
                None => document,
            });
        }

        Ok(documents)
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let (clause, values) = where_clause(collection, filter);
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {}", clause);

        let conn = self.lock()?;
        let count: i64 = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn collections(&self) -> StoreResult<Vec<(String, u64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        let mut collections = Vec::new();
        for row in rows {
            collections.push(row?);
        }
        Ok(collections)
    }
}

impl RunLedger for SqliteStore {
    fn create_run(&self, config_hash: &str) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        summary: &RunSummary,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, summary = ?3 WHERE id = ?4",
            params![
                status.to_db_string(),
                now,
                serde_json::to_string(summary)?,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StoreResult<RunRecord> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status, summary FROM runs WHERE id = ?1",
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StoreError::RunNotFound(run_id))
    }

    fn latest_runs(&self, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status, summary
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], run_from_row)?;

        let mut runs = Vec::new();
        for run in rows {
            runs.push(run?);
        }
        Ok(runs)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let summary: Option<String> = row.get(5)?;
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        summary: summary.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

/// Builds the WHERE clause and its parameters for a filter
fn where_clause(collection: &str, filter: &Filter) -> (String, Vec<SqlValue>) {
    let mut clauses = vec!["collection = ?".to_string()];
    let mut values = vec![SqlValue::Text(collection.to_string())];

    for condition in &filter.conditions {
        match condition {
            Condition::Eq(field, value) => {
                clauses.push("json_extract(body, ?) IS ?".to_string());
                values.push(SqlValue::Text(json_path(field)));
                values.push(sql_value(value));
            }
            Condition::Ne(field, value) => {
                clauses.push("json_extract(body, ?) IS NOT ?".to_string());
                values.push(SqlValue::Text(json_path(field)));
                values.push(sql_value(value));
            }
            Condition::Gte(field, value) => {
                clauses.push("json_extract(body, ?) >= ?".to_string());
                values.push(SqlValue::Text(json_path(field)));
                values.push(sql_value(value));
            }
            Condition::Exists(field, exists) => {
                let test = if *exists { "IS NOT NULL" } else { "IS NULL" };
                clauses.push(format!("json_type(body, ?) {}", test));
                values.push(SqlValue::Text(json_path(field)));
            }
        }
    }

    (clauses.join(" AND "), values)
}

/// Converts a dotted field name into a JSON path with quoted labels
fn json_path(field: &str) -> String {
    let mut path = String::from("$");
    for segment in field.split('.') {
        path.push_str(".\"");
        path.push_str(&segment.replace('"', ""));
        path.push('"');
    }
    path
}

/// Maps a JSON value onto what `json_extract` returns for it
fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn project(mut document: Document, fields: &[&str]) -> Document {
    document.retain(|key, _| key == ID_FIELD || fields.contains(&key.as_str()));
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::IMPRESSION_LOGS;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn item(logs: Value) -> Document {
        doc(json!({"_id": "chan_1", "text": "hello", IMPRESSION_LOGS: logs}))
    }

    #[test]
    fn test_create_in_memory() {
        assert!(SqliteStore::new_in_memory().is_ok());
    }

    #[test]
    fn test_upsert_and_get() {
        let store = SqliteStore::new_in_memory().unwrap();
        let written = store
            .upsert("posts", &[doc(json!({"_id": "a", "n": 1}))], MergePolicy::Replace)
            .unwrap();
        assert_eq!(written, 1);

        let loaded = store.get("posts", "a").unwrap().unwrap();
        assert_eq!(loaded["n"], 1);
        assert!(store.get("posts", "b").unwrap().is_none());
        assert!(store.get("other", "a").unwrap().is_none());
    }

    #[test]
    fn test_same_snapshot_key_yields_one_entry() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = item(json!({"1050": {"views": 3}}));

        store.upsert("posts", &[first.clone()], MergePolicy::MergeSubmaps).unwrap();
        store.upsert("posts", &[first], MergePolicy::MergeSubmaps).unwrap();

        let loaded = store.get("posts", "chan_1").unwrap().unwrap();
        assert_eq!(loaded[IMPRESSION_LOGS].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_different_snapshot_keys_are_both_preserved() {
        let store = SqliteStore::new_in_memory().unwrap();

        store
            .upsert("posts", &[item(json!({"1050": {"views": 3}}))], MergePolicy::MergeSubmaps)
            .unwrap();
        store
            .upsert("posts", &[item(json!({"1100": {"views": 9}}))], MergePolicy::MergeSubmaps)
            .unwrap();

        let loaded = store.get("posts", "chan_1").unwrap().unwrap();
        let logs = loaded[IMPRESSION_LOGS].as_object().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs["1050"]["views"], 3);
        assert_eq!(logs["1100"]["views"], 9);
    }

    #[test]
    fn test_replace_drops_old_fields() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert("c", &[doc(json!({"_id": "x", "a": 1, "b": 2}))], MergePolicy::Replace)
            .unwrap();
        store
            .upsert("c", &[doc(json!({"_id": "x", "a": 5}))], MergePolicy::Replace)
            .unwrap();

        let loaded = store.get("c", "x").unwrap().unwrap();
        assert_eq!(loaded["a"], 5);
        assert!(!loaded.contains_key("b"));
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let store = SqliteStore::new_in_memory().unwrap();
        let result = store.upsert(
            "c",
            &[doc(json!({"_id": "ok"})), doc(json!({"name": "no id"}))],
            MergePolicy::Replace,
        );
        assert!(matches!(result, Err(StoreError::MissingId(_))));
        // The batch is written in one transaction
        assert!(store.get("c", "ok").unwrap().is_none());
    }

    #[test]
    fn test_find_with_conditions() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert(
                "kols",
                &[
                    doc(json!({"_id": "1", "userName": "alice", "elite": true, "score": 10})),
                    doc(json!({"_id": "2", "userName": "bob", "elite": false, "score": 30})),
                    doc(json!({"_id": "3", "userName": "carol", "score": 20})),
                ],
                MergePolicy::Replace,
            )
            .unwrap();

        let elite = store.find("kols", &Filter::all().eq("elite", true), None).unwrap();
        assert_eq!(elite.len(), 1);
        assert_eq!(elite[0]["userName"], "alice");

        let not_elite = store.find("kols", &Filter::all().ne("elite", true), None).unwrap();
        assert_eq!(not_elite.len(), 2);

        let high = store.find("kols", &Filter::all().gte("score", 20), None).unwrap();
        assert_eq!(high.len(), 2);

        let flagged = store
            .count("kols", &Filter::all().exists("elite", true))
            .unwrap();
        assert_eq!(flagged, 2);

        let limited = store.find("kols", &Filter::all().limit(1), None).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0]["_id"], "1");
    }

    #[test]
    fn test_find_nested_field_and_projection() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert(
                "states",
                &[doc(json!({"_id": "s", "counters": {"participants": 7}, "other": 1}))],
                MergePolicy::Replace,
            )
            .unwrap();

        let found = store
            .find(
                "states",
                &Filter::all().eq("counters.participants", 7),
                Some(&["counters"]),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].contains_key("_id"));
        assert!(found[0].contains_key("counters"));
        assert!(!found[0].contains_key("other"));

        let one = store
            .find_one("states", &Filter::all().eq("_id", "s"))
            .unwrap();
        assert!(one.is_some());
    }

    #[test]
    fn test_collections() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .upsert("b", &[doc(json!({"_id": "1"})), doc(json!({"_id": "2"}))], MergePolicy::Replace)
            .unwrap();
        store.upsert("a", &[doc(json!({"_id": "1"}))], MergePolicy::Replace).unwrap();

        assert_eq!(
            store.collections().unwrap(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_run_ledger() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = store.create_run("hash").unwrap();
        let second = store.create_run("hash").unwrap();
        assert!(second > first);

        let summary = RunSummary {
            targets: 3,
            completed: 2,
            skipped: 1,
            documents: 40,
            ..Default::default()
        };
        store.finish_run(first, RunStatus::Completed, &summary).unwrap();

        let run = store.get_run(first).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.summary, Some(summary));

        let latest = store.latest_runs(10).unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].id, second);
        assert_eq!(latest[0].status, RunStatus::Running);

        assert!(matches!(
            store.finish_run(99, RunStatus::Failed, &RunSummary::default()),
            Err(StoreError::RunNotFound(99))
        ));
    }
}
