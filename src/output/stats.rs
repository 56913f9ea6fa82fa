//! Statistics from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! document counts and recent runs for `--stats`.

use crate::store::{DocumentStore, RunLedger, RunRecord};
use crate::HarvestResult;

/// Number of runs shown by `--stats`
pub const RECENT_RUNS: usize = 10;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Document count per collection, sorted by name
    pub collections: Vec<(String, u64)>,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

impl HarvestStatistics {
    pub fn total_documents(&self) -> u64 {
        self.collections.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from the store and run ledger
pub fn load_statistics(
    store: &dyn DocumentStore,
    ledger: &dyn RunLedger,
) -> HarvestResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        collections: store.collections()?,
        recent_runs: ledger.latest_runs(RECENT_RUNS)?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Collections:");
    if stats.collections.is_empty() {
        println!("  (none)");
    }
    for (collection, count) in &stats.collections {
        println!("  {:<28} {}", collection, count);
    }
    println!("  Total documents: {}", stats.total_documents());
    println!();

    println!("Recent Runs:");
    if stats.recent_runs.is_empty() {
        println!("  (none)");
    }
    for run in &stats.recent_runs {
        let summary = run
            .summary
            .as_ref()
            .map(|s| {
                format!(
                    "{}/{} completed, {} rate-limited, {} skipped, {} auth-failed, {} documents",
                    s.completed, s.targets, s.rate_limited, s.skipped, s.auth_failed, s.documents
                )
            })
            .unwrap_or_else(|| "-".to_string());

        println!(
            "  #{} {} [{}] {}",
            run.id,
            run.started_at,
            run.status.to_db_string(),
            summary
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MergePolicy, RunStatus, RunSummary, SqliteStore};
    use serde_json::json;

    #[test]
    fn test_load_statistics() {
        let store = SqliteStore::new_in_memory().unwrap();
        let docs: Vec<_> = ["a", "b"]
            .iter()
            .map(|id| json!({"_id": id}).as_object().unwrap().clone())
            .collect();
        store
            .upsert("telegram_posts", &docs, MergePolicy::Replace)
            .unwrap();
        store
            .upsert("crawl_states", &docs[..1], MergePolicy::Replace)
            .unwrap();

        let run_id = store.create_run("hash").unwrap();
        store
            .finish_run(
                run_id,
                RunStatus::Completed,
                &RunSummary {
                    targets: 1,
                    completed: 1,
                    documents: 2,
                    ..Default::default()
                },
            )
            .unwrap();

        let stats = load_statistics(&store, &store).unwrap();
        assert_eq!(
            stats.collections,
            vec![
                ("crawl_states".to_string(), 1),
                ("telegram_posts".to_string(), 2)
            ]
        );
        assert_eq!(stats.total_documents(), 3);
        assert_eq!(stats.recent_runs.len(), 1);
        assert_eq!(stats.recent_runs[0].status, RunStatus::Completed);
    }
}
