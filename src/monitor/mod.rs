//! Run heartbeats
//!
//! After a successful tick the orchestrator records when the job last
//! succeeded together with an alert threshold. An external checker raises an
//! alert once `now - lastSuccess` exceeds the threshold.

use crate::{HarvestError, HarvestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Receives freshness heartbeats
pub trait Monitor: Send + Sync {
    fn record_last_success(&self, key: &str, timestamp: i64, threshold: u64) -> HarvestResult<()>;
}

/// One heartbeat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub last_success: i64,
    /// Seconds after `last_success` at which the job counts as stale
    pub threshold: u64,
}

impl Heartbeat {
    pub fn is_stale(&self, now: i64) -> bool {
        now - self.last_success > self.threshold as i64
    }
}

/// Heartbeats kept in a JSON file mapping key to [`Heartbeat`]
///
/// Several jobs may share the file; each only rewrites its own key.
#[derive(Debug)]
pub struct FileMonitor {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMonitor {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Reads every heartbeat in the file
    pub fn load(&self) -> HarvestResult<BTreeMap<String, Heartbeat>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Monitor for FileMonitor {
    fn record_last_success(&self, key: &str, timestamp: i64, threshold: u64) -> HarvestResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| HarvestError::Monitor("heartbeat lock poisoned".to_string()))?;

        let mut heartbeats = self.load()?;
        heartbeats.insert(
            key.to_string(),
            Heartbeat {
                last_success: timestamp,
                threshold,
            },
        );

        // Write-then-rename so readers never see a truncated file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&heartbeats)?)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(key, timestamp, threshold, "Recorded heartbeat");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_load() {
        let dir = TempDir::new().unwrap();
        let monitor = FileMonitor::new(dir.path().join("heartbeat.json"));

        monitor.record_last_success("telegram_projects", 1000, 90).unwrap();
        monitor.record_last_success("twitter_projects", 2000, 30).unwrap();
        monitor.record_last_success("telegram_projects", 1500, 90).unwrap();

        let heartbeats = monitor.load().unwrap();
        assert_eq!(heartbeats.len(), 2);
        assert_eq!(
            heartbeats["telegram_projects"],
            Heartbeat {
                last_success: 1500,
                threshold: 90
            }
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let monitor = FileMonitor::new(dir.path().join("absent.json"));
        assert!(monitor.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heartbeat.json");
        FileMonitor::new(path.clone())
            .record_last_success("job", 10, 5)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw["job"]["lastSuccess"], 10);
        assert_eq!(raw["job"]["threshold"], 5);
    }

    #[test]
    fn test_staleness() {
        let beat = Heartbeat {
            last_success: 100,
            threshold: 50,
        };
        assert!(!beat.is_stale(150));
        assert!(beat.is_stale(151));
    }
}
