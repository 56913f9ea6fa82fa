//! Crawl orchestration
//!
//! One tick of the job loop:
//! 1. Resolve the ordered target list from the registry
//! 2. Shard it across credential slots and keep the slots this process owns
//! 3. Run one worker per slot; each worker authenticates its slot's session
//!    and crawls its targets one after another through the backoff guard
//! 4. Close the run in the ledger and record the heartbeat
//!
//! Documents are built by [`DocumentBuilder`] and written by
//! [`TargetPipeline`] in fetch, normalize, upsert order.

mod documents;
mod orchestrator;
mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use documents::{actor_ref, DocumentBuilder};
pub use orchestrator::Orchestrator;
pub use pipeline::{TargetPipeline, TargetReport, UPSERT_BATCH};

use crate::accounts::SlotKey;
use crate::config::Config;
use crate::platform::{Platform, StreamKind};
use std::time::Duration;

/// Job parameters the orchestrator runs with, resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub platform: Platform,
    pub interval: Duration,
    pub period: i64,
    pub limit: Option<usize>,
    pub stream_kinds: Vec<StreamKind>,
    pub num_accounts: usize,
    pub slot_offset: usize,
    /// Slots crawled by this process; `None` means every slot
    pub owned_slots: Option<Vec<usize>>,
    pub cooldown: Duration,
    pub config_hash: String,
    /// Heartbeat key and the grace added to `interval` for its threshold
    pub monitor_key: Option<String>,
    pub grace: Duration,
}

impl CrawlSettings {
    pub fn from_config(config: &Config, config_hash: &str) -> Self {
        let job = &config.job;
        Self {
            platform: job.platform,
            interval: job.interval(),
            period: job.period_secs(),
            limit: job.limit,
            stream_kinds: job.stream_kinds.clone(),
            num_accounts: job.num_accounts,
            slot_offset: job.slot_offset,
            owned_slots: job.slots.clone(),
            cooldown: job.cooldown(),
            config_hash: config_hash.to_string(),
            monitor_key: config.monitor.as_ref().map(|m| m.key.clone()),
            grace: Duration::from_secs(config.monitor.as_ref().map_or(0, |m| m.grace)),
        }
    }

    pub fn owns(&self, slot: SlotKey) -> bool {
        match &self.owned_slots {
            Some(slots) => slots.contains(&slot.index()),
            None => true,
        }
    }

    /// Seconds after a successful tick before the job counts as stale
    pub fn alert_threshold(&self) -> u64 {
        (self.interval + self.grace).as_secs()
    }
}
