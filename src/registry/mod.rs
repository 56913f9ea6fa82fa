//! Target registry
//!
//! Resolves the ordered list of targets for a platform. Order matters: the
//! account sharder assigns slots by list position, so every source yields a
//! stable order and the merged list keeps first occurrences.

mod sources;

pub use sources::{FileRegistry, KolRegistry, ProjectRegistry, StaticRegistry};

use crate::config::TargetsConfig;
use crate::platform::{Platform, Target};
use crate::store::DocumentStore;
use crate::HarvestResult;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Source of crawl targets
pub trait TargetRegistry: Send + Sync {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>>;
}

/// Concatenates several registries, dropping duplicate targets
#[derive(Default)]
pub struct MergedRegistry {
    sources: Vec<Box<dyn TargetRegistry>>,
}

impl MergedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl TargetRegistry + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Builds the registry described by the `[targets]` table
    pub fn from_config(config: &TargetsConfig, store: Arc<dyn DocumentStore>) -> Self {
        let mut registry = Self::new().with(StaticRegistry::new(config.handles.clone()));

        if let Some(file) = &config.file {
            registry = registry.with(FileRegistry::new(PathBuf::from(file)));
        }
        if let Some(collection) = &config.collection {
            registry = registry.with(ProjectRegistry::new(
                store.clone(),
                collection,
                config.batch_size,
            ));
        }
        if let Some(collection) = &config.kol_collection {
            registry = registry.with(KolRegistry::new(
                store,
                collection,
                config.elite,
                config.batch_size,
            ));
        }

        registry
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl TargetRegistry for MergedRegistry {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        for source in &self.sources {
            for target in source.list_targets(platform)? {
                if seen.insert(target.clone()) {
                    targets.push(target);
                }
            }
        }

        tracing::debug!(platform = %platform, count = targets.len(), "Resolved targets");
        Ok(targets)
    }
}
