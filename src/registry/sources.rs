//! Concrete target sources

use crate::platform::{Platform, Target};
use crate::registry::TargetRegistry;
use crate::store::{Document, DocumentStore, Filter};
use crate::{HarvestError, HarvestResult};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Handles listed in the config file
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    handles: Vec<String>,
}

impl StaticRegistry {
    pub fn new(handles: Vec<String>) -> Self {
        Self { handles }
    }
}

impl TargetRegistry for StaticRegistry {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>> {
        Ok(self
            .handles
            .iter()
            .map(|handle| Target::new(platform, handle))
            .collect())
    }
}

/// JSON file holding an array of handles
///
/// Entries may be plain strings or objects carrying `userName`, `handle` or
/// `id`. The file is re-read on every call.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TargetRegistry for FileRegistry {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>> {
        let content = std::fs::read_to_string(&self.path)?;
        let entries: Value = serde_json::from_str(&content)?;

        let Value::Array(entries) = entries else {
            return Err(HarvestError::Registry(format!(
                "{} must contain a JSON array",
                self.path.display()
            )));
        };

        Ok(entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(handle) => Some(handle.as_str()),
                Value::Object(fields) => ["userName", "handle", "id"]
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(Value::as_str)),
                _ => None,
            })
            .filter(|handle| !handle.trim().is_empty())
            .map(|handle| Target::new(platform, handle))
            .collect())
    }
}

/// Project documents listing their social accounts under
/// `settings.socialMedia`
///
/// Each entry whose `platform` matches contributes its `id`, or the last path
/// segment of its `url` when no id is present. Telegram entries must be
/// channels (`type == "channel"`) with a `telegramId`; groups and bots are
/// not crawled.
pub struct ProjectRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
    batch_size: Option<usize>,
}

impl ProjectRegistry {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str, batch_size: Option<usize>) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            batch_size,
        }
    }
}

impl TargetRegistry for ProjectRegistry {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>> {
        let projects = self.store.find(
            &self.collection,
            &Filter::all().exists("settings.socialMedia", true),
            Some(&["settings"]),
        )?;

        let mut targets: Vec<Target> = projects
            .iter()
            .flat_map(|project| social_handles(project, platform))
            .map(|handle| Target::new(platform, &handle))
            .collect();

        if let Some(batch_size) = self.batch_size {
            targets.truncate(batch_size);
        }
        Ok(targets)
    }
}

fn social_handles(project: &Document, platform: Platform) -> Vec<String> {
    let entries = project
        .get("settings")
        .and_then(|settings| settings.get("socialMedia"))
        .and_then(Value::as_array);

    let Some(entries) = entries else {
        return Vec::new();
    };

    entries
        .iter()
        .filter(|entry| {
            entry
                .get("platform")
                .and_then(Value::as_str)
                .is_some_and(|p| p.eq_ignore_ascii_case(platform.as_str()))
        })
        .filter(|entry| platform != Platform::Telegram || is_telegram_channel(entry))
        .filter_map(|entry| match entry.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => entry
                .get("url")
                .and_then(Value::as_str)
                .and_then(last_segment),
        })
        .collect()
}

fn is_telegram_channel(entry: &Value) -> bool {
    let is_channel = entry.get("type").and_then(Value::as_str) == Some("channel");
    let has_id = match entry.get("telegramId") {
        Some(Value::String(id)) => !id.is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    };
    is_channel && has_id
}

fn last_segment(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

/// Key-opinion-leader documents carrying `userName`
pub struct KolRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
    elite: Option<bool>,
    batch_size: Option<usize>,
}

impl KolRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        elite: Option<bool>,
        batch_size: Option<usize>,
    ) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            elite,
            batch_size,
        }
    }
}

impl TargetRegistry for KolRegistry {
    fn list_targets(&self, platform: Platform) -> HarvestResult<Vec<Target>> {
        let mut filter = match self.elite {
            Some(true) => Filter::all().eq("elite", true),
            Some(false) => Filter::all().ne("elite", true),
            None => Filter::all(),
        };
        if let Some(batch_size) = self.batch_size {
            filter = filter.limit(batch_size);
        }

        let kols = self
            .store
            .find(&self.collection, &filter, Some(&["userName"]))?;

        Ok(kols
            .iter()
            .filter_map(|kol| kol.get("userName").and_then(Value::as_str))
            .map(|handle| Target::new(platform, handle))
            .collect())
    }
}
