use crate::config::types::{
    AccountConfig, Config, GatewayConfig, JobConfig, MonitorConfig, StoreConfig, TargetsConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_job_config(&config.job)?;
    validate_store_config(&config.store)?;
    validate_gateway_config(&config.gateway)?;
    if let Some(monitor) = &config.monitor {
        validate_monitor_config(monitor)?;
    }
    validate_accounts(&config.accounts)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates job configuration
fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
    if config.interval < 1 {
        return Err(ConfigError::Validation(
            "interval must be >= 1 second".to_string(),
        ));
    }

    if config.period < 1 {
        return Err(ConfigError::Validation(
            "period must be >= 1 second".to_string(),
        ));
    }

    if config.limit == Some(0) {
        return Err(ConfigError::Validation(
            "limit must be >= 1 when set".to_string(),
        ));
    }

    if config.stream_kinds.is_empty() {
        return Err(ConfigError::Validation(
            "stream-kinds must name at least one stream".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for kind in &config.stream_kinds {
        if !seen.insert(kind) {
            return Err(ConfigError::Validation(format!(
                "stream kind '{}' is listed twice",
                kind
            )));
        }
    }

    if config.num_accounts < 1 {
        return Err(ConfigError::Validation(format!(
            "num-accounts must be >= 1, got {}",
            config.num_accounts
        )));
    }

    if let Some(slots) = &config.slots {
        let range = config.slot_range();
        for slot in slots {
            if !range.contains(slot) {
                return Err(ConfigError::Validation(format!(
                    "slot {} is outside [{}, {})",
                    slot, range.start, range.end
                )));
            }
        }
    }

    Ok(())
}

/// Validates store configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates gateway configuration
fn validate_gateway_config(config: &GatewayConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(
            "gateway timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates monitor configuration
fn validate_monitor_config(config: &MonitorConfig) -> Result<(), ConfigError> {
    if config.key.is_empty() {
        return Err(ConfigError::Validation(
            "monitor key cannot be empty".to_string(),
        ));
    }

    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "monitor path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates account entries
fn validate_accounts(accounts: &[AccountConfig]) -> Result<(), ConfigError> {
    let mut slots = HashSet::new();

    for account in accounts {
        if account.username.is_empty() {
            return Err(ConfigError::Validation(format!(
                "account for slot {} has an empty username",
                account.slot
            )));
        }

        if !slots.insert(account.slot) {
            return Err(ConfigError::Validation(format!(
                "slot {} has more than one account",
                account.slot
            )));
        }
    }

    Ok(())
}

/// Validates target sources
fn validate_targets(config: &TargetsConfig) -> Result<(), ConfigError> {
    if config.batch_size == Some(0) {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1 when set".to_string(),
        ));
    }

    if let Some(handle) = config.handles.iter().find(|h| h.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "target handle '{}' is blank",
            handle
        )));
    }

    Ok(())
}
