//! Credential lookup per slot
//!
//! Replaces one hard-wired login routine per account with a single lookup
//! keyed by slot index.

use crate::config::AccountConfig;
use crate::platform::Credentials;
use std::collections::HashMap;

/// Prefix of credential environment variables
pub const ENV_PREFIX: &str = "HARVEST";

/// Looks up the credential set bound to a slot
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, slot: usize) -> Option<Credentials>;
}

/// Credentials listed in the `[[accounts]]` tables of the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    accounts: HashMap<usize, Credentials>,
}

impl ConfigCredentials {
    pub fn from_accounts(accounts: &[AccountConfig]) -> Self {
        let accounts = accounts
            .iter()
            .map(|account| {
                (
                    account.slot,
                    Credentials {
                        username: account.username.clone(),
                        password: account.password.clone(),
                        email: account.email.clone(),
                        email_password: account.email_password.clone(),
                    },
                )
            })
            .collect();
        Self { accounts }
    }
}

impl CredentialSource for ConfigCredentials {
    fn credentials(&self, slot: usize) -> Option<Credentials> {
        self.accounts.get(&slot).cloned()
    }
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Credentials read from the environment
///
/// Slot `n` uses `HARVEST_USERNAME_V{n}` and `HARVEST_EMAIL_V{n}`; the
/// password `HARVEST_PASSWORD_ALL` and `HARVEST_EMAIL_PASSWORD` are shared by
/// every slot.
pub struct EnvCredentials {
    lookup: Lookup,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Uses `lookup` instead of the process environment
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}_{}", ENV_PREFIX, name)).filter(|v| !v.is_empty())
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self, slot: usize) -> Option<Credentials> {
        Some(Credentials {
            username: self.var(&format!("USERNAME_V{}", slot))?,
            password: self.var("PASSWORD_ALL")?,
            email: self.var(&format!("EMAIL_V{}", slot)),
            email_password: self.var("EMAIL_PASSWORD"),
        })
    }
}

/// Tries each source in order
#[derive(Default)]
pub struct ChainedCredentials {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl ChainedCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl CredentialSource for ChainedCredentials {
    fn credentials(&self, slot: usize) -> Option<Credentials> {
        self.sources.iter().find_map(|source| source.credentials(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(slot: usize, username: &str) -> AccountConfig {
        AccountConfig {
            slot,
            username: username.to_string(),
            password: "pw".to_string(),
            email: None,
            email_password: None,
        }
    }

    fn env(vars: &'static [(&'static str, &'static str)]) -> EnvCredentials {
        EnvCredentials::with_lookup(move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        })
    }

    #[test]
    fn test_config_credentials() {
        let source = ConfigCredentials::from_accounts(&[account(0, "zero"), account(3, "three")]);
        assert_eq!(source.credentials(3).unwrap().username, "three");
        assert!(source.credentials(1).is_none());
    }

    #[test]
    fn test_env_credentials() {
        let source = env(&[
            ("HARVEST_USERNAME_V2", "bot2"),
            ("HARVEST_EMAIL_V2", "bot2@example.com"),
            ("HARVEST_PASSWORD_ALL", "shared"),
        ]);

        let creds = source.credentials(2).unwrap();
        assert_eq!(creds.username, "bot2");
        assert_eq!(creds.password, "shared");
        assert_eq!(creds.email.as_deref(), Some("bot2@example.com"));
        assert!(creds.email_password.is_none());

        assert!(source.credentials(5).is_none());
    }

    #[test]
    fn test_env_requires_password() {
        let source = env(&[("HARVEST_USERNAME_V1", "bot1")]);
        assert!(source.credentials(1).is_none());
    }

    #[test]
    fn test_chain_prefers_first_source() {
        let chain = ChainedCredentials::new()
            .with(ConfigCredentials::from_accounts(&[account(1, "from-config")]))
            .with(env(&[
                ("HARVEST_USERNAME_V1", "from-env"),
                ("HARVEST_USERNAME_V2", "env-only"),
                ("HARVEST_PASSWORD_ALL", "pw"),
            ]));

        assert_eq!(chain.credentials(1).unwrap().username, "from-config");
        assert_eq!(chain.credentials(2).unwrap().username, "env-only");
        assert!(chain.credentials(3).is_none());
    }
}
