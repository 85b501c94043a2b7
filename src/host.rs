//! Host services the shell consumes: who is logged in, and configuration
//! lookups for the prompt.

use crate::config::Config;
use tracing::warn;

/// The current user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub username: String,
}

pub trait Host {
    fn current_user(&self) -> User;

    /// Look up a configuration value by dotted key (`"prompt.background"`)
    fn config_value(&self, key: &str) -> Option<String>;
}

/// Host backed by the process environment and the loaded config
pub struct LocalHost {
    config: Config,
    /// Config as a TOML tree, for key lookups
    tree: toml::Value,
}

impl LocalHost {
    pub fn new(config: Config) -> Self {
        let tree = toml::Value::try_from(&config).unwrap_or_else(|e| {
            warn!("Config is not representable as TOML: {}", e);
            toml::Value::Table(Default::default())
        });
        Self { config, tree }
    }
}

impl Host for LocalHost {
    fn current_user(&self) -> User {
        let username = self
            .config
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "guest".to_string());
        User { username }
    }

    fn config_value(&self, key: &str) -> Option<String> {
        lookup(&self.tree, key)
    }
}

fn lookup(tree: &toml::Value, key: &str) -> Option<String> {
    let mut node = tree;
    for part in key.split('.') {
        node = node.get(part)?;
    }
    Some(match node {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Fixed host for tests
#[cfg(test)]
pub struct StaticHost {
    pub username: String,
    pub values: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl StaticHost {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            values: Default::default(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[cfg(test)]
impl Host for StaticHost {
    fn current_user(&self) -> User {
        User { username: self.username.clone() }
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_override() {
        let config = Config {
            user: Some("alice".to_string()),
            ..Config::default()
        };
        let host = LocalHost::new(config);
        assert_eq!(host.current_user().username, "alice");
    }

    #[test]
    fn test_config_lookup() {
        let config = Config {
            version: Some("3.1.0".to_string()),
            ..Config::default()
        };
        let host = LocalHost::new(config);

        assert_eq!(host.config_value("version").as_deref(), Some("3.1.0"));
        assert_eq!(host.config_value("prompt.background").as_deref(), Some("61"));
        assert_eq!(host.config_value("input.bracketed_paste").as_deref(), Some("true"));
        assert_eq!(host.config_value("prompt.missing"), None);
    }

    #[test]
    fn test_unset_value_is_absent() {
        let host = LocalHost::new(Config::default());
        assert_eq!(host.config_value("version"), None);
        assert_eq!(host.config_value("banner"), None);
    }
}
