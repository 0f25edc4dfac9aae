//! Configuration management for VerseMate sync

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub database: DatabaseConfig,
    pub navigation: NavigationConfig,
    /// User whose annotations are synchronized
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Bearer token issued by the auth collaborator
    pub token: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationConfig {
    /// Delay before the external address is written after the last navigate
    pub debounce_ms: u64,
    /// Wrap from the last chapter to the first and back
    pub circular: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            base_url: "https://api.versemate.org".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "sqlite:./versemate.db".to_string(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        NavigationConfig {
            debounce_ms: 1000,
            circular: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote: RemoteConfig::default(),
            database: DatabaseConfig::default(),
            navigation: NavigationConfig::default(),
            user_id: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let remote = RemoteConfig::default();
        let navigation = NavigationConfig::default();

        Ok(Config {
            remote: RemoteConfig {
                base_url: env::var("VERSEMATE_API_URL").unwrap_or(remote.base_url),
                token: env::var("VERSEMATE_API_TOKEN").ok(),
                timeout_secs: env::var("REMOTE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(remote.timeout_secs),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| DatabaseConfig::default().url),
            },
            navigation: NavigationConfig {
                debounce_ms: env::var("NAVIGATION_DEBOUNCE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(navigation.debounce_ms),
                circular: env::var("NAVIGATION_CIRCULAR")
                    .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(navigation.circular),
            },
            user_id: Some(env::var("VERSEMATE_USER_ID")?),
        })
    }
}
