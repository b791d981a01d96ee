use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::models::DEFAULT_FEED_KEY;

const APP_NAME: &str = "release-tracker";
const CONFIG_FILE: &str = "config.json";

/// Public Microsoft release-plans feed.
pub const DEFAULT_FEED_URL: &str = "https://releaseplans.microsoft.com/en-US/allreleaseplans/";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 ReleaseTracker/0.1";

/// Where and how to fetch the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Key under which snapshots of this feed are stored.
    pub key: String,
    pub url: String,
    /// Hard stop for pagination.
    pub max_pages: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_FEED_KEY.to_string(),
            url: DEFAULT_FEED_URL.to_string(),
            max_pages: 10,
            timeout_secs: 90,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Default lifetime of a cached feed: four hours.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 4 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub feed: FeedConfig,
    /// Saved copy of the feed used when the network fetch fails.
    pub fallback_path: Option<PathBuf>,
    /// SQLite database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// How long a fetched feed is reused before fetching again.
    pub cache_ttl_secs: u64,
    /// Never touch the network; read only the fallback file.
    pub offline: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            fallback_path: Some(PathBuf::from("releaseplans.json")),
            database_path: None,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            offline: false,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the user's config directory, then apply
    /// environment overrides. Falls back to defaults if the file doesn't exist
    /// or fails to parse.
    pub fn load() -> Self {
        let mut config = match Self::try_load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn try_load() -> Result<Self> {
        let config_path = get_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config = serde_json::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Override fields from `RELEASE_TRACKER_*` variables. Unparseable values
    /// are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("RELEASE_TRACKER_FEED_URL") {
            self.feed.url = url;
        }
        if let Some(path) = lookup("RELEASE_TRACKER_FALLBACK_PATH") {
            self.fallback_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(path) = lookup("RELEASE_TRACKER_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(ttl) = parse_env(&lookup, "RELEASE_TRACKER_CACHE_TTL_SECS") {
            self.cache_ttl_secs = ttl;
        }
        if let Some(pages) = parse_env(&lookup, "RELEASE_TRACKER_MAX_PAGES") {
            self.feed.max_pages = pages;
        }
        if let Some(secs) = parse_env(&lookup, "RELEASE_TRACKER_TIMEOUT_SECS") {
            self.feed.timeout_secs = secs;
        }
        if let Some(offline) = parse_env(&lookup, "RELEASE_TRACKER_OFFLINE") {
            self.offline = offline;
        }
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

fn get_config_path() -> Result<PathBuf> {
    let mut path =
        config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(CONFIG_FILE);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_public_feed() {
        let config = TrackerConfig::default();
        assert_eq!(config.feed.url, DEFAULT_FEED_URL);
        assert_eq!(config.feed.max_pages, 10);
        assert_eq!(config.cache_ttl_secs, 14_400);
        assert!(!config.offline);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = TrackerConfig::default();
        config.apply_env(env(&[
            ("RELEASE_TRACKER_FEED_URL", "http://localhost:9000/feed"),
            ("RELEASE_TRACKER_CACHE_TTL_SECS", "60"),
            ("RELEASE_TRACKER_FALLBACK_PATH", ""),
            ("RELEASE_TRACKER_OFFLINE", "true"),
        ]));

        assert_eq!(config.feed.url, "http://localhost:9000/feed");
        assert_eq!(config.cache_ttl_secs, 60);
        assert!(config.fallback_path.is_none());
        assert!(config.offline);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = TrackerConfig::default();
        config.apply_env(env(&[("RELEASE_TRACKER_MAX_PAGES", "lots")]));
        assert_eq!(config.feed.max_pages, 10);
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"feed": {"max_pages": 3}, "offline": true}"#).unwrap();
        assert_eq!(config.feed.max_pages, 3);
        assert_eq!(config.feed.url, DEFAULT_FEED_URL);
        assert!(config.offline);
    }
}
