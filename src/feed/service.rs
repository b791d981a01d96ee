use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{load_fallback_file, normalize_pages, FeedCache, FeedClient, FeedError, NormalizedFeed};
use crate::config::{TrackerConfig, DEFAULT_CACHE_TTL_SECS};
use crate::models::{FeatureRecord, FeedSource};

/// A normalized feed ready for reading.
#[derive(Debug, Clone)]
pub struct LoadedFeed {
    pub records: Arc<Vec<FeatureRecord>>,
    pub source: FeedSource,
    pub skipped: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Loads the feed from the network, falling back to a local copy, and
/// memoizes the result for a configurable time.
///
/// The cache lock is held across the fetch, so at most one fetch is in
/// flight at a time.
pub struct FeedService {
    feed_key: String,
    client: Option<FeedClient>,
    fallback_path: Option<PathBuf>,
    max_age: Duration,
    cache: Mutex<FeedCache<LoadedFeed>>,
}

impl FeedService {
    pub fn new(
        feed_key: impl Into<String>,
        client: Option<FeedClient>,
        fallback_path: Option<PathBuf>,
        max_age: Duration,
    ) -> Self {
        Self {
            feed_key: feed_key.into(),
            client,
            fallback_path,
            max_age,
            cache: Mutex::new(FeedCache::new()),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        let client = if config.offline {
            None
        } else {
            Some(FeedClient::from_config(&config.feed)?)
        };
        Ok(Self::new(
            config.feed.key.clone(),
            client,
            config.fallback_path.clone(),
            cache_max_age(config.cache_ttl_secs),
        ))
    }

    pub fn feed_key(&self) -> &str {
        &self.feed_key
    }

    /// Return the cached feed when fresh, otherwise load it.
    pub async fn load(&self) -> Result<LoadedFeed, FeedError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();

        if let Some(cached) = cache.get(&self.feed_key, self.max_age, now) {
            return Ok(LoadedFeed {
                source: FeedSource::Cache,
                ..cached.clone()
            });
        }

        let loaded = self.fetch_fresh(now).await?;
        cache.put(self.feed_key.clone(), loaded.clone(), now);
        Ok(loaded)
    }

    /// Bypass the cache, load the feed and store the result.
    pub async fn reload(&self) -> Result<LoadedFeed, FeedError> {
        let mut cache = self.cache.lock().await;
        let now = Utc::now();
        let loaded = self.fetch_fresh(now).await?;
        cache.put(self.feed_key.clone(), loaded.clone(), now);
        Ok(loaded)
    }

    async fn fetch_fresh(&self, now: DateTime<Utc>) -> Result<LoadedFeed, FeedError> {
        let network_err = match self.fetch_network().await {
            Ok(feed) => return Ok(Self::loaded(feed, FeedSource::Network, now)),
            Err(e) => e,
        };

        let Some(path) = &self.fallback_path else {
            return Err(network_err);
        };
        tracing::warn!(
            "Feed unavailable ({}), loading fallback file {}",
            network_err,
            path.display()
        );

        match load_fallback_file(path) {
            Ok(feed) => Ok(Self::loaded(feed, FeedSource::Fallback, now)),
            Err(fallback_err) => Err(FeedError::Unreachable(format!(
                "{}; {}",
                network_err, fallback_err
            ))),
        }
    }

    async fn fetch_network(&self) -> Result<NormalizedFeed, FeedError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FeedError::Unreachable("offline mode".to_string()))?;

        let fetched = client
            .fetch_pages()
            .await
            .map_err(|e| FeedError::Unreachable(e.to_string()))?;
        if let Some(reason) = &fetched.truncated {
            tracing::warn!("Feed fetch incomplete: {}", reason);
        }

        let feed = normalize_pages(fetched.pages)?;
        tracing::info!(
            "Fetched {} features from {} ({} skipped)",
            feed.parsed_count(),
            client.url(),
            feed.skipped_count()
        );
        Ok(feed)
    }

    fn loaded(feed: NormalizedFeed, source: FeedSource, now: DateTime<Utc>) -> LoadedFeed {
        LoadedFeed {
            skipped: feed.skipped_count(),
            records: Arc::new(feed.records),
            source,
            fetched_at: now,
        }
    }
}

/// Convert a configured TTL, falling back to the default when it does not
/// fit a `Duration`.
fn cache_max_age(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Cache TTL of {} seconds is out of range, using {}",
                secs,
                DEFAULT_CACHE_TTL_SECS
            );
            Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_max_age_accepts_representable_ttls() {
        assert_eq!(cache_max_age(0), Duration::zero());
        assert_eq!(cache_max_age(60), Duration::seconds(60));
    }

    #[test]
    fn cache_max_age_falls_back_on_overflow() {
        let default = Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64);
        assert_eq!(cache_max_age(u64::MAX), default);
        assert_eq!(cache_max_age(i64::MAX as u64), default);
    }

    #[test]
    fn from_config_survives_huge_ttl() {
        let config = TrackerConfig {
            cache_ttl_secs: u64::MAX,
            offline: true,
            ..TrackerConfig::default()
        };

        let service = FeedService::from_config(&config).unwrap();

        assert_eq!(service.max_age, Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64));
    }
}
