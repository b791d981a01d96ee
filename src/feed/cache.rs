use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Time-boxed reuse of previous fetches.
///
/// The cache is a plain value owned by its caller: nothing here reads a
/// clock, so both the store time and the lookup time are passed in.
#[derive(Debug, Clone)]
pub struct FeedCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

impl<V> Default for FeedCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> FeedCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the value stored under `key` if it is no older than `max_age`
    /// at `now`. A stored time in the future counts as fresh.
    pub fn get(&self, key: &str, max_age: Duration, now: DateTime<Utc>) -> Option<&V> {
        let entry = self.entries.get(key)?;
        if now - entry.stored_at <= max_age {
            Some(&entry.value)
        } else {
            None
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put(&mut self, key: impl Into<String>, value: V, timestamp: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: timestamp,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_within_max_age() {
        let t0 = Utc::now();
        let mut cache = FeedCache::new();
        cache.put("feed", 1, t0);

        assert_eq!(cache.get("feed", Duration::hours(4), t0), Some(&1));
        assert_eq!(
            cache.get("feed", Duration::hours(4), t0 + Duration::hours(4)),
            Some(&1)
        );
    }

    #[test]
    fn expires_after_max_age() {
        let t0 = Utc::now();
        let mut cache = FeedCache::new();
        cache.put("feed", "v", t0);

        let later = t0 + Duration::hours(4) + Duration::seconds(1);
        assert_eq!(cache.get("feed", Duration::hours(4), later), None);
    }

    #[test]
    fn put_replaces_previous_entry() {
        let t0 = Utc::now();
        let mut cache = FeedCache::new();
        cache.put("feed", 1, t0);
        cache.put("feed", 2, t0 + Duration::hours(1));

        assert_eq!(cache.get("feed", Duration::zero(), t0 + Duration::hours(1)), Some(&2));
        assert_eq!(
            cache.get("feed", Duration::hours(4), t0 + Duration::hours(5)),
            Some(&2)
        );
    }

    #[test]
    fn keys_are_independent() {
        let t0 = Utc::now();
        let mut cache = FeedCache::new();
        cache.put("a", 1, t0);
        assert_eq!(cache.get("b", Duration::hours(1), t0), None);
    }
}
