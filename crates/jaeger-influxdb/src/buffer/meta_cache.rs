//! Expiring set of service/operation pairs already announced.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Decides when a discovery marker for a service/operation pair is due.
#[derive(Debug)]
pub struct MetaCache {
    expiries: DashMap<(String, String), DateTime<Utc>>,
    max_age: Duration,
}

impl MetaCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            expiries: DashMap::new(),
            max_age,
        }
    }

    /// Returns true when the pair is unknown or its entry expired before
    /// `observed`, and records a new expiry of `observed + max_age`.
    pub fn should_write(&self, service: &str, operation: &str, observed: DateTime<Utc>) -> bool {
        let key = (service.to_string(), operation.to_string());

        if let Some(expiry) = self.expiries.get(&key) {
            if observed <= *expiry {
                return false;
            }
        }

        // Re-check under the shard write lock; another writer may have won.
        let expiry = observed
            .checked_add_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.expiries.entry(key) {
            Entry::Occupied(mut entry) => {
                if observed <= *entry.get() {
                    return false;
                }
                entry.insert(expiry);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(expiry);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn first_sighting_writes() {
        let cache = MetaCache::new(Duration::hours(1));
        assert!(cache.should_write("svc", "op", t0()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn repeat_within_window_is_throttled() {
        let cache = MetaCache::new(Duration::hours(1));
        assert!(cache.should_write("svc", "op", t0()));
        assert!(!cache.should_write("svc", "op", t0()));
        assert!(!cache.should_write("svc", "op", t0() - Duration::minutes(5)));
        assert!(!cache.should_write("svc", "op", t0() + Duration::hours(1)));
    }

    #[test]
    fn expiry_resets_window() {
        let cache = MetaCache::new(Duration::hours(1));
        assert!(cache.should_write("svc", "op", t0()));

        let later = t0() + Duration::hours(1) + Duration::seconds(1);
        assert!(cache.should_write("svc", "op", later));
        assert!(!cache.should_write("svc", "op", later + Duration::minutes(30)));
    }

    #[test]
    fn pairs_are_independent() {
        let cache = MetaCache::new(Duration::hours(1));
        assert!(cache.should_write("svc", "a", t0()));
        assert!(cache.should_write("svc", "b", t0()));
        assert!(cache.should_write("other", "a", t0()));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn huge_max_age_saturates() {
        let cache = MetaCache::new(Duration::MAX);
        assert!(cache.should_write("svc", "op", t0()));
        assert!(!cache.should_write("svc", "op", t0() + Duration::days(365)));
    }

    #[test]
    fn concurrent_callers_only_one_wins() {
        let cache = Arc::new(MetaCache::new(Duration::hours(1)));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    if cache.should_write("svc", "op", t0()) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }
}
