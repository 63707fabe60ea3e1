//! Per-user bounded, time-windowed history of observed login locations.
//!
//! Histories are created lazily on first observation and pruned by
//! timestamp cutoff (not by count) on every update. An optional
//! persistence backend mirrors writes and seeds the in-memory cache on
//! first touch, so a restarted engine does not treat every user as new.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{now_ms, LocationSample, UserLocationHistory};
use crate::persistence::StateStore;

const FREQUENT_LOCATIONS_LIMIT: usize = 5;

pub struct LocationHistoryStore {
    histories: HashMap<String, UserLocationHistory>,
    window_hours: i64,
    store: Option<Arc<dyn StateStore>>,
}

impl LocationHistoryStore {
    pub fn new(window_hours: i64) -> Self {
        LocationHistoryStore {
            histories: HashMap::new(),
            window_hours,
            store: None,
        }
    }

    /// Create with a persistence backend that mirrors every sample and
    /// seeds the cache for users not yet seen in this process.
    pub fn with_persistence(window_hours: i64, store: Arc<dyn StateStore>) -> Self {
        LocationHistoryStore {
            histories: HashMap::new(),
            window_hours,
            store: Some(store),
        }
    }

    fn window_ms(&self) -> i64 {
        self.window_hours * 3_600_000
    }

    /// In-window samples recorded before the current call, oldest first.
    /// Prunes expired samples first, so an aged-out history reads as
    /// empty. Loads from the persistence backend on a cache miss.
    pub fn prior_locations(&mut self, user_id: &str) -> Vec<LocationSample> {
        self.ensure_loaded(user_id);
        let cutoff = now_ms() - self.window_ms();
        match self.histories.get_mut(user_id) {
            Some(history) => {
                history.locations.retain(|loc| loc.timestamp > cutoff);
                history.locations.clone()
            }
            None => Vec::new(),
        }
    }

    /// Prune-then-append a sample, refresh the frequent-locations summary
    /// and mirror the sample to persistence when configured.
    pub fn record(&mut self, user_id: &str, sample: LocationSample) {
        self.ensure_loaded(user_id);
        let cutoff = now_ms() - self.window_ms();

        let history = self
            .histories
            .entry(user_id.to_string())
            .or_insert_with(|| UserLocationHistory::new(user_id));

        history.locations.retain(|loc| loc.timestamp > cutoff);
        history.locations.push(sample.clone());
        history.frequent_locations = frequent_locations(&history.locations);
        history.last_updated = now_ms();

        if let Some(ref store) = self.store {
            if let Err(e) = store.add_location_sample(user_id, &sample) {
                log::warn!("failed to persist location sample for {}: {}", user_id, e);
            }
        }
    }

    /// Read-only view of a user's history, if any exists.
    pub fn get(&self, user_id: &str) -> Option<&UserLocationHistory> {
        self.histories.get(user_id)
    }

    /// Number of users with at least one retained sample.
    pub fn tracked_users(&self) -> usize {
        self.histories.len()
    }

    /// Total retained samples across all users.
    pub fn retained_samples(&self) -> usize {
        self.histories.values().map(|h| h.locations.len()).sum()
    }

    fn ensure_loaded(&mut self, user_id: &str) {
        if self.histories.contains_key(user_id) {
            return;
        }
        let Some(ref store) = self.store else { return };

        let since = now_ms() - self.window_ms();
        match store.get_location_samples_since(user_id, since) {
            Ok(samples) if !samples.is_empty() => {
                let mut history = UserLocationHistory::new(user_id);
                history.locations = samples;
                history.frequent_locations = frequent_locations(&history.locations);
                self.histories.insert(user_id.to_string(), history);
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("failed to load location history for {}: {}", user_id, e);
            }
        }
    }
}

/// Top-N locations by city+country occurrence, most frequent first.
fn frequent_locations(locations: &[LocationSample]) -> Vec<LocationSample> {
    let mut counts: HashMap<String, (LocationSample, usize)> = HashMap::new();
    for loc in locations {
        let key = format!("{}, {}", loc.city, loc.country_code);
        counts
            .entry(key)
            .and_modify(|(_, count)| *count += 1)
            .or_insert_with(|| (loc.clone(), 1));
    }

    let mut ranked: Vec<(LocationSample, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .take(FREQUENT_LOCATIONS_LIMIT)
        .map(|(loc, _)| loc)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(city: &str, country_code: &str, timestamp: i64) -> LocationSample {
        LocationSample {
            ip: "1.2.3.4".to_string(),
            country: country_code.to_string(),
            country_code: country_code.to_string(),
            region: String::new(),
            city: city.to_string(),
            latitude: 10.0,
            longitude: 20.0,
            timezone: "UTC".to_string(),
            isp: String::new(),
            org: String::new(),
            timestamp,
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            risk_score: 0,
        }
    }

    #[test]
    fn test_lazy_creation_and_append() {
        let mut store = LocationHistoryStore::new(24);
        assert!(store.get("alice").is_none());

        store.record("alice", sample("Berlin", "DE", now_ms()));
        let history = store.get("alice").unwrap();
        assert_eq!(history.locations.len(), 1);
        assert_eq!(history.user_id, "alice");
    }

    #[test]
    fn test_prior_locations_excludes_nothing_before_record() {
        let mut store = LocationHistoryStore::new(24);
        assert!(store.prior_locations("alice").is_empty());

        store.record("alice", sample("Berlin", "DE", now_ms()));
        assert_eq!(store.prior_locations("alice").len(), 1);
    }

    #[test]
    fn test_old_samples_pruned_on_update() {
        let mut store = LocationHistoryStore::new(24);
        let stale = now_ms() - 25 * 3_600_000;
        store.record("alice", sample("Berlin", "DE", stale));
        store.record("alice", sample("Berlin", "DE", now_ms()));

        let history = store.get("alice").unwrap();
        assert_eq!(history.locations.len(), 1);
        assert!(history.locations[0].timestamp > stale);
    }

    #[test]
    fn test_prior_locations_prunes_expired_samples() {
        let mut store = LocationHistoryStore::new(24);
        store.record("alice", sample("Berlin", "DE", now_ms() - 30 * 3_600_000));

        // An aged-out history reads as empty, before any new record
        assert!(store.prior_locations("alice").is_empty());
        assert!(store.get("alice").unwrap().locations.is_empty());
    }

    #[test]
    fn test_frequent_locations_ranked_by_occurrence() {
        let mut store = LocationHistoryStore::new(24);
        let now = now_ms();
        for i in 0..3 {
            store.record("alice", sample("Berlin", "DE", now + i));
        }
        store.record("alice", sample("Paris", "FR", now + 10));

        let history = store.get("alice").unwrap();
        assert_eq!(history.frequent_locations[0].city, "Berlin");
        assert_eq!(history.frequent_locations.len(), 2);
    }

    #[test]
    fn test_frequent_locations_capped() {
        let cities = ["A", "B", "C", "D", "E", "F", "G"];
        let mut store = LocationHistoryStore::new(24);
        let now = now_ms();
        for (i, city) in cities.iter().enumerate() {
            store.record("alice", sample(city, "DE", now + i as i64));
        }
        assert_eq!(store.get("alice").unwrap().frequent_locations.len(), 5);
    }

    #[test]
    fn test_users_independent() {
        let mut store = LocationHistoryStore::new(24);
        store.record("alice", sample("Berlin", "DE", now_ms()));
        store.record("bob", sample("Tokyo", "JP", now_ms()));

        assert_eq!(store.tracked_users(), 2);
        assert_eq!(store.get("alice").unwrap().locations[0].city, "Berlin");
        assert_eq!(store.get("bob").unwrap().locations[0].city, "Tokyo");
    }

    #[test]
    fn test_persistence_mirror_and_seed() {
        let backend: Arc<dyn StateStore> =
            Arc::new(crate::persistence::SqliteStateStore::in_memory().unwrap());

        {
            let mut store = LocationHistoryStore::with_persistence(24, Arc::clone(&backend));
            store.record("alice", sample("Berlin", "DE", now_ms()));
        }

        // A fresh cache seeds itself from the backend
        let mut fresh = LocationHistoryStore::with_persistence(24, backend);
        let prior = fresh.prior_locations("alice");
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[0].city, "Berlin");
    }
}
