//! Generic sliding-window event counter keyed by an identity string.
//!
//! Used with a minutes-scale window keyed by user id for failed-login
//! tracking, and a seconds-scale window keyed by IP for request-rate (bot)
//! detection. Threshold comparison is the caller's job: the counter
//! re-reports the full count on every call, so a caller that alerts at a
//! threshold keeps alerting while the attack is sustained.

use std::collections::HashMap;

pub struct RateWindowCounter {
    /// identity -> event timestamps (epoch ms), insertion order chronological
    entries: HashMap<String, Vec<i64>>,
    window_ms: i64,
}

impl RateWindowCounter {
    pub fn new(window_ms: i64) -> Self {
        RateWindowCounter {
            entries: HashMap::new(),
            window_ms,
        }
    }

    /// Record an event for `key` now; returns the post-prune, post-append
    /// count within the window.
    pub fn record(&mut self, key: &str) -> usize {
        self.record_at(key, crate::models::now_ms())
    }

    /// Record an event at an explicit timestamp. Entries whose age is at
    /// least the window length are pruned before the append.
    pub fn record_at(&mut self, key: &str, timestamp_ms: i64) -> usize {
        let window_ms = self.window_ms;
        let timestamps = self.entries.entry(key.to_string()).or_default();
        timestamps.retain(|&t| timestamp_ms - t < window_ms);
        timestamps.push(timestamp_ms);
        timestamps.len()
    }

    /// Current in-window count for a key, without recording.
    pub fn count_at(&self, key: &str, now_ms: i64) -> usize {
        self.entries
            .get(key)
            .map(|ts| ts.iter().filter(|&&t| now_ms - t < self.window_ms).count())
            .unwrap_or(0)
    }

    pub fn count(&self, key: &str) -> usize {
        self.count_at(key, crate::models::now_ms())
    }

    /// Drop expired entries and empty keys. Counting already ignores
    /// expired entries; this just bounds memory between records.
    pub fn prune_stale(&mut self, now_ms: i64) {
        let window_ms = self.window_ms;
        self.entries.retain(|_, timestamps| {
            timestamps.retain(|&t| now_ms - t < window_ms);
            !timestamps.is_empty()
        });
    }

    /// Clear all tracking data.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Number of identities currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }
}
