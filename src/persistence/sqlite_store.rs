//! SQLite implementation of the StateStore trait

use super::{PersistenceError, StateStore};
use crate::models::{ActionKind, LocationSample, SecurityAction};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-based state storage
///
/// Stores location history, failed attempts and dispatched actions in a
/// single database file so monitoring context survives restarts.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Create a new SQLite state store at the specified path
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteStateStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStateStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn parse_action_kind(kind: &str) -> Result<ActionKind, PersistenceError> {
        kind.parse()
            .map_err(|e: String| PersistenceError::InvalidData(e))
    }

    fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<LocationSample> {
        Ok(LocationSample {
            ip: row.get(0)?,
            country: row.get(1)?,
            country_code: row.get(2)?,
            region: row.get(3)?,
            city: row.get(4)?,
            latitude: row.get(5)?,
            longitude: row.get(6)?,
            timezone: row.get(7)?,
            isp: row.get(8)?,
            org: row.get(9)?,
            timestamp: row.get(10)?,
            is_vpn: row.get(11)?,
            is_tor: row.get(12)?,
            is_proxy: row.get(13)?,
            risk_score: row.get(14)?,
        })
    }
}

impl StateStore for SqliteStateStore {
    fn add_location_sample(
        &self,
        user_id: &str,
        sample: &LocationSample,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO location_samples
             (user_id, ip, country, country_code, region, city, latitude, longitude,
              timezone, isp, org, timestamp, is_vpn, is_tor, is_proxy, risk_score)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                sample.ip,
                sample.country,
                sample.country_code,
                sample.region,
                sample.city,
                sample.latitude,
                sample.longitude,
                sample.timezone,
                sample.isp,
                sample.org,
                sample.timestamp,
                sample.is_vpn,
                sample.is_tor,
                sample.is_proxy,
                sample.risk_score,
            ],
        )?;
        Ok(())
    }

    fn get_location_samples_since(
        &self,
        user_id: &str,
        since_ms: i64,
    ) -> Result<Vec<LocationSample>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT ip, country, country_code, region, city, latitude, longitude,
                    timezone, isp, org, timestamp, is_vpn, is_tor, is_proxy, risk_score
             FROM location_samples
             WHERE user_id = ? AND timestamp >= ?
             ORDER BY timestamp ASC",
        )?;

        let samples = stmt
            .query_map(params![user_id, since_ms], Self::sample_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    fn add_failed_attempt(
        &self,
        user_id: &str,
        ip: &str,
        ts_ms: i64,
    ) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO failed_attempts (user_id, ip, timestamp) VALUES (?, ?, ?)",
            params![user_id, ip, ts_ms],
        )?;
        Ok(())
    }

    fn get_failed_attempts_since(
        &self,
        user_id: &str,
        since_ms: i64,
    ) -> Result<Vec<i64>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT timestamp FROM failed_attempts
             WHERE user_id = ? AND timestamp >= ?
             ORDER BY timestamp ASC",
        )?;

        let timestamps = stmt
            .query_map(params![user_id, since_ms], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;

        Ok(timestamps)
    }

    fn store_action(&self, action: &SecurityAction) -> Result<(), PersistenceError> {
        let metadata = if action.metadata.is_null() {
            None
        } else {
            Some(action.metadata.to_string())
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO security_actions
             (action_type, user_id, reason, timestamp, ip, email_sent, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                action.kind.as_str(),
                action.user_id,
                action.reason,
                action.timestamp,
                action.ip,
                action.email_sent,
                metadata,
            ],
        )?;
        Ok(())
    }

    fn get_user_actions(&self, user_id: &str) -> Result<Vec<SecurityAction>, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT action_type, user_id, reason, timestamp, ip, email_sent, metadata
             FROM security_actions
             WHERE user_id = ?
             ORDER BY timestamp ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let kind: String = row.get(0)?;
                let metadata: Option<String> = row.get(6)?;
                Ok((
                    kind,
                    SecurityAction {
                        kind: ActionKind::SecurityAlert,
                        user_id: row.get(1)?,
                        reason: row.get(2)?,
                        timestamp: row.get(3)?,
                        ip: row.get(4)?,
                        email_sent: row.get(5)?,
                        metadata: serde_json::Value::Null,
                    },
                    metadata,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut actions = Vec::with_capacity(rows.len());
        for (kind, mut action, metadata) in rows {
            action.kind = Self::parse_action_kind(&kind)?;
            if let Some(raw) = metadata {
                action.metadata = serde_json::from_str(&raw)
                    .map_err(|e| PersistenceError::InvalidData(format!("Bad metadata: {}", e)))?;
            }
            actions.push(action);
        }

        Ok(actions)
    }

    fn prune_before(&self, ts_ms: i64) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock().unwrap();

        let mut total_deleted = 0usize;

        total_deleted += conn.execute(
            "DELETE FROM location_samples WHERE timestamp < ?",
            params![ts_ms],
        )?;

        total_deleted += conn.execute(
            "DELETE FROM failed_attempts WHERE timestamp < ?",
            params![ts_ms],
        )?;

        // Actions are kept 30 days past the general cutoff
        let action_cutoff = ts_ms - (30 * 24 * 3_600_000);
        total_deleted += conn.execute(
            "DELETE FROM security_actions WHERE timestamp < ?",
            params![action_cutoff],
        )?;

        Ok(total_deleted)
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "DELETE FROM location_samples;
             DELETE FROM failed_attempts;
             DELETE FROM security_actions;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteStateStore {
        SqliteStateStore::in_memory().expect("Failed to create in-memory store")
    }

    fn sample_at(city: &str, timestamp: i64) -> LocationSample {
        LocationSample {
            ip: "203.0.113.10".to_string(),
            country: "Germany".to_string(),
            country_code: "DE".to_string(),
            region: "BE".to_string(),
            city: city.to_string(),
            latitude: 52.52,
            longitude: 13.405,
            timezone: "Europe/Berlin".to_string(),
            isp: "Deutsche Telekom".to_string(),
            org: "T-Home".to_string(),
            timestamp,
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            risk_score: 0,
        }
    }

    #[test]
    fn test_location_sample_roundtrip() {
        let store = create_test_store();

        assert!(store.get_location_samples_since("alice", 0).unwrap().is_empty());

        store.add_location_sample("alice", &sample_at("Berlin", 1000)).unwrap();
        store.add_location_sample("alice", &sample_at("Munich", 2000)).unwrap();
        store.add_location_sample("bob", &sample_at("Hamburg", 1500)).unwrap();

        let samples = store.get_location_samples_since("alice", 0).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].city, "Berlin");
        assert_eq!(samples[1].city, "Munich");
        assert_eq!(samples[0].timezone, "Europe/Berlin");

        // Cutoff excludes the older sample
        let recent = store.get_location_samples_since("alice", 1500).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].city, "Munich");
    }

    #[test]
    fn test_failed_attempt_counting() {
        let store = create_test_store();

        store.add_failed_attempt("alice", "1.2.3.4", 1000).unwrap();
        store.add_failed_attempt("alice", "1.2.3.4", 2000).unwrap();
        store.add_failed_attempt("alice", "1.2.3.5", 3000).unwrap();
        store.add_failed_attempt("bob", "1.2.3.4", 2500).unwrap();

        assert_eq!(store.count_failed_attempts_since("alice", 0).unwrap(), 3);
        assert_eq!(store.count_failed_attempts_since("alice", 2000).unwrap(), 2);
        assert_eq!(store.count_failed_attempts_since("bob", 0).unwrap(), 1);
        assert_eq!(store.count_failed_attempts_since("carol", 0).unwrap(), 0);
    }

    #[test]
    fn test_action_roundtrip_with_metadata() {
        let store = create_test_store();

        let mut action = SecurityAction::new(
            ActionKind::Enable2fa,
            "alice",
            "Threshold breach: 5 failed attempts",
            "1.2.3.4",
        );
        action.email_sent = true;
        action.metadata = json!({"attempts": 5});
        store.store_action(&action).unwrap();

        let plain = SecurityAction::new(ActionKind::SecurityAlert, "alice", "Breach alert", "1.2.3.4");
        store.store_action(&plain).unwrap();

        let actions = store.get_user_actions("alice").unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Enable2fa);
        assert!(actions[0].email_sent);
        assert_eq!(actions[0].metadata["attempts"], 5);
        assert_eq!(actions[1].kind, ActionKind::SecurityAlert);
        assert!(actions[1].metadata.is_null());
    }

    #[test]
    fn test_prune_before() {
        let store = create_test_store();

        store.add_location_sample("alice", &sample_at("Berlin", 1000)).unwrap();
        store.add_location_sample("alice", &sample_at("Munich", 5000)).unwrap();
        store.add_failed_attempt("alice", "1.2.3.4", 1500).unwrap();
        store.add_failed_attempt("alice", "1.2.3.4", 6000).unwrap();

        let deleted = store.prune_before(4000).unwrap();
        assert_eq!(deleted, 2);

        assert_eq!(store.get_location_samples_since("alice", 0).unwrap().len(), 1);
        assert_eq!(store.count_failed_attempts_since("alice", 0).unwrap(), 1);
    }

    #[test]
    fn test_clear_all() {
        let store = create_test_store();

        store.add_location_sample("alice", &sample_at("Berlin", 1000)).unwrap();
        store.add_failed_attempt("alice", "1.2.3.4", 1000).unwrap();
        store
            .store_action(&SecurityAction::new(
                ActionKind::AccountLockout,
                "alice",
                "Too many attempts",
                "1.2.3.4",
            ))
            .unwrap();

        store.clear_all().unwrap();

        assert!(store.get_location_samples_since("alice", 0).unwrap().is_empty());
        assert_eq!(store.count_failed_attempts_since("alice", 0).unwrap(), 0);
        assert!(store.get_user_actions("alice").unwrap().is_empty());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let store = SqliteStateStore::new(&path).unwrap();
            store.add_location_sample("alice", &sample_at("Berlin", 1000)).unwrap();
        }

        let reopened = SqliteStateStore::new(&path).unwrap();
        let samples = reopened.get_location_samples_since("alice", 0).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].city, "Berlin");
    }
}
