//! Durable state for monitoring data.
//!
//! The engine works entirely in memory; a [`StateStore`] mirrors the
//! hot structures so history and actions survive restarts. Writes are
//! best-effort from the caller's point of view: a failed persist is
//! logged and the in-memory state stays authoritative.

pub mod sqlite_store;

pub use sqlite_store::SqliteStateStore;

use thiserror::Error;

use crate::models::{LocationSample, SecurityAction};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Backing store for location history, failed attempts and actions.
///
/// All methods take `&self`; implementations handle their own locking.
pub trait StateStore: Send + Sync {
    /// Append a location sample to a user's history.
    fn add_location_sample(
        &self,
        user_id: &str,
        sample: &LocationSample,
    ) -> Result<(), PersistenceError>;

    /// Samples recorded at or after `since_ms`, oldest first.
    fn get_location_samples_since(
        &self,
        user_id: &str,
        since_ms: i64,
    ) -> Result<Vec<LocationSample>, PersistenceError>;

    /// Record one failed login attempt.
    fn add_failed_attempt(&self, user_id: &str, ip: &str, ts_ms: i64)
        -> Result<(), PersistenceError>;

    /// Timestamps of failed attempts for a user at or after `since_ms`.
    fn get_failed_attempts_since(
        &self,
        user_id: &str,
        since_ms: i64,
    ) -> Result<Vec<i64>, PersistenceError>;

    /// Count of failed attempts for a user at or after `since_ms`.
    fn count_failed_attempts_since(
        &self,
        user_id: &str,
        since_ms: i64,
    ) -> Result<usize, PersistenceError> {
        Ok(self.get_failed_attempts_since(user_id, since_ms)?.len())
    }

    /// Persist a dispatched security action.
    fn store_action(&self, action: &SecurityAction) -> Result<(), PersistenceError>;

    /// All stored actions for a user, oldest first.
    fn get_user_actions(&self, user_id: &str) -> Result<Vec<SecurityAction>, PersistenceError>;

    /// Drop rows older than `ts_ms` across all tables. Returns rows removed.
    fn prune_before(&self, ts_ms: i64) -> Result<usize, PersistenceError>;

    /// Wipe all stored state.
    fn clear_all(&self) -> Result<(), PersistenceError>;
}
