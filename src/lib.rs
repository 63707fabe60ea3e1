//! Heimdall watches an authentication flow from the outside: it counts
//! failed logins and request bursts in sliding windows, resolves login IPs
//! to locations, scores those locations for anomalies (impossible travel,
//! new countries, VPN/Tor exits, suspicious regions) and turns threshold
//! breaches into remediation actions with email notifications.
//!
//! The surrounding auth provider performs the real authentication; hosts
//! call [`engine::MonitorEngine::on_request`],
//! [`engine::MonitorEngine::on_failed_login`] and
//! [`engine::MonitorEngine::on_successful_login`] at the matching points of
//! their login lifecycle. Nothing in this crate can fail a login: every
//! internal error is logged and swallowed at the engine boundary.

pub mod actions;
pub mod api;
pub mod config;
pub mod detection;
pub mod engine;
pub mod geo;
pub mod geolocation;
pub mod models;
pub mod network;
pub mod notify;
pub mod persistence;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use detection::{AnomalyDetector, LocationHistoryStore, RateWindowCounter};
pub use engine::{MonitorEngine, MonitorStats};
pub use geolocation::{GeolocationProvider, ProviderChain};
pub use models::{Anomaly, LocationSample, SecurityAction, SecurityEvent};
pub use notify::EmailSender;
pub use persistence::{SqliteStateStore, StateStore};
