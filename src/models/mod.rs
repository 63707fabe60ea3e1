pub mod action;
pub mod event;
pub mod location;

pub use action::{ActionKind, SecurityAction};
pub use event::{SecurityEvent, SecurityEventKind};
pub use location::{Anomaly, AnomalyKind, LocationSample, Severity, UserLocationHistory};

/// Current time as epoch milliseconds, the timestamp unit used throughout.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
