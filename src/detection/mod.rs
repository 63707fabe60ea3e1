pub mod anomaly;
pub mod history;
pub mod rate_window;

pub use anomaly::AnomalyDetector;
pub use history::LocationHistoryStore;
pub use rate_window::RateWindowCounter;
