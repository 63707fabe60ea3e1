use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the monitoring engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Failed attempts per user before the action sequence fires
    pub failed_login_threshold: usize,
    /// Sliding window for failed-login counting, in minutes
    pub failed_login_window_minutes: i64,
    /// Requests per IP before a bot_activity event fires
    pub bot_detection_threshold: usize,
    /// Sliding window for request-rate counting, in seconds
    pub bot_detection_window_seconds: i64,
    /// Gate for post-login location anomaly evaluation
    pub enable_location_detection: bool,
    /// Gate for failed-login counting
    pub enable_failed_login_monitoring: bool,
    /// Gate for request-rate counting
    pub enable_bot_detection: bool,
    /// Location anomaly rules configuration
    pub rules: DetectionRules,
    /// Automatic remediation configuration
    pub actions: ActionPolicy,
}

/// Per-rule configuration for the location anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRules {
    /// Informational threshold for distance-based suspicion checks, in km
    pub max_normal_distance_km: f64,
    /// History retention window, in hours
    pub location_anomaly_window_hours: i64,
    /// Minimum prior samples before history-dependent rules run
    pub min_location_history: usize,
    /// Enable VPN detection
    pub enable_vpn_detection: bool,
    /// Enable Tor exit-node detection
    pub enable_tor_detection: bool,
    /// Enable suspicious country detection
    pub enable_suspicious_country_detection: bool,
    /// Operator-curated suspicious country set (ISO 3166-1 alpha-2)
    pub suspicious_countries: Vec<String>,
    /// Enable impossible travel detection
    pub enable_impossible_travel_detection: bool,
    /// Maximum plausible travel speed in km/h
    pub max_travel_speed_kmh: f64,
    /// Enable new country detection
    pub enable_new_country_detection: bool,
    /// Enable new city detection
    pub enable_new_city_detection: bool,
    /// Enable timezone consistency detection
    pub enable_timezone_anomaly_detection: bool,
}

/// Gates for automatic remediation on failed-login breaches.
///
/// Remediation is opt-in: a breach always records a security_alert action,
/// but forced 2FA and password resets only fire when enabled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionPolicy {
    /// Dispatch an enable_2fa action on failed-login breach
    pub enable_2fa_enforcement: bool,
    /// Dispatch a reset_password action on failed-login breach
    pub enable_password_reset_enforcement: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            failed_login_threshold: 5,
            failed_login_window_minutes: 10,
            bot_detection_threshold: 10,
            bot_detection_window_seconds: 10,
            enable_location_detection: true,
            enable_failed_login_monitoring: true,
            enable_bot_detection: true,
            rules: DetectionRules::default(),
            actions: ActionPolicy::default(),
        }
    }
}

impl Default for DetectionRules {
    fn default() -> Self {
        DetectionRules {
            max_normal_distance_km: 1000.0,
            location_anomaly_window_hours: 24,
            min_location_history: 3,
            enable_vpn_detection: true,
            enable_tor_detection: true,
            enable_suspicious_country_detection: true,
            suspicious_countries: ["KP", "IR", "SY", "CU", "VE", "MM", "BY", "RU", "CN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enable_impossible_travel_detection: true,
            max_travel_speed_kmh: 900.0,
            enable_new_country_detection: true,
            enable_new_city_detection: false,
            enable_timezone_anomaly_detection: true,
        }
    }
}

impl Default for ActionPolicy {
    fn default() -> Self {
        ActionPolicy {
            enable_2fa_enforcement: false,
            enable_password_reset_enforcement: false,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: MonitorConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Failed-login window expressed in milliseconds
    pub fn failed_login_window_ms(&self) -> i64 {
        self.failed_login_window_minutes * 60_000
    }

    /// Bot-detection window expressed in milliseconds
    pub fn bot_detection_window_ms(&self) -> i64 {
        self.bot_detection_window_seconds * 1_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.failed_login_threshold, 5);
        assert_eq!(config.failed_login_window_minutes, 10);
        assert_eq!(config.bot_detection_threshold, 10);
        assert_eq!(config.bot_detection_window_seconds, 10);
        assert!(config.enable_location_detection);
        assert_eq!(config.rules.min_location_history, 3);
        assert_eq!(config.rules.max_travel_speed_kmh, 900.0);
        assert!(!config.rules.enable_new_city_detection);
        assert!(config.rules.suspicious_countries.contains(&"KP".to_string()));
        assert!(!config.actions.enable_2fa_enforcement);
    }

    #[test]
    fn test_window_conversions() {
        let config = MonitorConfig::default();
        assert_eq!(config.failed_login_window_ms(), 600_000);
        assert_eq!(config.bot_detection_window_ms(), 10_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MonitorConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: MonitorConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.failed_login_threshold, config.failed_login_threshold);
        assert_eq!(
            parsed.rules.suspicious_countries,
            config.rules.suspicious_countries
        );
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let parsed: MonitorConfig = toml::from_str(
            "failed_login_threshold = 3\n\n[rules]\nmin_location_history = 1\n",
        )
        .unwrap();
        assert_eq!(parsed.failed_login_threshold, 3);
        assert_eq!(parsed.rules.min_location_history, 1);
        // Untouched fields keep their defaults
        assert_eq!(parsed.bot_detection_threshold, 10);
        assert_eq!(parsed.rules.max_travel_speed_kmh, 900.0);
    }
}
