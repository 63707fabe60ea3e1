use serde::{Deserialize, Serialize};

/// A resolved login location. Created once per login IP, never mutated
/// after classification fills the network flags and risk score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub ip: String,
    pub country: String,
    /// ISO 3166-1 alpha-2
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA name, or a legacy abbreviation from older providers
    pub timezone: String,
    pub isp: String,
    pub org: String,
    /// Epoch milliseconds at resolution time
    pub timestamp: i64,
    #[serde(default)]
    pub is_vpn: bool,
    #[serde(default)]
    pub is_tor: bool,
    #[serde(default)]
    pub is_proxy: bool,
    /// Composite 0-100 score attached at classification time,
    /// independent of which anomalies later fire
    #[serde(default)]
    pub risk_score: u8,
}

/// Per-user location history, pruned to the anomaly window on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationHistory {
    pub user_id: String,
    /// Insertion order is chronological
    pub locations: Vec<LocationSample>,
    /// Top locations by city+country occurrence within the window
    pub frequent_locations: Vec<LocationSample>,
    pub last_updated: i64,
}

impl UserLocationHistory {
    pub fn new(user_id: &str) -> Self {
        UserLocationHistory {
            user_id: user_id.to_string(),
            locations: Vec::new(),
            frequent_locations: Vec::new(),
            last_updated: super::now_ms(),
        }
    }
}

/// Classified anomaly kinds, in detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    VpnDetected,
    TorDetected,
    SuspiciousCountry,
    ImpossibleTravel,
    NewCountry,
    NewCity,
    TimezoneAnomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Detection output for one evaluation call. Ephemeral; the engine turns
/// each anomaly into a logged security event but does not persist it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// 0.0-1.0
    pub confidence: f64,
    /// 0-100
    pub risk_score: u8,
    pub description: String,
    /// Kind-specific evidence (distance/speed, previous vs current location)
    pub metadata: serde_json::Value,
}
