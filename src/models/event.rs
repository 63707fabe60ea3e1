use serde::{Deserialize, Serialize};

use super::location::AnomalyKind;

/// Typed security event emitted to the event log and the logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    FailedLogin,
    BotActivity,
    UnusualLocation,
    VpnDetected,
    TorDetected,
    ImpossibleTravel,
    NewCountry,
    NewCity,
    TimezoneAnomaly,
    SuspiciousCountry,
}

impl From<AnomalyKind> for SecurityEventKind {
    fn from(kind: AnomalyKind) -> Self {
        match kind {
            AnomalyKind::VpnDetected => SecurityEventKind::VpnDetected,
            AnomalyKind::TorDetected => SecurityEventKind::TorDetected,
            AnomalyKind::SuspiciousCountry => SecurityEventKind::SuspiciousCountry,
            AnomalyKind::ImpossibleTravel => SecurityEventKind::ImpossibleTravel,
            AnomalyKind::NewCountry => SecurityEventKind::NewCountry,
            AnomalyKind::NewCity => SecurityEventKind::NewCity,
            AnomalyKind::TimezoneAnomaly => SecurityEventKind::TimezoneAnomaly,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub kind: SecurityEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub ip: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Attempt/request count for rate-driven events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<usize>,
    pub description: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, user_id: Option<&str>, ip: &str, description: String) -> Self {
        SecurityEvent {
            kind,
            user_id: user_id.map(|u| u.to_string()),
            ip: ip.to_string(),
            timestamp: super::now_ms(),
            attempts: None,
            description,
            metadata: serde_json::Value::Null,
        }
    }
}
