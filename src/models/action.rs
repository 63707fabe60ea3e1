use serde::{Deserialize, Serialize};

/// Remediation actions the dispatcher knows how to record and notify about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "enable_2fa")]
    Enable2fa,
    #[serde(rename = "reset_password")]
    ResetPassword,
    #[serde(rename = "account_lockout")]
    AccountLockout,
    #[serde(rename = "security_alert")]
    SecurityAlert,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Enable2fa => "enable_2fa",
            ActionKind::ResetPassword => "reset_password",
            ActionKind::AccountLockout => "account_lockout",
            ActionKind::SecurityAlert => "security_alert",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enable_2fa" => Ok(ActionKind::Enable2fa),
            "reset_password" => Ok(ActionKind::ResetPassword),
            "account_lockout" => Ok(ActionKind::AccountLockout),
            "security_alert" => Ok(ActionKind::SecurityAlert),
            other => Err(format!("unknown action type: {}", other)),
        }
    }
}

/// A recorded remediation action. Appended to the per-user action log at
/// dispatch time; only `email_sent` changes afterwards, once the
/// notification attempt (successful or not) completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub user_id: String,
    pub reason: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub ip: String,
    /// Records that a notification was attempted, not that it was delivered
    pub email_sent: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl SecurityAction {
    pub fn new(kind: ActionKind, user_id: &str, reason: &str, ip: &str) -> Self {
        SecurityAction {
            kind,
            user_id: user_id.to_string(),
            reason: reason.to_string(),
            timestamp: super::now_ms(),
            ip: ip.to_string(),
            email_sent: false,
            metadata: serde_json::Value::Null,
        }
    }
}
