//! Email notifications for dispatched security actions.
//!
//! The dispatcher builds an [`EmailNotification`] for every action and
//! hands it to whatever [`EmailSender`] the host wired in. Delivery is
//! fire-and-forget from the engine's point of view.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::ActionKind;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Template identifiers the host's mail layer renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationTemplate {
    #[serde(rename = "2fa_setup")]
    TwoFactorSetup,
    #[serde(rename = "password_reset")]
    PasswordReset,
    #[serde(rename = "security_alert")]
    SecurityAlert,
    #[serde(rename = "account_lockout")]
    AccountLockout,
}

/// A rendered notification request, ready for a mail transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailNotification {
    pub to: String,
    pub subject: String,
    pub template: NotificationTemplate,
    pub data: serde_json::Value,
}

/// Outbound mail transport. Implementations own retries and rendering.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, notification: &EmailNotification) -> Result<(), SendError>;
}

/// Build the notification that corresponds to a security action.
///
/// The user id doubles as the recipient address; hosts that key users
/// by something other than email should wrap their sender with a
/// lookup.
pub fn notification_for_action(
    kind: ActionKind,
    user_id: &str,
    reason: &str,
    ip: &str,
    timestamp: i64,
) -> EmailNotification {
    let (subject, template) = match kind {
        ActionKind::Enable2fa => (
            "Two-Factor Authentication Setup",
            NotificationTemplate::TwoFactorSetup,
        ),
        ActionKind::ResetPassword => ("Password Reset Request", NotificationTemplate::PasswordReset),
        ActionKind::SecurityAlert => ("Security Alert", NotificationTemplate::SecurityAlert),
        ActionKind::AccountLockout => (
            "Account Temporarily Locked",
            NotificationTemplate::AccountLockout,
        ),
    };

    EmailNotification {
        to: user_id.to_string(),
        subject: subject.to_string(),
        template,
        data: json!({
            "userName": user_id,
            "reason": reason,
            "ip": ip,
            "timestamp": timestamp,
        }),
    }
}
