//! Framework-agnostic query surface.
//!
//! Typed request/response shapes plus handler functions over a
//! [`MonitorEngine`], modeling the monitoring endpoints without
//! committing to an HTTP framework. Hosts wire these into their own
//! router; [`ApiError::status`] gives the HTTP status equivalent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{LocationStats, MonitorEngine, MonitorStats};
use crate::models::{ActionKind, LocationSample, SecurityAction, SecurityEvent};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status equivalent for host routers.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MissingField(_) | ApiError::InvalidRequest(_) => 400,
            ApiError::UnknownUser(_) => 404,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub events: Vec<SecurityEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatsResponse {
    pub stats: LocationStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationsResponse {
    pub locations: Vec<LocationSample>,
    pub frequent_locations: Vec<LocationSample>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerActionResponse {
    pub action: SecurityAction,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoginRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedLoginResponse {
    pub attempts: usize,
    pub threshold: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionsResponse {
    pub actions: Vec<SecurityAction>,
}

/// GET /monitor/events
pub fn get_events(engine: &MonitorEngine) -> EventsResponse {
    EventsResponse {
        events: engine.events(),
    }
}

/// GET /monitor/stats
pub fn get_stats(engine: &MonitorEngine) -> MonitorStats {
    engine.stats()
}

/// GET /monitor/location-stats
pub fn get_location_stats(engine: &MonitorEngine) -> LocationStatsResponse {
    LocationStatsResponse {
        stats: engine.location_stats(),
    }
}

/// GET /monitor/user-locations/{userId}
pub fn get_user_locations(
    engine: &MonitorEngine,
    user_id: &str,
) -> Result<UserLocationsResponse, ApiError> {
    let history = engine
        .user_location_history(user_id)
        .ok_or_else(|| ApiError::UnknownUser(user_id.to_string()))?;

    Ok(UserLocationsResponse {
        locations: history.locations,
        frequent_locations: history.frequent_locations,
        last_updated: history.last_updated,
    })
}

/// POST /monitor/trigger-action
pub async fn trigger_action(
    engine: &MonitorEngine,
    request: TriggerActionRequest,
) -> Result<TriggerActionResponse, ApiError> {
    let user_id = request.user_id.ok_or(ApiError::MissingField("userId"))?;
    let action_type = request
        .action_type
        .ok_or(ApiError::MissingField("actionType"))?;
    let reason = request.reason.ok_or(ApiError::MissingField("reason"))?;
    let ip = request.ip.unwrap_or_else(|| "unknown".to_string());

    let kind: ActionKind = action_type.parse().map_err(ApiError::InvalidRequest)?;

    let action = engine.trigger_action(kind, &user_id, &reason, &ip).await;
    Ok(TriggerActionResponse { action })
}

/// POST /monitor/failed-login
pub async fn report_failed_login(
    engine: &MonitorEngine,
    request: FailedLoginRequest,
) -> Result<FailedLoginResponse, ApiError> {
    let user_id = request.user_id.ok_or(ApiError::MissingField("userId"))?;
    let ip = request.ip.unwrap_or_else(|| "unknown".to_string());

    let attempts = engine.on_failed_login(&user_id, &ip).await;
    let threshold = engine.config().failed_login_threshold;

    let message = if attempts >= threshold {
        format!("Threshold reached: {} of {} attempts", attempts, threshold)
    } else {
        format!("Recorded attempt {} of {}", attempts, threshold)
    };

    Ok(FailedLoginResponse {
        attempts,
        threshold,
        message,
    })
}

/// GET /monitor/user-actions?userId=
pub fn get_user_actions(engine: &MonitorEngine, user_id: &str) -> UserActionsResponse {
    UserActionsResponse {
        actions: engine.user_actions(user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;

    fn engine() -> MonitorEngine {
        MonitorEngine::new(MonitorConfig::default())
    }

    #[tokio::test]
    async fn test_failed_login_endpoint_counts() {
        let engine = engine();

        let first = report_failed_login(
            &engine,
            FailedLoginRequest {
                user_id: Some("alice".to_string()),
                ip: Some("1.2.3.4".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(first.attempts, 1);
        assert_eq!(first.threshold, 5);
        assert!(first.message.contains("1 of 5"));

        for _ in 0..4 {
            report_failed_login(
                &engine,
                FailedLoginRequest {
                    user_id: Some("alice".to_string()),
                    ip: None,
                },
            )
            .await
            .unwrap();
        }

        let events = get_events(&engine);
        assert_eq!(events.events.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_login_requires_user_id() {
        let engine = engine();
        let err = report_failed_login(&engine, FailedLoginRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(matches!(err, ApiError::MissingField("userId")));
    }

    #[tokio::test]
    async fn test_trigger_action_validation() {
        let engine = engine();

        let err = trigger_action(&engine, TriggerActionRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MissingField("userId")));

        let err = trigger_action(
            &engine,
            TriggerActionRequest {
                user_id: Some("alice".to_string()),
                action_type: Some("launch_missiles".to_string()),
                reason: Some("test".to_string()),
                ip: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_trigger_action_dispatches() {
        let engine = engine();

        let response = trigger_action(
            &engine,
            TriggerActionRequest {
                user_id: Some("alice".to_string()),
                action_type: Some("account_lockout".to_string()),
                reason: Some("manual lockout".to_string()),
                ip: Some("1.2.3.4".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(response.action.kind, ActionKind::AccountLockout);
        assert_eq!(response.action.user_id, "alice");

        let actions = get_user_actions(&engine, "alice");
        assert_eq!(actions.actions.len(), 1);
    }

    #[tokio::test]
    async fn test_user_locations_unknown_user_is_404() {
        let engine = engine();
        let err = get_user_locations(&engine, "nobody").unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn test_stats_shapes_serialize_camel_case() {
        let engine = engine();
        engine.on_request("5.6.7.8");

        let stats = serde_json::to_value(get_stats(&engine)).unwrap();
        assert!(stats.get("totalEvents").is_some());
        assert!(stats.get("eventsByType").is_some());
        assert!(stats.get("monitoredIps").is_some());

        let location_stats = serde_json::to_value(get_location_stats(&engine)).unwrap();
        assert!(location_stats["stats"].get("trackedUsers").is_some());
    }
}
