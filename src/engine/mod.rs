//! Monitoring engine.
//!
//! Wires the sliding-window counters, the anomaly detector and the
//! action dispatcher into the two points of the auth lifecycle this
//! crate observes: pre-auth request inspection and post-auth outcome
//! handling. Detection only; nothing here ever blocks or fails a
//! login. Geolocation and email failures are logged and swallowed.
//!
//! Each shared structure sits behind its own `std::sync::Mutex`,
//! locked for the duration of one read-modify-write and never across
//! an await point. Counts are exact under concurrent calls for the
//! same key.

use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::actions::ActionDispatcher;
use crate::config::MonitorConfig;
use crate::detection::{AnomalyDetector, RateWindowCounter};
use crate::geo;
use crate::geolocation::GeolocationProvider;
use crate::models::{
    now_ms, ActionKind, Anomaly, SecurityAction, SecurityEvent, SecurityEventKind,
    UserLocationHistory,
};
use crate::notify::EmailSender;
use crate::persistence::StateStore;

/// Aggregate counters over engine state.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub total_events: usize,
    pub events_by_type: HashMap<SecurityEventKind, usize>,
    pub failed_login_users: usize,
    pub monitored_ips: usize,
    pub total_actions: usize,
}

/// Counters over the location history store.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocationStats {
    pub tracked_users: usize,
    pub total_samples: usize,
}

pub struct MonitorEngine {
    config: MonitorConfig,
    failed_logins: Mutex<RateWindowCounter>,
    request_rates: Mutex<RateWindowCounter>,
    detector: Mutex<AnomalyDetector>,
    events: Mutex<Vec<SecurityEvent>>,
    dispatcher: ActionDispatcher,
    geolocator: Option<Arc<dyn GeolocationProvider>>,
    store: Option<Arc<dyn StateStore>>,
}

impl MonitorEngine {
    pub fn new(config: MonitorConfig) -> Self {
        let failed_logins = RateWindowCounter::new(config.failed_login_window_ms());
        let request_rates = RateWindowCounter::new(config.bot_detection_window_ms());
        let detector = AnomalyDetector::new(config.rules.clone());
        MonitorEngine {
            config,
            failed_logins: Mutex::new(failed_logins),
            request_rates: Mutex::new(request_rates),
            detector: Mutex::new(detector),
            events: Mutex::new(Vec::new()),
            dispatcher: ActionDispatcher::new(),
            geolocator: None,
            store: None,
        }
    }

    /// Wire in the geolocation capability used on successful logins.
    pub fn with_geolocator(mut self, geolocator: Arc<dyn GeolocationProvider>) -> Self {
        self.geolocator = Some(geolocator);
        self
    }

    /// Wire in the email capability used by the action dispatcher.
    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.dispatcher = std::mem::take(&mut self.dispatcher).with_mailer(mailer);
        self
    }

    /// Mirror history, attempts and actions to a durable store.
    pub fn with_persistence(mut self, store: Arc<dyn StateStore>) -> Self {
        self.detector = Mutex::new(AnomalyDetector::with_persistence(
            self.config.rules.clone(),
            store.clone(),
        ));
        self.dispatcher = std::mem::take(&mut self.dispatcher).with_persistence(store.clone());
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Pre-auth request inspection. Records the request against the
    /// per-IP rate window and emits a bot_activity event at or past
    /// the threshold. Never rejects the request.
    pub fn on_request(&self, ip: &str) -> usize {
        if !self.config.enable_bot_detection {
            return 0;
        }

        let count = {
            let mut rates = self.request_rates.lock().unwrap();
            rates.record(ip)
        };

        if count >= self.config.bot_detection_threshold {
            let mut event = SecurityEvent::new(
                SecurityEventKind::BotActivity,
                None,
                ip,
                format!(
                    "{} requests from {} within {}s",
                    count, ip, self.config.bot_detection_window_seconds
                ),
            );
            event.attempts = Some(count);
            self.emit(event);
        }

        count
    }

    /// Record one failed login. At or past the threshold, emits a
    /// failed_login event and runs the remediation sequence: enable_2fa
    /// and reset_password when their policy gates are on, then a
    /// security_alert unconditionally. Returns the windowed count.
    pub async fn on_failed_login(&self, user_id: &str, ip: &str) -> usize {
        if !self.config.enable_failed_login_monitoring {
            return 0;
        }

        let count = {
            let mut counter = self.failed_logins.lock().unwrap();
            counter.record(user_id)
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.add_failed_attempt(user_id, ip, now_ms()) {
                log::warn!("failed to persist attempt for {}: {}", user_id, e);
            }
        }

        if count >= self.config.failed_login_threshold {
            let reason = format!(
                "{} failed login attempts within {} minutes",
                count, self.config.failed_login_window_minutes
            );

            let mut event = SecurityEvent::new(
                SecurityEventKind::FailedLogin,
                Some(user_id),
                ip,
                reason.clone(),
            );
            event.attempts = Some(count);
            self.emit(event);

            if self.config.actions.enable_2fa_enforcement {
                self.dispatcher
                    .dispatch(ActionKind::Enable2fa, user_id, &reason, ip)
                    .await;
            }
            if self.config.actions.enable_password_reset_enforcement {
                self.dispatcher
                    .dispatch(ActionKind::ResetPassword, user_id, &reason, ip)
                    .await;
            }
            self.dispatcher
                .dispatch(ActionKind::SecurityAlert, user_id, &reason, ip)
                .await;
        }

        count
    }

    /// Post-auth location evaluation. Resolves the login IP, classifies
    /// the sample and runs the anomaly rules, emitting one typed event
    /// per anomaly. Fail-open throughout: private addresses, missing
    /// geolocator and resolution failures all return an empty list.
    pub async fn on_successful_login(&self, user_id: &str, ip: &str) -> Vec<Anomaly> {
        if !self.config.enable_location_detection {
            return Vec::new();
        }

        let addr = match IpAddr::from_str(ip) {
            Ok(addr) => addr,
            Err(_) => {
                log::debug!("skipping location detection for unparseable address {}", ip);
                return Vec::new();
            }
        };
        if geo::is_private_ip(&addr) {
            log::debug!("skipping location detection for private address {}", ip);
            return Vec::new();
        }

        let geolocator = match &self.geolocator {
            Some(g) => g,
            None => return Vec::new(),
        };

        let mut sample = match geolocator.resolve(addr).await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("geolocation failed for {} ({}): {}", ip, user_id, e);
                return Vec::new();
            }
        };

        let anomalies = {
            let mut detector = self.detector.lock().unwrap();
            detector.classify(&mut sample);
            detector.evaluate(user_id, sample)
        };

        for anomaly in &anomalies {
            let mut event = SecurityEvent::new(
                anomaly.kind.into(),
                Some(user_id),
                ip,
                anomaly.description.clone(),
            );
            event.metadata = serde_json::to_value(anomaly).unwrap_or_default();
            self.emit(event);
        }

        anomalies
    }

    /// Manual remediation entry point; same path as automatic dispatch.
    pub async fn trigger_action(
        &self,
        kind: ActionKind,
        user_id: &str,
        reason: &str,
        ip: &str,
    ) -> SecurityAction {
        self.dispatcher.dispatch(kind, user_id, reason, ip).await
    }

    fn emit(&self, event: SecurityEvent) {
        log::warn!(
            "security event {:?} user={:?} ip={}: {}",
            event.kind,
            event.user_id,
            event.ip,
            event.description
        );
        let mut events = self.events.lock().unwrap();
        events.push(event);
    }

    // ---- query surface: pure reads, no side effects ----

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stats(&self) -> MonitorStats {
        let events = self.events.lock().unwrap();
        let mut events_by_type: HashMap<SecurityEventKind, usize> = HashMap::new();
        for event in events.iter() {
            *events_by_type.entry(event.kind).or_insert(0) += 1;
        }

        MonitorStats {
            total_events: events.len(),
            events_by_type,
            failed_login_users: self.failed_logins.lock().unwrap().tracked_keys(),
            monitored_ips: self.request_rates.lock().unwrap().tracked_keys(),
            total_actions: self.dispatcher.total_actions(),
        }
    }

    pub fn location_stats(&self) -> LocationStats {
        let detector = self.detector.lock().unwrap();
        LocationStats {
            tracked_users: detector.tracked_users(),
            total_samples: detector.retained_samples(),
        }
    }

    pub fn user_actions(&self, user_id: &str) -> Vec<SecurityAction> {
        self.dispatcher.user_actions(user_id)
    }

    pub fn user_location_history(&self, user_id: &str) -> Option<UserLocationHistory> {
        let detector = self.detector.lock().unwrap();
        detector.user_history(user_id).cloned()
    }
}
