//! Location anomaly evaluation.
//!
//! One call to [`AnomalyDetector::evaluate`] classifies a freshly resolved
//! login location against the user's retained history and returns every
//! rule that fired. Rules are independent and individually configurable;
//! several can co-fire for one sample. The sample is appended to history
//! as part of the call, but never compared against itself.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;

use crate::config::DetectionRules;
use crate::geo;
use crate::models::{Anomaly, AnomalyKind, LocationSample, Severity, UserLocationHistory};
use crate::network::NetworkClassifier;
use crate::persistence::StateStore;

use super::history::LocationHistoryStore;

const NEW_LOCATION_LOOKBACK_MS: i64 = 24 * 3_600_000;

pub struct AnomalyDetector {
    rules: DetectionRules,
    suspicious_countries: HashSet<String>,
    classifier: NetworkClassifier,
    history: LocationHistoryStore,
}

impl AnomalyDetector {
    pub fn new(rules: DetectionRules) -> Self {
        let suspicious_countries = rules.suspicious_countries.iter().cloned().collect();
        let history = LocationHistoryStore::new(rules.location_anomaly_window_hours);
        AnomalyDetector {
            rules,
            suspicious_countries,
            classifier: NetworkClassifier::new(),
            history,
        }
    }

    /// Create with a persistence backend for the location history.
    pub fn with_persistence(rules: DetectionRules, store: Arc<dyn StateStore>) -> Self {
        let suspicious_countries = rules.suspicious_countries.iter().cloned().collect();
        let history =
            LocationHistoryStore::with_persistence(rules.location_anomaly_window_hours, store);
        AnomalyDetector {
            rules,
            suspicious_countries,
            classifier: NetworkClassifier::new(),
            history,
        }
    }

    /// Swap in a differently seeded classifier (custom VPN fragments,
    /// a Tor exit-node snapshot).
    pub fn with_classifier(mut self, classifier: NetworkClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Fill the sample's derived network flags and composite risk score.
    /// Runs once per resolved sample, before evaluation.
    pub fn classify(&self, sample: &mut LocationSample) {
        let assessment = self.classifier.assess(&sample.ip, &sample.isp, &sample.org);
        sample.is_vpn = assessment.is_vpn;
        sample.is_tor = assessment.is_tor;
        sample.is_proxy = assessment.is_proxy;
        sample.risk_score = self.classifier.risk_score(
            &assessment,
            self.suspicious_countries.contains(&sample.country_code),
            &sample.isp,
            &sample.org,
        );
    }

    /// Evaluate a sample for anomalies, appending it to the user's history.
    ///
    /// Samples with invalid coordinates are skipped entirely: no anomalies,
    /// no history update. History-dependent rules require
    /// `min_location_history` samples recorded before this call.
    pub fn evaluate(&mut self, user_id: &str, sample: LocationSample) -> Vec<Anomaly> {
        if !geo::validate_coordinates(sample.latitude, sample.longitude) {
            log::debug!(
                "skipping anomaly evaluation for {}: invalid coordinates ({}, {})",
                user_id,
                sample.latitude,
                sample.longitude
            );
            return Vec::new();
        }

        let mut anomalies = Vec::new();

        if self.rules.enable_vpn_detection && sample.is_vpn {
            anomalies.push(vpn_anomaly(&sample));
        }
        if self.rules.enable_tor_detection && sample.is_tor {
            anomalies.push(tor_anomaly(&sample));
        }
        if self.rules.enable_suspicious_country_detection
            && self.suspicious_countries.contains(&sample.country_code)
        {
            anomalies.push(suspicious_country_anomaly(&sample));
        }

        let prior = self.history.prior_locations(user_id);
        self.history.record(user_id, sample.clone());

        if prior.len() >= self.rules.min_location_history {
            if let Some(previous) = prior.last() {
                if self.rules.enable_impossible_travel_detection {
                    if let Some(anomaly) =
                        self.detect_impossible_travel(previous, &sample)
                    {
                        anomalies.push(anomaly);
                    }
                }
                if self.rules.enable_new_country_detection {
                    if let Some(anomaly) = detect_new_country(&prior, &sample) {
                        anomalies.push(anomaly);
                    }
                }
                if self.rules.enable_new_city_detection {
                    if let Some(anomaly) = detect_new_city(&prior, &sample) {
                        anomalies.push(anomaly);
                    }
                }
                if self.rules.enable_timezone_anomaly_detection {
                    if let Some(anomaly) = detect_timezone_anomaly(previous, &sample) {
                        anomalies.push(anomaly);
                    }
                }
            }
        }

        anomalies
    }

    /// Read-only view of a user's retained history.
    pub fn user_history(&self, user_id: &str) -> Option<&UserLocationHistory> {
        self.history.get(user_id)
    }

    pub fn tracked_users(&self) -> usize {
        self.history.tracked_users()
    }

    pub fn retained_samples(&self) -> usize {
        self.history.retained_samples()
    }

    fn detect_impossible_travel(
        &self,
        previous: &LocationSample,
        current: &LocationSample,
    ) -> Option<Anomaly> {
        let time_diff_hours = (current.timestamp - previous.timestamp) as f64 / 3_600_000.0;
        // Below half an hour the speed estimate is dominated by
        // geolocation noise and near-simultaneous requests
        if time_diff_hours < 0.5 {
            return None;
        }

        let distance = geo::distance_km(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );
        let speed = distance / time_diff_hours;
        if speed <= self.rules.max_travel_speed_kmh {
            return None;
        }

        let ratio = speed / self.rules.max_travel_speed_kmh;
        Some(Anomaly {
            kind: AnomalyKind::ImpossibleTravel,
            severity: if speed > 2000.0 {
                Severity::Critical
            } else {
                Severity::High
            },
            confidence: ratio.min(0.9),
            risk_score: (ratio * 100.0).min(100.0) as u8,
            description: format!(
                "Impossible travel detected: {:.1}km in {:.1}h ({:.1} km/h)",
                distance, time_diff_hours, speed
            ),
            metadata: json!({
                "distance": distance,
                "timeDiff": time_diff_hours,
                "speed": speed,
                "previousLocation": previous,
                "currentLocation": current,
            }),
        })
    }
}

fn vpn_anomaly(sample: &LocationSample) -> Anomaly {
    Anomaly {
        kind: AnomalyKind::VpnDetected,
        severity: Severity::Medium,
        confidence: 0.9,
        risk_score: 70,
        description: format!("VPN detected: {}", sample.isp),
        metadata: json!({ "isp": sample.isp, "org": sample.org }),
    }
}

fn tor_anomaly(sample: &LocationSample) -> Anomaly {
    Anomaly {
        kind: AnomalyKind::TorDetected,
        severity: Severity::High,
        confidence: 0.9,
        risk_score: 85,
        description: format!("Tor network detected: {}", sample.isp),
        metadata: json!({ "isp": sample.isp, "org": sample.org }),
    }
}

fn suspicious_country_anomaly(sample: &LocationSample) -> Anomaly {
    Anomaly {
        kind: AnomalyKind::SuspiciousCountry,
        severity: Severity::High,
        confidence: 0.8,
        risk_score: 80,
        description: format!("Suspicious country detected: {}", sample.country),
        metadata: json!({ "country": sample.country, "countryCode": sample.country_code }),
    }
}

fn detect_new_country(prior: &[LocationSample], current: &LocationSample) -> Option<Anomaly> {
    // Fixed 24h lookback regardless of the configured anomaly window
    let lookback = current.timestamp - NEW_LOCATION_LOOKBACK_MS;
    let seen = prior
        .iter()
        .any(|loc| loc.country_code == current.country_code && loc.timestamp > lookback);
    if seen {
        return None;
    }

    let mut previous_countries: Vec<&str> =
        prior.iter().map(|loc| loc.country_code.as_str()).collect();
    previous_countries.sort_unstable();
    previous_countries.dedup();

    Some(Anomaly {
        kind: AnomalyKind::NewCountry,
        severity: Severity::Medium,
        confidence: 0.8,
        risk_score: 60,
        description: format!("New country detected: {}", current.country),
        metadata: json!({
            "country": current.country,
            "countryCode": current.country_code,
            "previousCountries": previous_countries,
        }),
    })
}

fn detect_new_city(prior: &[LocationSample], current: &LocationSample) -> Option<Anomaly> {
    let lookback = current.timestamp - NEW_LOCATION_LOOKBACK_MS;
    let seen = prior.iter().any(|loc| {
        loc.city == current.city
            && loc.country_code == current.country_code
            && loc.timestamp > lookback
    });
    if seen {
        return None;
    }

    let mut previous_cities: Vec<String> = prior
        .iter()
        .map(|loc| format!("{}, {}", loc.city, loc.country_code))
        .collect();
    previous_cities.sort_unstable();
    previous_cities.dedup();

    Some(Anomaly {
        kind: AnomalyKind::NewCity,
        severity: Severity::Low,
        confidence: 0.7,
        risk_score: 30,
        description: format!("New city detected: {}, {}", current.city, current.country),
        metadata: json!({
            "city": current.city,
            "country": current.country,
            "previousCities": previous_cities,
        }),
    })
}

fn detect_timezone_anomaly(
    previous: &LocationSample,
    current: &LocationSample,
) -> Option<Anomaly> {
    if previous.timezone == current.timezone {
        return None;
    }

    let time_diff_hours = (current.timestamp - previous.timestamp) as f64 / 3_600_000.0;
    let offset_diff_hours = geo::timezone::offset_difference_hours(
        &previous.timezone,
        &current.timezone,
        current.timestamp,
    );

    // Travel time should roughly match the zone change
    if (time_diff_hours - offset_diff_hours).abs() <= 2.0 {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::TimezoneAnomaly,
        severity: Severity::Medium,
        confidence: 0.7,
        risk_score: 50,
        description: format!(
            "Timezone anomaly: {} to {} in {:.1}h",
            previous.timezone, current.timezone, time_diff_hours
        ),
        metadata: json!({
            "previousTimezone": previous.timezone,
            "currentTimezone": current.timezone,
            "timeDiff": time_diff_hours,
            "timezoneDiff": offset_diff_hours,
        }),
    })
}
