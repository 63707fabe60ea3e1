//! VPN/Tor/proxy inference from ISP and organization strings.
//!
//! Classification is deliberately a substring/set-membership heuristic:
//! authoritative VPN and Tor IP feeds are an external collaborator concern,
//! so the contract here is only deterministic, explainable classification
//! from the strings a geolocation provider already returns.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name fragments of well-known consumer VPN providers, matched
/// case-insensitively against ISP and org strings.
const DEFAULT_VPN_PROVIDERS: &[&str] = &[
    "nordvpn",
    "expressvpn",
    "surfshark",
    "cyberghost",
    "private internet access",
    "protonvpn",
    "windscribe",
    "tunnelbear",
    "ipvanish",
    "hotspot shield",
    "vyprvpn",
    "purevpn",
    "zenmate",
    "hidemyass",
    "buffered",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Outcome of network classification for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAssessment {
    pub is_vpn: bool,
    pub is_tor: bool,
    pub is_proxy: bool,
    pub confidence: f64,
    pub risk_level: RiskLevel,
}

pub struct NetworkClassifier {
    vpn_providers: HashSet<String>,
    tor_exit_nodes: HashSet<String>,
}

impl NetworkClassifier {
    pub fn new() -> Self {
        NetworkClassifier {
            vpn_providers: DEFAULT_VPN_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            tor_exit_nodes: HashSet::new(),
        }
    }

    /// Replace the VPN provider fragment set (lowercased on insert).
    pub fn with_vpn_providers<I: IntoIterator<Item = String>>(mut self, providers: I) -> Self {
        self.vpn_providers = providers.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    /// Seed known Tor exit-node addresses, e.g. from a directory snapshot.
    pub fn with_tor_exit_nodes<I: IntoIterator<Item = String>>(mut self, nodes: I) -> Self {
        self.tor_exit_nodes = nodes.into_iter().collect();
        self
    }

    /// Classify an IP by its provider strings and exit-node membership.
    pub fn assess(&self, ip: &str, isp: &str, org: &str) -> NetworkAssessment {
        let isp = isp.to_lowercase();
        let org = org.to_lowercase();

        let is_vpn = self.vpn_providers.contains(&isp)
            || self.vpn_providers.contains(&org)
            || self.vpn_providers.iter().any(|p| isp.contains(p) || org.contains(p))
            || isp.contains("vpn")
            || org.contains("vpn");

        let is_tor =
            self.tor_exit_nodes.contains(ip) || isp.contains("tor") || org.contains("tor");

        let is_proxy = isp.contains("proxy")
            || org.contains("proxy")
            || isp.contains("hosting")
            || org.contains("hosting");

        let confidence = if is_vpn {
            0.9
        } else if is_tor {
            0.8
        } else if is_proxy {
            0.6
        } else {
            0.1
        };

        let risk_level = if is_vpn || is_tor {
            RiskLevel::High
        } else if is_proxy {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        NetworkAssessment {
            is_vpn,
            is_tor,
            is_proxy,
            confidence,
            risk_level,
        }
    }

    /// Composite 0-100 risk score for a sample, independent of which
    /// anomaly rules later fire. Both ISP and org contribute the hosting
    /// component when both carry the marker.
    pub fn risk_score(
        &self,
        assessment: &NetworkAssessment,
        suspicious_country: bool,
        isp: &str,
        org: &str,
    ) -> u8 {
        let mut score: u32 = 0;

        if suspicious_country {
            score += 40;
        }
        if assessment.is_vpn {
            score += 30;
        }
        if assessment.is_tor {
            score += 50;
        }
        if assessment.is_proxy {
            score += 20;
        }
        if isp.to_lowercase().contains("hosting") {
            score += 15;
        }
        if org.to_lowercase().contains("hosting") {
            score += 15;
        }

        score.min(100) as u8
    }
}

impl Default for NetworkClassifier {
    fn default() -> Self {
        Self::new()
    }
}
