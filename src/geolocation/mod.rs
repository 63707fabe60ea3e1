//! IP geolocation providers.
//!
//! Resolution is a strategy interface: hosts pick an offline MaxMind
//! database, the free ip-api.com endpoint, or a [`ProviderChain`] that
//! tries several in order with first-success-wins semantics. The engine
//! treats every resolution failure as "skip detection for this login".

use async_trait::async_trait;
use maxminddb::{geoip2, Reader};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{now_ms, LocationSample};

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("IP address not found: {0}")]
    NotFound(IpAddr),

    #[error("Location data missing for IP address")]
    NoLocation,

    #[error("Private or local address: {0}")]
    PrivateAddress(IpAddr),

    #[error("Provider rejected lookup: {0}")]
    Rejected(String),

    #[error("All providers failed for {0}")]
    AllProvidersFailed(IpAddr),
}

/// Capability contract for resolving an IP to a location sample.
///
/// Implementations return raw samples; network classification and the
/// composite risk score are filled in later by the detector.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<LocationSample, GeoError>;

    /// Provider name for log context.
    fn name(&self) -> &'static str;
}

/// Offline lookup against a MaxMind GeoLite2-City database file.
///
/// The database ships no ISP/org strings, so samples from this provider
/// never classify as VPN/Tor/proxy by provider name; pair it with a
/// Tor exit-node set on the classifier if that matters.
pub struct MaxMindProvider {
    reader: Arc<Reader<Vec<u8>>>,
}

impl MaxMindProvider {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }
        let reader = Reader::open_readfile(path)?;
        Ok(MaxMindProvider {
            reader: Arc::new(reader),
        })
    }
}

impl Clone for MaxMindProvider {
    fn clone(&self) -> Self {
        MaxMindProvider {
            reader: Arc::clone(&self.reader),
        }
    }
}

#[async_trait]
impl GeolocationProvider for MaxMindProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<LocationSample, GeoError> {
        let city: geoip2::City = self.reader.lookup(ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound(ip),
            other => GeoError::DatabaseOpen(other),
        })?;

        let location = city.location.as_ref().ok_or(GeoError::NoLocation)?;
        let latitude = location.latitude.ok_or(GeoError::NoLocation)?;
        let longitude = location.longitude.ok_or(GeoError::NoLocation)?;

        Ok(LocationSample {
            ip: ip.to_string(),
            country: city
                .country
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|n| n.get("en").copied())
                .unwrap_or_default()
                .to_string(),
            country_code: city
                .country
                .as_ref()
                .and_then(|c| c.iso_code)
                .unwrap_or_default()
                .to_string(),
            region: city
                .subdivisions
                .as_ref()
                .and_then(|s| s.first())
                .and_then(|s| s.iso_code)
                .unwrap_or_default()
                .to_string(),
            city: city
                .city
                .as_ref()
                .and_then(|c| c.names.as_ref())
                .and_then(|n| n.get("en").copied())
                .unwrap_or_default()
                .to_string(),
            latitude,
            longitude,
            timezone: location.time_zone.unwrap_or("UTC").to_string(),
            isp: String::new(),
            org: String::new(),
            timestamp: now_ms(),
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            risk_score: 0,
        })
    }

    fn name(&self) -> &'static str {
        "maxmind"
    }
}

/// Remote lookup against the free ip-api.com JSON endpoint.
pub struct IpApiProvider {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
    region: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    isp: Option<String>,
    org: Option<String>,
    query: Option<String>,
}

impl IpApiProvider {
    pub fn new() -> Self {
        IpApiProvider {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for IpApiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeolocationProvider for IpApiProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<LocationSample, GeoError> {
        let url = format!(
            "http://ip-api.com/json/{}?fields=status,message,country,countryCode,region,city,lat,lon,timezone,isp,org,query",
            ip
        );
        let response: IpApiResponse = self.client.get(&url).send().await?.json().await?;

        if response.status != "success" {
            return Err(GeoError::Rejected(
                response.message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(LocationSample {
            ip: response.query.unwrap_or_else(|| ip.to_string()),
            country: response.country.unwrap_or_default(),
            country_code: response.country_code.unwrap_or_default(),
            region: response.region.unwrap_or_default(),
            city: response.city.unwrap_or_default(),
            latitude: response.lat.ok_or(GeoError::NoLocation)?,
            longitude: response.lon.ok_or(GeoError::NoLocation)?,
            timezone: response.timezone.unwrap_or_else(|| "UTC".to_string()),
            isp: response.isp.unwrap_or_default(),
            org: response.org.unwrap_or_default(),
            timestamp: now_ms(),
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            risk_score: 0,
        })
    }

    fn name(&self) -> &'static str {
        "ip-api"
    }
}

/// Remote lookup against ipinfo.io, authenticated with an API token.
pub struct IpInfoProvider {
    client: reqwest::Client,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    ip: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    /// "lat,lon"
    loc: Option<String>,
    org: Option<String>,
    timezone: Option<String>,
    bogon: Option<bool>,
}

impl IpInfoProvider {
    pub fn new(token: impl Into<String>) -> Self {
        IpInfoProvider {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            token: token.into(),
        }
    }
}

/// Split an ipinfo "lat,lon" pair into coordinates.
fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

#[async_trait]
impl GeolocationProvider for IpInfoProvider {
    async fn resolve(&self, ip: IpAddr) -> Result<LocationSample, GeoError> {
        let url = format!("https://ipinfo.io/{}?token={}", ip, self.token);
        let response: IpInfoResponse = self.client.get(&url).send().await?.json().await?;

        if response.bogon.unwrap_or(false) {
            return Err(GeoError::PrivateAddress(ip));
        }

        let loc = response.loc.ok_or(GeoError::NoLocation)?;
        let (latitude, longitude) = parse_loc(&loc).ok_or(GeoError::NoLocation)?;

        // ipinfo reports the org string only; it doubles as the ISP
        let org = response.org.unwrap_or_default();

        Ok(LocationSample {
            ip: response.ip.unwrap_or_else(|| ip.to_string()),
            country: String::new(),
            country_code: response.country.unwrap_or_default(),
            region: response.region.unwrap_or_default(),
            city: response.city.unwrap_or_default(),
            latitude,
            longitude,
            timezone: response.timezone.unwrap_or_else(|| "UTC".to_string()),
            isp: org.clone(),
            org,
            timestamp: now_ms(),
            is_vpn: false,
            is_tor: false,
            is_proxy: false,
            risk_score: 0,
        })
    }

    fn name(&self) -> &'static str {
        "ipinfo"
    }
}

/// Queries providers in order; the first successful resolution wins.
pub struct ProviderChain {
    providers: Vec<Arc<dyn GeolocationProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn GeolocationProvider>>) -> Self {
        ProviderChain { providers }
    }
}

#[async_trait]
impl GeolocationProvider for ProviderChain {
    async fn resolve(&self, ip: IpAddr) -> Result<LocationSample, GeoError> {
        for provider in &self.providers {
            match provider.resolve(ip).await {
                Ok(sample) => return Ok(sample),
                Err(e) => {
                    log::debug!("provider {} failed for {}: {}", provider.name(), ip, e);
                }
            }
        }
        Err(GeoError::AllProvidersFailed(ip))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
