//! Address to coordinate resolution through an ordered provider chain.

mod geocoding_jp;
mod google;

pub use geocoding_jp::GeocodingJpGeocoder;
pub use google::GoogleMapsGeocoder;

use crate::config::ProviderConfig;
use serde::Serialize;
use std::fmt::Debug;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// A WGS84 point. Construction rejects values outside the valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeocodeError> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(GeocodeError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodingProviderKind {
    GoogleMaps,
    GeocodingJp,
}

impl GeocodingProviderKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::GoogleMaps => "google",
            Self::GeocodingJp => "geocoding_jp",
        }
    }
}

impl std::fmt::Display for GeocodingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeHit {
    pub coordinate: GeoCoordinate,
    pub formatted_address: String,
    pub provider: GeocodingProviderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReverseGeocodeHit {
    pub formatted_address: String,
    pub components: Vec<String>,
    pub provider: GeocodingProviderKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    #[error("無効な座標です ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("{provider}: {message}")]
    Provider {
        provider: GeocodingProviderKind,
        message: String,
    },
    #[error("{0} API キーが設定されていません")]
    NotConfigured(GeocodingProviderKind),
    #[error("ジオコーディングに失敗しました: {address}")]
    AllProvidersFailed { address: String },
}

impl GeocodeError {
    pub(crate) fn provider(provider: GeocodingProviderKind, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Transport failure with the request URL stripped, since providers take
    /// their API key as a query parameter.
    pub(crate) fn transport(provider: GeocodingProviderKind, err: reqwest::Error) -> Self {
        Self::provider(provider, format!("リクエストエラー: {}", err.without_url()))
    }
}

/// One geocoding backend.
pub trait GeocodingProvider: Debug + Send + Sync {
    fn kind(&self) -> GeocodingProviderKind;

    fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError>;

    fn reverse_geocode(
        &self,
        _coordinate: GeoCoordinate,
    ) -> Result<ReverseGeocodeHit, GeocodeError> {
        Err(GeocodeError::NotConfigured(self.kind()))
    }
}

/// Result of one address inside [`Geocoder::batch_geocode`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchGeocode {
    pub address: String,
    pub result: Result<GeocodeHit, GeocodeError>,
}

/// Tries each provider in order and returns the first success.
#[derive(Debug)]
pub struct Geocoder {
    providers: Vec<Box<dyn GeocodingProvider>>,
    batch_pause: Duration,
}

impl Geocoder {
    pub fn new(providers: Vec<Box<dyn GeocodingProvider>>) -> Self {
        Self {
            providers,
            batch_pause: BATCH_PAUSE,
        }
    }

    /// Google Maps first when a key is configured, geocoding.jp always.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, GeocodeError> {
        let mut providers: Vec<Box<dyn GeocodingProvider>> = Vec::new();
        if let Some(key) = config.google_maps_api_key.as_deref() {
            providers.push(Box::new(GoogleMapsGeocoder::new(key, config.timeout)?));
        }
        providers.push(Box::new(GeocodingJpGeocoder::new(
            config.geocoding_jp_api_key.clone(),
            config.timeout,
        )?));
        Ok(Self::new(providers))
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = GeocodingProviderKind> + '_ {
        self.providers.iter().map(|provider| provider.kind())
    }

    pub fn geocode(&self, address: &str) -> Result<GeocodeHit, GeocodeError> {
        info!(%address, "geocoding address");
        for provider in &self.providers {
            match provider.geocode(address) {
                Ok(hit) => {
                    info!(provider = %hit.provider, lat = hit.coordinate.latitude, lon = hit.coordinate.longitude, "geocoded");
                    return Ok(hit);
                }
                Err(err) => warn!(provider = %provider.kind(), error = %err, "geocoding provider failed"),
            }
        }
        Err(GeocodeError::AllProvidersFailed {
            address: address.to_string(),
        })
    }

    /// Asks every provider, keeping each outcome.
    pub fn geocode_all(&self, address: &str) -> Vec<Result<GeocodeHit, GeocodeError>> {
        self.providers
            .iter()
            .map(|provider| provider.geocode(address))
            .collect()
    }

    pub fn reverse_geocode(
        &self,
        coordinate: GeoCoordinate,
    ) -> Result<ReverseGeocodeHit, GeocodeError> {
        let coordinate = GeoCoordinate::new(coordinate.latitude, coordinate.longitude)?;
        let mut last_error = None;
        for provider in &self.providers {
            match provider.reverse_geocode(coordinate) {
                Ok(hit) => return Ok(hit),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or(GeocodeError::NotConfigured(
            GeocodingProviderKind::GoogleMaps,
        )))
    }

    /// Geocodes addresses one after another, pausing between requests.
    pub fn batch_geocode(&self, addresses: &[String]) -> Vec<BatchGeocode> {
        let mut results = Vec::with_capacity(addresses.len());
        for (index, address) in addresses.iter().enumerate() {
            info!(progress = index + 1, total = addresses.len(), "batch geocoding");
            results.push(BatchGeocode {
                address: address.clone(),
                result: self.geocode(address),
            });
            if index + 1 < addresses.len() && !self.batch_pause.is_zero() {
                thread::sleep(self.batch_pause);
            }
        }
        results
    }
}

/// Prefers a Google Maps hit, else the first success.
pub fn best_result<'a, I>(results: I) -> Option<&'a GeocodeHit>
where
    I: IntoIterator<Item = &'a Result<GeocodeHit, GeocodeError>>,
{
    let hits: Vec<&GeocodeHit> = results
        .into_iter()
        .filter_map(|result| result.as_ref().ok())
        .collect();
    hits.iter()
        .copied()
        .find(|hit| hit.provider == GeocodingProviderKind::GoogleMaps)
        .or_else(|| hits.first().copied())
}
