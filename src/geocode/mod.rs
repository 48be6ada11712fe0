mod cache;
mod provider;
mod subscription;

pub use cache::{GeocodeCache, DEFAULT_CACHE_CAPACITY};
pub use provider::{parse_candidates, GeocodeProvider, NominatimProvider};
pub use subscription::GeocodeSubscription;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::GeocodeError;
use crate::pipeline::geo::haversine_km;
use crate::types::geo::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub coords: Option<Coordinate>,
    pub status: GeocodeStatus,
    pub error: String,
}

impl GeocodeResult {
    pub fn idle() -> Self {
        Self {
            coords: None,
            status: GeocodeStatus::Idle,
            error: String::new(),
        }
    }

    pub fn loading() -> Self {
        Self {
            coords: None,
            status: GeocodeStatus::Loading,
            error: String::new(),
        }
    }

    pub fn success(coords: Coordinate) -> Self {
        Self {
            coords: Some(coords),
            status: GeocodeStatus::Success,
            error: String::new(),
        }
    }

    /// Error outcome that still carries `fallback`, so the map keeps working.
    pub fn failed(err: &GeocodeError, fallback: Option<Coordinate>) -> Self {
        let error = match fallback {
            Some(_) => format!("{}; using nearest known location", err),
            None => err.to_string(),
        };
        Self {
            coords: fallback,
            status: GeocodeStatus::Error,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == GeocodeStatus::Success
    }
}

#[derive(Debug, Clone)]
pub struct GeocodeOptions {
    pub timeout: Duration,
    pub debounce: Duration,
    pub plausibility_km: f64,
    pub country_hint: Option<String>,
}

impl Default for GeocodeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6500),
            debounce: Duration::from_millis(450),
            plausibility_km: 200.0,
            country_hint: Some("Viet Nam".to_string()),
        }
    }
}

impl GeocodeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.geocode_timeout,
            debounce: config.geocode_debounce,
            plausibility_km: config.geocode_plausibility_km,
            country_hint: config.geocode_country_hint.clone(),
        }
    }
}

/// Resolves free-text addresses through a [`GeocodeProvider`], caching hits.
#[derive(Clone)]
pub struct Geocoder {
    provider: Arc<dyn GeocodeProvider>,
    cache: Arc<GeocodeCache>,
    options: GeocodeOptions,
}

impl Geocoder {
    pub fn new(provider: Arc<dyn GeocodeProvider>, cache: Arc<GeocodeCache>, options: GeocodeOptions) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let provider = NominatimProvider::new(
            &config.geocode_base_url,
            &config.geocode_user_agent,
            config.geocode_country_codes.clone(),
            config.geocode_timeout,
        );
        Self::new(
            Arc::new(provider),
            Arc::new(GeocodeCache::new(config.geocode_cache_capacity)),
            GeocodeOptions::from_config(config),
        )
    }

    pub fn options(&self) -> &GeocodeOptions {
        &self.options
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Trims and collapses whitespace and appends the country hint when the
    /// query does not already name it. `None` for blank queries.
    pub fn normalize(&self, query: &str) -> Option<String> {
        let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        match self.options.country_hint.as_deref() {
            Some(hint) if !mentions_country(&collapsed, hint) => Some(format!("{}, {}", collapsed, hint)),
            _ => Some(collapsed),
        }
    }

    /// Cache-only lookup, no network.
    pub fn cached(&self, query: &str) -> Option<Coordinate> {
        let normalized = self.normalize(query)?;
        self.cache.get(&cache_key(&normalized))
    }

    /// Cache-only resolution. Cached coordinates still have to land near
    /// `fallback`, since the entry may have been stored by a caller that gave
    /// none.
    pub fn resolve_cached(&self, query: &str, fallback: Option<Coordinate>) -> Option<GeocodeResult> {
        let normalized = self.normalize(query)?;
        let coords = self.cache.get(&cache_key(&normalized))?;
        Some(self.judge_cached(&normalized, coords, fallback))
    }

    fn judge_cached(&self, normalized: &str, coords: Coordinate, fallback: Option<Coordinate>) -> GeocodeResult {
        match self.check_plausible(coords, fallback) {
            Ok(coords) => GeocodeResult::success(coords),
            Err(err) => {
                tracing::warn!("Cached geocode for \"{}\" rejected: {}", normalized, err);
                GeocodeResult::failed(&err, fallback)
            }
        }
    }

    fn check_plausible(&self, coords: Coordinate, fallback: Option<Coordinate>) -> Result<Coordinate, GeocodeError> {
        if let Some(expected) = fallback {
            let distance_km = haversine_km(Some(coords), Some(expected));
            if distance_km > self.options.plausibility_km {
                return Err(GeocodeError::Implausible { distance_km });
            }
        }
        Ok(coords)
    }

    pub async fn resolve(&self, query: &str, fallback: Option<Coordinate>) -> GeocodeResult {
        let Some(normalized) = self.normalize(query) else {
            return GeocodeResult::idle();
        };
        let key = cache_key(&normalized);

        if let Some(coords) = self.cache.get(&key) {
            tracing::debug!("Geocode cache hit for \"{}\"", normalized);
            return self.judge_cached(&normalized, coords, fallback);
        }
        tracing::debug!("Geocode cache miss for \"{}\"", normalized);

        match self.fetch(&normalized, fallback).await {
            Ok(coords) => {
                self.cache.insert(key, coords);
                GeocodeResult::success(coords)
            }
            Err(err) => {
                tracing::warn!("Geocoding \"{}\" failed: {}", normalized, err);
                GeocodeResult::failed(&err, fallback)
            }
        }
    }

    async fn fetch(&self, normalized: &str, fallback: Option<Coordinate>) -> Result<Coordinate, GeocodeError> {
        let lookup = self.provider.lookup(normalized);
        let coords = tokio::time::timeout(self.options.timeout, lookup)
            .await
            .map_err(|_| GeocodeError::Timeout(self.options.timeout.as_millis() as u64))??
            .ok_or_else(|| GeocodeError::NoMatch(normalized.to_string()))?;

        self.check_plausible(coords, fallback)
    }
}

fn mentions_country(query: &str, hint: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    squash(query).contains(&squash(hint))
}

fn cache_key(normalized: &str) -> String {
    normalized.to_lowercase()
}
