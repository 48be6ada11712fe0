use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::types::geo::Coordinate;

/// Address lookup service.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// First match for `query`, or `None` when the provider has nothing.
    async fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError>;
}

/// Nominatim-compatible `/search` endpoint.
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
    country_codes: Option<String>,
    timeout: Duration,
}

impl NominatimProvider {
    pub fn new(base_url: &str, user_agent: &str, country_codes: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("Falling back to default HTTP client for geocoding: {}", err);
                reqwest::Client::new()
            });

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            country_codes,
            timeout,
        }
    }

    fn search_url(&self, query: &str) -> Result<reqwest::Url, GeocodeError> {
        let mut params = vec![("format", "json"), ("limit", "1"), ("q", query)];
        if let Some(codes) = self.country_codes.as_deref() {
            params.push(("countrycodes", codes));
        }
        reqwest::Url::parse_with_params(&format!("{}/search", self.base_url), &params)
            .map_err(|err| GeocodeError::Transport(format!("Invalid geocode URL: {}", err)))
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn lookup(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let url = self.search_url(query)?;
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GeocodeError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    GeocodeError::Transport(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GeocodeError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| GeocodeError::Transport(err.to_string()))?;
        parse_candidates(&body)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseFloat {
    Number(f64),
    Text(String),
}

impl LooseFloat {
    fn value(&self) -> Option<f64> {
        match self {
            LooseFloat::Number(n) => Some(*n),
            LooseFloat::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(alias = "latitude")]
    lat: LooseFloat,
    #[serde(alias = "longitude", alias = "lng")]
    lon: LooseFloat,
}

/// Reads a provider response: a JSON array of candidates carrying
/// `lat`/`lon` (or `latitude`/`longitude`) as numbers or numeric strings.
pub fn parse_candidates(body: &[u8]) -> Result<Option<Coordinate>, GeocodeError> {
    let candidates: Vec<Candidate> =
        serde_json::from_slice(body).map_err(|err| GeocodeError::Decode(err.to_string()))?;

    let Some(first) = candidates.first() else {
        return Ok(None);
    };

    match (first.lat.value(), first.lon.value()) {
        (Some(latitude), Some(longitude)) => {
            let coords = Coordinate::new(latitude, longitude);
            if coords.is_valid() {
                Ok(Some(coords))
            } else {
                Err(GeocodeError::Decode(format!(
                    "Coordinate out of range: {}, {}",
                    latitude, longitude
                )))
            }
        }
        _ => Err(GeocodeError::Decode("Candidate has no numeric lat/lon".to_string())),
    }
}
