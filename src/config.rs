use std::time::Duration;

use crate::pipeline::driver::MIN_TICK;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub tick_interval: Duration,
    pub session_ttl: Duration,
    pub geocode_base_url: String,
    pub geocode_user_agent: String,
    pub geocode_country_hint: Option<String>,
    pub geocode_country_codes: Option<String>,
    pub geocode_debounce: Duration,
    pub geocode_timeout: Duration,
    pub geocode_plausibility_km: f64,
    pub geocode_cache_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            tick_interval: Duration::from_millis(1000),
            session_ttl: Duration::from_secs(3600),
            geocode_base_url: "https://nominatim.openstreetmap.org".to_string(),
            geocode_user_agent: concat!("dronetrack-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            geocode_country_hint: Some("Viet Nam".to_string()),
            geocode_country_codes: Some("vn".to_string()),
            geocode_debounce: Duration::from_millis(450),
            geocode_timeout: Duration::from_millis(6500),
            geocode_plausibility_km: 200.0,
            geocode_cache_capacity: 256,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_parse("PORT").unwrap_or(defaults.port);

        let tick_interval_ms = env_parse::<u64>("TICK_INTERVAL_MS")
            .unwrap_or(defaults.tick_interval.as_millis() as u64)
            .max(MIN_TICK.as_millis() as u64);

        let session_ttl_seconds =
            env_parse("SESSION_TTL_SECONDS").unwrap_or(defaults.session_ttl.as_secs());

        let geocode_debounce_ms =
            env_parse("GEOCODE_DEBOUNCE_MS").unwrap_or(defaults.geocode_debounce.as_millis() as u64);

        let geocode_timeout_ms =
            env_parse("GEOCODE_TIMEOUT_MS").unwrap_or(defaults.geocode_timeout.as_millis() as u64);

        let geocode_plausibility_km = env_parse::<f64>("GEOCODE_PLAUSIBILITY_KM")
            .filter(|km| km.is_finite() && *km > 0.0)
            .unwrap_or(defaults.geocode_plausibility_km);

        Self {
            port,
            tick_interval: Duration::from_millis(tick_interval_ms),
            session_ttl: Duration::from_secs(session_ttl_seconds),
            geocode_base_url: env_string("GEOCODE_BASE_URL").unwrap_or(defaults.geocode_base_url),
            geocode_user_agent: env_string("GEOCODE_USER_AGENT").unwrap_or(defaults.geocode_user_agent),
            geocode_country_hint: env_optional("GEOCODE_COUNTRY_HINT", defaults.geocode_country_hint),
            geocode_country_codes: env_optional("GEOCODE_COUNTRY_CODES", defaults.geocode_country_codes),
            geocode_debounce: Duration::from_millis(geocode_debounce_ms),
            geocode_timeout: Duration::from_millis(geocode_timeout_ms),
            geocode_plausibility_km,
            geocode_cache_capacity: env_parse("GEOCODE_CACHE_CAPACITY")
                .unwrap_or(defaults.geocode_cache_capacity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// Set but empty switches the setting off.
fn env_optional(key: &str, default: Option<String>) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => None,
        Ok(value) => Some(value.trim().to_string()),
        Err(_) => default,
    }
}
