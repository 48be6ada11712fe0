use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::geocode::GeocodeResult;
use crate::state::AppState;
use crate::types::geo::Coordinate;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/geocode", get(geocode))
}

#[derive(Deserialize)]
struct GeocodeQuery {
    #[serde(default)]
    q: String,
    fallback_lat: Option<f64>,
    fallback_lon: Option<f64>,
}

async fn geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<GeocodeResult>, AppError> {
    let fallback = match (query.fallback_lat, query.fallback_lon) {
        (Some(lat), Some(lon)) => {
            let coords = Coordinate::new(lat, lon);
            if !coords.is_valid() {
                return Err(AppError::BadRequest(format!(
                    "Invalid fallback coordinates: {}, {}",
                    lat, lon
                )));
            }
            Some(coords)
        }
        (None, None) => None,
        _ => {
            return Err(AppError::BadRequest(
                "fallback_lat and fallback_lon must be given together".to_string(),
            ))
        }
    };

    Ok(Json(state.geocoder().resolve(&query.q, fallback).await))
}
