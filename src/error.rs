use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocode lookup timed out after {0} ms")]
    Timeout(u64),
    #[error("No match found for \"{0}\"")]
    NoMatch(String),
    #[error("Match is {distance_km:.0} km away from the expected area")]
    Implausible { distance_km: f64 },
    #[error("Geocode request failed: {0}")]
    Transport(String),
    #[error("Geocode provider returned status {0}")]
    Status(u16),
    #[error("Unreadable geocode response: {0}")]
    Decode(String),
}

/// Problems found while normalizing an incoming order. None of them are fatal:
/// each one is patched with a default and reported back as a warning.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedOrder {
    #[error("Order has no id, generated {0}")]
    MissingId(String),
    #[error("Order has no restaurant address, using default origin")]
    MissingOrigin,
    #[error("Order has no delivery address, using default destination")]
    MissingDestination,
    #[error("Order has no creation time, using current time")]
    MissingCreatedAt,
    #[error("Unreadable timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Order has no delivery estimate, assuming {0} minutes")]
    MissingEstimate(u32),
    #[error("Estimated delivery is not after creation time")]
    InvalidDeliveryWindow,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallbackFailure {
    #[error("Completion handler failed: {0}")]
    Returned(String),
    #[error("Completion handler panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("SVG generation failed: {0}")]
    SvgError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("PNG rendering failed: {0}")]
    RenderFailed(String),
    #[error("Animation rendering failed: {0}")]
    AnimationFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("GPX export failed: {0}")]
    Xml(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Tracking session not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Render(_) | AppError::Raster(_) | AppError::Export(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
