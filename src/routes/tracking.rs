use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::driver::apply_signal;
use crate::pipeline::progress::ProgressSignal;
use crate::pipeline::route::{self, DEFAULT_ROUTE_SEGMENTS};
use crate::state::AppState;
use crate::types::order::OrderRecord;
use crate::types::tracking::{RouteView, TrackingSnapshot};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tracking", post(start_tracking))
        .route(
            "/api/tracking/:order_id",
            get(get_snapshot).delete(stop_tracking),
        )
        .route("/api/tracking/:order_id/progress", post(report_progress))
        .route("/api/tracking/:order_id/route", get(get_route))
}

async fn start_tracking(
    State(state): State<AppState>,
    Json(order): Json<OrderRecord>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.start_tracking(order).await;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    state
        .snapshot(&order_id)
        .map(Json)
        .ok_or(AppError::NotFound(order_id))
}

#[derive(Deserialize)]
struct ProgressReport {
    progress: f64,
}

async fn report_progress(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(report): Json<ProgressReport>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    let value = parse_progress(report.progress)?;

    let snapshot = state
        .with_session(&order_id, |session, ctx| {
            apply_signal(session, ProgressSignal::Explicit(value), ctx);
            session.snapshot()
        })
        .ok_or_else(|| AppError::NotFound(order_id.clone()))?;

    tracing::info!(
        "Order {} reported progress {:.1}%, now at {:.1}%",
        order_id,
        value * 100.0,
        snapshot.progress_percent
    );
    Ok(Json(snapshot))
}

/// Fractions in `[0, 1]`; anything above 1 up to 100 is read as a percentage.
fn parse_progress(raw: f64) -> Result<f64, AppError> {
    if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
        return Err(AppError::BadRequest(format!(
            "Invalid progress: {}. Use a fraction between 0 and 1 or a percentage up to 100",
            raw
        )));
    }
    Ok(if raw > 1.0 { raw / 100.0 } else { raw })
}

async fn get_route(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<RouteView>, AppError> {
    state
        .with_session(&order_id, |session, _| {
            route::route_view(session, DEFAULT_ROUTE_SEGMENTS)
        })
        .map(Json)
        .ok_or(AppError::NotFound(order_id))
}

async fn stop_tracking(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<TrackingSnapshot>, AppError> {
    let snapshot = state
        .stop_tracking(&order_id)
        .ok_or_else(|| AppError::NotFound(order_id.clone()))?;
    tracing::info!("Stopped tracking order {}", order_id);
    Ok(Json(snapshot))
}
