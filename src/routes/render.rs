use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::error::AppError;
use crate::pipeline::render::MapFrame;
use crate::pipeline::route::{self, DEFAULT_ROUTE_SEGMENTS};
use crate::pipeline::{animate, export, rasterize, render};
use crate::state::AppState;
use crate::types::map::{MapOptions, Theme};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tracking/:order_id/map.png", get(map_png))
        .route("/api/tracking/:order_id/preview.apng", get(preview_apng))
        .route("/api/tracking/:order_id/trail.gpx", get(trail_gpx))
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MapQuery {
    theme: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    glow: Option<bool>,
    frames: Option<u32>,
}

impl MapQuery {
    fn into_options(self) -> Result<MapOptions, AppError> {
        let mut options = MapOptions::default();
        if let Some(name) = self.theme.as_deref() {
            options.theme = Theme::get(name).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Invalid theme: {}. Use 'day', 'night', or 'mono'",
                    name
                ))
            })?;
        }
        match (self.width, self.height) {
            (Some(width), Some(height)) => {
                validate_dimensions(width, height)?;
                options.width = width;
                options.height = height;
                options.padding = (width.min(height) / 15).max(12);
            }
            (None, None) => {}
            _ => {
                return Err(AppError::BadRequest(
                    "Both width and height must be provided together".to_string(),
                ))
            }
        }
        if let Some(glow) = self.glow {
            options.glow = glow;
        }
        if let Some(frames) = self.frames {
            options.frames = frames.min(MapOptions::MAX_FRAMES);
        }
        Ok(options)
    }
}

fn validate_dimensions(width: u32, height: u32) -> Result<(), AppError> {
    let allowed = MapOptions::MIN_SIZE..=MapOptions::MAX_SIZE;
    if !allowed.contains(&width) || !allowed.contains(&height) {
        return Err(AppError::BadRequest(format!(
            "Invalid dimensions: {}x{}. Width/height must be between {} and {}",
            width,
            height,
            MapOptions::MIN_SIZE,
            MapOptions::MAX_SIZE
        )));
    }
    Ok(())
}

async fn map_png(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<MapQuery>,
) -> Result<impl IntoResponse, AppError> {
    let options = query.into_options()?;
    let (view, progress, caption) = state
        .with_session(&order_id, |session, _| {
            let snapshot = session.snapshot();
            let caption = match &snapshot.restaurant_name {
                Some(name) => format!("{} · {} · {}", name, snapshot.eta_label, snapshot.distance_label),
                None => format!("{} · {}", snapshot.eta_label, snapshot.distance_label),
            };
            (route::route_view(session, DEFAULT_ROUTE_SEGMENTS), session.progress, caption)
        })
        .ok_or_else(|| AppError::NotFound(order_id.clone()))?;

    tracing::info!(
        "Rendering map for order {} ({}x{}, theme: {})",
        order_id,
        options.width,
        options.height,
        options.theme.name
    );
    let svg = render::render_map_svg(
        &MapFrame {
            view: &view,
            progress,
            caption: &caption,
        },
        &options,
    )?;
    let png = rasterize::rasterize(&svg, &options.canvas())?;
    tracing::info!("Generated PNG: {} bytes", png.len());

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "image/png")], png))
}

async fn preview_apng(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Query(query): Query<MapQuery>,
) -> Result<impl IntoResponse, AppError> {
    let options = query.into_options()?;
    let view = state
        .with_session(&order_id, |session, _| route::route_view(session, DEFAULT_ROUTE_SEGMENTS))
        .ok_or_else(|| AppError::NotFound(order_id.clone()))?;

    tracing::info!(
        "Rendering flight preview for order {} ({}x{}, {} frames)",
        order_id,
        options.width,
        options.height,
        options.frames
    );
    let apng = tokio::task::spawn_blocking(move || animate::render_preview_apng(&view, &options))
        .await
        .map_err(|e| AppError::Internal(format!("Preview task failed: {}", e)))??;
    tracing::info!("Generated APNG: {} bytes", apng.len());

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "image/apng")], apng))
}

async fn trail_gpx(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let gpx = state
        .with_session(&order_id, |session, _| export::trail_to_gpx(session))
        .ok_or_else(|| AppError::NotFound(order_id.clone()))??;

    let disposition = format!("attachment; filename=\"drone-trail-{}.gpx\"", sanitize_filename(&order_id));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gpx+xml".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        gpx,
    ))
}

fn sanitize_filename(order_id: &str) -> String {
    order_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_to_day_theme() {
        let options = MapQuery::default().into_options().expect("options");
        assert_eq!(options.theme.name, "day");
        assert_eq!(options.width, MapOptions::default().width);
    }

    #[test]
    fn query_rejects_bad_input() {
        let unknown_theme = MapQuery {
            theme: Some("neon".to_string()),
            ..MapQuery::default()
        };
        assert!(matches!(unknown_theme.into_options(), Err(AppError::BadRequest(_))));

        let lone_width = MapQuery {
            width: Some(400),
            ..MapQuery::default()
        };
        assert!(matches!(lone_width.into_options(), Err(AppError::BadRequest(_))));

        let huge = MapQuery {
            width: Some(10_000),
            height: Some(400),
            ..MapQuery::default()
        };
        assert!(matches!(huge.into_options(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn filenames_are_header_safe() {
        assert_eq!(sanitize_filename("A-1/\"x\""), "A-1___x_");
    }
}
