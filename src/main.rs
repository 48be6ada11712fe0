use axum::Router;
use dronetrack_rs::{config::Config, routes, state::AppState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const EVICTION_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dronetrack_rs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let state = AppState::new(config.clone());

    // Idle session reaper
    let eviction_state = state.clone();
    let session_ttl = config.session_ttl;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(EVICTION_INTERVAL_SECS)).await;
            eviction_state.evict_idle(session_ttl);
        }
    });

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::geocode::router())
        .merge(routes::tracking::router())
        .merge(routes::render::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("DroneTrack-RS listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("Start tracking: POST http://{}/api/tracking", addr);
    tracing::info!(
        "Driver tick {} ms, geocoding via {}",
        config.tick_interval.as_millis(),
        config.geocode_base_url
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
