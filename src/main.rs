use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod constants;
mod crypto;
mod db;
mod error;
mod events;
mod models;
mod services;
mod utils;

use config::Config;
use constants::API_VERSION;
use db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rattrack_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!("Starting RatTrack Backend Server");
    tracing::info!("Environment: {}", config.environment);
    tracing::info!("API Version: {}", API_VERSION);

    // Initialize database
    let db = Database::new(&config).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db.run_migrations().await?;

    let processor = services::HookProcessor::new(db.clone(), config.clone());

    let app_state = api::AppState {
        db,
        config: config.clone(),
        processor,
    };

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: api::AppState) -> Router {
    // CORS configuration
    let cors = cors_from_config(&state.config);

    Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Event mirror ingress (one route per subscribed contract event)
        .route("/api/v1/hooks/mint", post(api::hooks::mint))
        .route("/api/v1/hooks/transfer", post(api::hooks::transfer))
        .route(
            "/api/v1/hooks/race-created",
            post(api::hooks::race_created),
        )
        .route(
            "/api/v1/hooks/racer-entered",
            post(api::hooks::racer_entered),
        )
        .route(
            "/api/v1/hooks/race-cancelled",
            post(api::hooks::race_cancelled),
        )
        .route(
            "/api/v1/hooks/race-finished",
            post(api::hooks::race_finished),
        )
        // Rats
        .route("/api/v1/rats", get(api::rats::list_rats))
        .route("/api/v1/rats/{token_id}", get(api::rats::get_rat))
        .route(
            "/api/v1/rats/{token_id}/history",
            get(api::rats::get_rat_history),
        )
        // Races
        .route("/api/v1/races", get(api::races::list_races))
        .route("/api/v1/races/{race_id}", get(api::races::get_race))
        // Wallets & leaderboard
        .route("/api/v1/wallets/{address}", get(api::wallets::get_wallet))
        .route("/api/v1/leaderboard", get(api::wallets::get_leaderboard))
        .layer(cors)
        .with_state(state)
}

fn cors_from_config(config: &Config) -> CorsLayer {
    let raw = config.cors_allowed_origins.trim();
    if raw.is_empty() || raw == "*" {
        return CorsLayer::very_permissive();
    }

    let allowed: Vec<HeaderValue> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if allowed.is_empty() {
        tracing::warn!("No valid CORS origins parsed; falling back to permissive");
        return CorsLayer::very_permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
