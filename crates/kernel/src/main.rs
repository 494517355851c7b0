//! Turnstile Admission Control Kernel
//!
//! HTTP gateway that enforces tenant-aware rate limits in front of a
//! multi-tenant API.

mod cache;
mod clock;
mod config;
mod limit;
mod metrics;
mod middleware;
mod routes;
mod state;
mod tenant;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::state::AppState;
use crate::tenant::tier::StaticSubscriptionLookup;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    info!("Starting Turnstile admission control kernel");

    // Load configuration from environment
    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        port = config.port,
        algorithm = %config.admission.algorithm,
        permit_limit = config.admission.permit_limit,
        "Configuration loaded"
    );

    if !config.premium_tenants.is_empty() {
        info!(
            count = config.premium_tenants.len(),
            "Static premium tenant set configured"
        );
    }

    // Initialize application state
    let lookup = Arc::new(StaticSubscriptionLookup::new(
        config.premium_tenants.iter().cloned(),
    ));
    let state = AppState::new(config.clone(), lookup, Arc::new(SystemClock));

    // Build CORS layer from config
    let cors = build_cors_layer(&config);

    // Build the router
    // Middleware layers (last added = first executed in request flow):
    // TraceLayer → CORS → admission control → routes
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::metrics::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::enforce_admission,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind to address")?;

    info!(%addr, "Server listening");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if config.cors_allowed_origins.len() == 1 && config.cors_allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any)
            .allow_credentials(true)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
