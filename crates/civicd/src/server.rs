//! HTTP server assembly for civicd.

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use civic_common::config::Config;
use civic_common::safety::rate_limit::RateLimiter;

use crate::ai::AiRouter;
use crate::location::Geocoder;
use crate::routes;
use crate::salesforce::{CaseDesk, SalesforceDesk};

/// How often stale limiter windows are swept out of the map.
const SWEEP_INTERVAL: Duration = Duration::from_secs(600);
/// Windows idle longer than this are dropped by the sweep.
const SWEEP_MAX_AGE: Duration = Duration::from_secs(120);

/// Application state shared across handlers.
pub struct AppState {
    pub router: AiRouter,
    pub desk: Option<Arc<dyn CaseDesk>>,
    pub geocoder: Geocoder,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Assemble live state from configuration. Missing backends leave
    /// gaps the handlers degrade around rather than boot failures.
    pub fn from_config(config: &Config) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::standard());
        let router = AiRouter::from_config(config, Arc::clone(&limiter))?;

        let desk: Option<Arc<dyn CaseDesk>> = match &config.salesforce {
            Some(salesforce) => {
                info!("[BOOT] salesforce desk ready ({})", salesforce.instance_url);
                Some(Arc::new(SalesforceDesk::new(salesforce)?))
            }
            None => {
                tracing::warn!("[BOOT] salesforce desk not configured");
                None
            }
        };

        let geocoder = Geocoder::new(&config.geocoder_url)?;

        Ok(Self {
            router,
            desk,
            geocoder,
            limiter,
        })
    }
}

/// Browser-hardening headers on every response.
async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("X-XSS-Protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    response
}

/// Build the full router with middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .merge(routes::chat_routes())
        .merge(routes::case_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(middleware::from_fn(security_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve until shutdown, sweeping the limiter map alongside.
pub async fn run(config: Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);

    let sweeper = Arc::clone(&state.limiter);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            sweeper.cleanup(SWEEP_MAX_AGE);
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("[READY] listening on http://{addr}");

    let service = app(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
