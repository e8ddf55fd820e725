//! API routes for civicd.
//!
//! Every endpoint speaks JSON and every failure body is
//! `{success: false, error}` with wording a resident can act on. Raw
//! upstream errors stay in the logs.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use civic_common::safety::rate_limit::{
    client_key, CLIENT_LIMIT, SALESFORCE_KEY, SALESFORCE_LIMIT,
};
use civic_common::types::{
    AnalyticsBody, AnalyticsReport, CasesPage, ChatRequest, ChatResponse, ErrorBody,
    HealthReport, ProbeStatus,
};

use crate::cases;
use crate::chat;
use crate::server::AppState;

type AppStateArc = Arc<AppState>;
type ApiError = (StatusCode, Json<ErrorBody>);

/// 429 body for chat.
pub const SLOW_DOWN_MESSAGE: &str = "Whoa there! You're sending messages a bit too \
     quickly. Take a breath and try again in a minute! 😊";
/// 429 body for the case listing.
pub const TOO_MANY_REQUESTS_MESSAGE: &str =
    "Too many requests. Please try again in a minute.";
/// 503 body when the case-management window is exhausted.
pub const LISTING_BUSY_MESSAGE: &str = "Service temporarily busy. Please try again.";
/// 500 body when the listing cannot be served.
pub const LISTING_FAILED_MESSAGE: &str = "Unable to retrieve cases. Please try again.";
/// 500 body for anything unexpected on the chat path.
pub const INTERNAL_ERROR_MESSAGE: &str = "Oops! Something unexpected happened. Please \
     try again, or call 311 at 416-392-2219 for immediate assistance.";

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorBody::new(message)))
}

/// Client identity for per-client limits: the first `X-Forwarded-For`
/// hop when present (production sits behind a proxy), else the socket
/// peer.
fn client_id(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

pub fn chat_routes() -> Router<AppStateArc> {
    Router::new().route("/chat", post(chat_turn))
}

pub fn case_routes() -> Router<AppStateArc> {
    Router::new().route("/api/cases", get(list_cases))
}

pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/", get(service_card))
        .route("/health", get(health))
        .route("/analytics", get(analytics))
}

// ============================================================================
// Chat
// ============================================================================

async fn chat_turn(
    State(state): State<AppStateArc>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let client = client_id(&headers, peer);
    if !state.limiter.try_consume(&client_key(&client), CLIENT_LIMIT) {
        warn!("client {client} over the message limit");
        return Err(api_error(StatusCode::TOO_MANY_REQUESTS, SLOW_DOWN_MESSAGE));
    }

    let Json(req) = body.map_err(|rejection| {
        error!("chat body rejected: {rejection}");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    })?;

    let preview: String = req.message.chars().take(80).collect();
    info!(
        "chat from {client}: {}",
        if preview.is_empty() { "[photo only]" } else { &preview }
    );

    match chat::handle_chat_turn(
        &state.router,
        state.desk.as_deref(),
        &state.geocoder,
        &state.limiter,
        &req,
    )
    .await
    {
        Ok(response) => Ok(Json(ChatResponse {
            success: true,
            response,
        })),
        Err(err) => {
            warn!("chat turn rejected: {err}");
            Err(api_error(StatusCode::BAD_REQUEST, &err.to_string()))
        }
    }
}

// ============================================================================
// Case listing
// ============================================================================

async fn list_cases(
    State(state): State<AppStateArc>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<CasesPage>, ApiError> {
    let client = client_id(&headers, peer);
    if !state.limiter.try_consume(&client_key(&client), CLIENT_LIMIT) {
        return Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            TOO_MANY_REQUESTS_MESSAGE,
        ));
    }
    if !state.limiter.try_consume(SALESFORCE_KEY, SALESFORCE_LIMIT) {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            LISTING_BUSY_MESSAGE,
        ));
    }

    let Some(desk) = state.desk.as_deref() else {
        error!("case listing requested but no case desk is configured");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            LISTING_FAILED_MESSAGE,
        ));
    };

    match cases::list_recent_cases(desk).await {
        Ok(page) => Ok(Json(page)),
        Err(err) => {
            error!("case listing failed: {err}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                LISTING_FAILED_MESSAGE,
            ))
        }
    }
}

// ============================================================================
// Health and analytics
// ============================================================================

async fn service_card() -> Json<Value> {
    Json(json!({
        "name": "Civic 311 Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/chat", "/api/cases", "/health", "/analytics"],
    }))
}

async fn health(State(state): State<AppStateArc>) -> (StatusCode, Json<HealthReport>) {
    let probe = state.router.health_probe().await;
    let mut status = if probe.any_ok() { "healthy" } else { "degraded" };

    let salesforce = match state.desk.as_deref() {
        Some(desk) => match desk.ping().await {
            Ok(_) => ProbeStatus::Ok,
            Err(err) => {
                error!("salesforce health check failed: {err}");
                status = "degraded";
                ProbeStatus::Error
            }
        },
        None => {
            status = "degraded";
            ProbeStatus::NotConfigured
        }
    };

    let report = HealthReport {
        status,
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        text_backend: probe.text,
        vision_backend: probe.vision,
        ai_stats: state.router.stats(),
        salesforce,
    };

    let code = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}

async fn analytics(State(state): State<AppStateArc>) -> Json<AnalyticsReport> {
    Json(AnalyticsReport {
        success: true,
        analytics: AnalyticsBody {
            ai_stats: state.router.stats(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "203.0.113.7:4711".parse().unwrap()
    }

    /// The first forwarded hop identifies the client when a proxy is in
    /// front.
    #[test]
    fn test_client_id_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "198.51.100.4, 10.0.0.1".parse().unwrap(),
        );
        assert_eq!(client_id(&headers, peer()), "198.51.100.4");
    }

    /// Without the header the socket peer is the client.
    #[test]
    fn test_client_id_falls_back_to_peer() {
        assert_eq!(client_id(&HeaderMap::new(), peer()), "203.0.113.7");
    }

    /// A blank forwarded header never yields a blank identity.
    #[test]
    fn test_client_id_ignores_empty_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "   ".parse().unwrap());
        assert_eq!(client_id(&headers, peer()), "203.0.113.7");
    }
}
