//! Wire types shared across the civic311 services.
//!
//! Field names follow the JSON the browser client and the dashboard
//! already speak, so every struct that crosses the HTTP boundary is
//! camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Image media types accepted on photo uploads.
pub const ALLOWED_IMAGE_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Media type assumed when the client omits or mislabels one.
pub const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Speaker of a conversation turn. Unknown strings fold to `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Assistant,
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

impl Role {
    /// Transcript label, as the extraction prompt expects it.
    pub fn transcript_label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One turn of client-held conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoUpload>,
}

/// A photo as the client sends it: either a bare base64 string or the
/// richer object the compressing uploader produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhotoUpload {
    Inline(String),
    Detailed {
        #[serde(default)]
        compressed_data: Option<String>,
        #[serde(default)]
        data: Option<String>,
        #[serde(default)]
        media_type: Option<String>,
        #[serde(default)]
        was_compressed: Option<bool>,
    },
}

/// Photo payload after shape resolution: base64 body plus a media type
/// from the allow-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPhoto {
    pub base64: String,
    pub media_type: String,
}

impl PhotoUpload {
    /// Pick the base64 body and media type out of whichever shape the
    /// client sent. Compressed data wins over the original; media types
    /// outside the allow-set fall back to JPEG.
    pub fn resolve(&self) -> Option<ResolvedPhoto> {
        let (base64, media_type) = match self {
            PhotoUpload::Inline(s) => (s.clone(), None),
            PhotoUpload::Detailed {
                compressed_data,
                data,
                media_type,
                ..
            } => {
                let body = compressed_data
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| data.clone().filter(|s| !s.is_empty()))?;
                (body, media_type.clone())
            }
        };
        if base64.trim().is_empty() {
            return None;
        }
        let media_type = match media_type {
            Some(mt) if ALLOWED_IMAGE_TYPES.contains(&mt.as_str()) => mt,
            _ => DEFAULT_IMAGE_TYPE.to_string(),
        };
        Some(ResolvedPhoto { base64, media_type })
    }
}

/// Inbound body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation: Vec<ChatTurn>,
    #[serde(default)]
    pub photo: Option<PhotoUpload>,
}

/// Successful reply body of `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
}

/// Error body shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

/// Structured case record extracted from a conversation. Every field is
/// optional; the extraction model returns `null` for anything it never
/// learned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaseInfo {
    pub complaint_type: Option<String>,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub citizen_email: Option<String>,
    pub citizen_phone: Option<String>,
    pub ward: Option<String>,
}

/// One row of the recent-case listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseSummary {
    pub id: String,
    pub case_number: String,
    pub subject: String,
    pub description: String,
    pub complaint_type: String,
    pub status: String,
    pub created_date: String,
    pub latitude: f64,
    pub longitude: f64,
    pub street_address: String,
    pub color: String,
}

/// Body of `GET /api/cases`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CasesPage {
    pub success: bool,
    pub cases: Vec<CaseSummary>,
    pub total: usize,
    pub type_counts: HashMap<String, u32>,
}

/// Result of filing a case with the desk.
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub success: bool,
    pub case_number: Option<String>,
    pub message: String,
    pub case_id: Option<String>,
}

/// A geocoded street position. Latitude and longitude always travel
/// together; a partial fix is reported as no fix at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
}

/// Point-in-time view of the router's call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallStatsSnapshot {
    pub text_calls: u64,
    pub vision_calls: u64,
    pub text_errors: u64,
    pub vision_errors: u64,
    pub photo_routes: u64,
    pub text_routes: u64,
}

/// Probe result for one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Error,
    NotConfigured,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub version: String,
    pub text_backend: ProbeStatus,
    pub vision_backend: ProbeStatus,
    pub ai_stats: CallStatsSnapshot,
    pub salesforce: ProbeStatus,
}

/// Body of `GET /analytics`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub success: bool,
    pub analytics: AnalyticsBody,
}

/// Inner analytics payload.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsBody {
    pub ai_stats: CallStatsSnapshot,
    pub timestamp: String,
}
