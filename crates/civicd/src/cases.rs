//! Case submission and listing pipelines.
//!
//! Submission is deliberately forgiving: the quota gate fails fast, the
//! location steps are best effort, and a photo that will not attach
//! never sinks a case that already exists. Every failure path returns a
//! uniform outcome with a message fit to show a resident.

use std::collections::HashMap;

use civic_common::complaint;
use civic_common::safety::rate_limit::{RateLimiter, SALESFORCE_KEY, SALESFORCE_LIMIT};
use civic_common::sanitize::{sanitize_text, MAX_DESCRIPTION_LEN, MAX_MESSAGE_LEN};
use civic_common::types::{CaseInfo, CasesPage, CaseSummary, SubmitOutcome};
use tracing::{error, info, warn};

use crate::location::{extract_street_address, Geocoder};
use crate::salesforce::{CaseCreate, CaseDesk, CaseDeskError, RawCase};

/// Shown when the case-management window is exhausted.
pub const BUSY_MESSAGE: &str = "Service temporarily busy. Please try again in a moment.";
/// Shown when the desk is unreachable or unconfigured.
pub const CREATE_FAILED_MESSAGE: &str = "Unable to create case. Please try again.";

const DEFAULT_SUBJECT: &str = "New 311 Request";

fn failed(message: &str) -> SubmitOutcome {
    SubmitOutcome {
        success: false,
        case_number: None,
        message: message.to_string(),
        case_id: None,
    }
}

/// File a case with the desk, geocoding the description and attaching
/// the photo along the way.
pub async fn submit_case(
    desk: Option<&dyn CaseDesk>,
    geocoder: &Geocoder,
    limiter: &RateLimiter,
    info: &CaseInfo,
    photo_base64: Option<&str>,
) -> SubmitOutcome {
    if !limiter.try_consume(SALESFORCE_KEY, SALESFORCE_LIMIT) {
        warn!("salesforce window exhausted, refusing submission");
        return failed(BUSY_MESSAGE);
    }

    let Some(desk) = desk else {
        error!("case creation requested but no case desk is configured");
        return failed(CREATE_FAILED_MESSAGE);
    };

    let description = info.description.clone().unwrap_or_default();

    let street_address = extract_street_address(&description);
    let mut latitude = None;
    let mut longitude = None;
    if let Some(address) = &street_address {
        if let Some(point) = geocoder.geocode(address).await {
            latitude = Some(point.latitude);
            longitude = Some(point.longitude);
        }
    }

    let case = CaseCreate {
        subject: info
            .subject
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
        description,
        complaint_type: info.complaint_type.clone(),
        citizen_email: info.citizen_email.clone(),
        citizen_phone: info.citizen_phone.clone(),
        ward: info.ward.clone(),
        street_address,
        latitude,
        longitude,
    };

    info!("filing case: subject={:?} type={:?}", case.subject, case.complaint_type);

    let outcome = match desk.create_case(&case).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("case creation failed: {err}");
            return failed(CREATE_FAILED_MESSAGE);
        }
    };

    // A photo is attached whenever the action handed back a case id,
    // even on a business-level rejection: the record exists either way.
    if let (Some(case_id), Some(photo)) = (outcome.case_id.as_deref(), photo_base64) {
        if let Err(err) = desk.attach_photo(case_id, photo).await {
            warn!("photo attachment failed for case {case_id}: {err}");
        }
    }

    SubmitOutcome {
        success: outcome.success,
        case_number: outcome
            .case_number
            .map(|number| sanitize_text(&number, MAX_MESSAGE_LEN)),
        message: sanitize_text(&outcome.message, MAX_MESSAGE_LEN),
        case_id: outcome.case_id,
    }
}

/// Map raw desk rows onto the dashboard listing: sanitized fields, a
/// display color per type, and per-type counts.
pub fn summarize_cases(rows: Vec<RawCase>) -> CasesPage {
    let mut cases = Vec::with_capacity(rows.len());
    let mut type_counts: HashMap<String, u32> = HashMap::new();

    for row in rows {
        let complaint_type =
            sanitize_text(&row.complaint_type.unwrap_or_default(), MAX_MESSAGE_LEN);
        if !complaint_type.is_empty() {
            *type_counts.entry(complaint_type.clone()).or_insert(0) += 1;
        }

        let color = complaint::color_for(&complaint_type).to_string();
        cases.push(CaseSummary {
            id: sanitize_text(&row.id.unwrap_or_default(), MAX_MESSAGE_LEN),
            case_number: sanitize_text(&row.case_number.unwrap_or_default(), MAX_MESSAGE_LEN),
            subject: sanitize_text(&row.subject.unwrap_or_default(), MAX_MESSAGE_LEN),
            description: sanitize_text(&row.description.unwrap_or_default(), MAX_DESCRIPTION_LEN),
            complaint_type,
            status: sanitize_text(&row.status.unwrap_or_default(), MAX_MESSAGE_LEN),
            created_date: row.created_date.unwrap_or_default(),
            // Coordinates are write-only today: they go out on new
            // cases but are not read back on this path. The dashboard
            // colors markers by type instead.
            latitude: 0.0,
            longitude: 0.0,
            street_address: String::new(),
            color,
        });
    }

    CasesPage {
        success: true,
        total: cases.len(),
        cases,
        type_counts,
    }
}

/// Fetch and summarize the last 30 days of cases.
pub async fn list_recent_cases(desk: &dyn CaseDesk) -> Result<CasesPage, CaseDeskError> {
    let rows = desk.recent_cases().await?;
    info!("retrieved {} cases for the dashboard", rows.len());
    Ok(summarize_cases(rows))
}
