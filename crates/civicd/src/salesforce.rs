//! Salesforce case desk.
//!
//! Cases are filed through a custom Apex action (`Create311Case`) and
//! photos ride along as `ContentVersion` records published straight to
//! the case. The desk is behind a trait so the orchestration layers can
//! run against [`FakeCaseDesk`] in tests.

use async_trait::async_trait;
use civic_common::config::SalesforceConfig;
use civic_common::types::SubmitOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::ai::clip;

const API_VERSION: &str = "v59.0";
const TIMEOUT_SECS: u64 = 10;
const ERROR_DETAIL_LEN: usize = 200;

const RECENT_CASES_SOQL: &str = "SELECT Id, CaseNumber, Subject, Description, \
     Complaint_Type__c, Status, CreatedDate FROM Case \
     WHERE CreatedDate = LAST_N_DAYS:30 ORDER BY CreatedDate DESC LIMIT 500";
const PING_SOQL: &str = "SELECT Id FROM Case LIMIT 1";

/// Desk failures. All of them surface to users as canned messages; the
/// detail only ever reaches the logs.
#[derive(Debug, Clone, Error)]
pub enum CaseDeskError {
    #[error("case desk request failed: {0}")]
    Transport(String),

    #[error("case desk returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("case desk returned an unexpected body: {0}")]
    InvalidResponse(String),
}

impl CaseDeskError {
    fn from_request(err: reqwest::Error) -> Self {
        CaseDeskError::Transport(err.to_string())
    }
}

/// Input record for the `Create311Case` action. Serialized as
/// `inputs[0]`; unset fields travel as JSON null and the action applies
/// its own defaults.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseCreate {
    pub subject: String,
    pub description: String,
    pub complaint_type: Option<String>,
    pub citizen_email: Option<String>,
    pub citizen_phone: Option<String>,
    pub ward: Option<String>,
    pub street_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One Case row as the SOQL endpoint returns it. Salesforce sends
/// explicit nulls for blank fields, hence the blanket `Option`s.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCase {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "CaseNumber")]
    pub case_number: Option<String>,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Complaint_Type__c")]
    pub complaint_type: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "CreatedDate")]
    pub created_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(rename = "totalSize", default)]
    total_size: u64,
    #[serde(default)]
    records: Vec<RawCase>,
}

/// The case-management backend as the rest of the daemon sees it.
#[async_trait]
pub trait CaseDesk: Send + Sync {
    /// File a case. A `Err` is transport-level trouble; business-level
    /// rejection comes back as a failed [`SubmitOutcome`].
    async fn create_case(&self, case: &CaseCreate) -> Result<SubmitOutcome, CaseDeskError>;

    /// Attach a base64 photo to an existing case.
    async fn attach_photo(&self, case_id: &str, photo_base64: &str)
        -> Result<(), CaseDeskError>;

    /// Cases created in the last 30 days, newest first.
    async fn recent_cases(&self) -> Result<Vec<RawCase>, CaseDeskError>;

    /// Cheap liveness query. Returns the matched-record count so callers
    /// that care (the keep-alive sidecar) can log it.
    async fn ping(&self) -> Result<u64, CaseDeskError>;
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Map an Apex invocation response onto a [`SubmitOutcome`]. The action
/// returns a one-element array whose `outputValues` carry the verdict;
/// anything else is an unexpected response.
fn parse_create_response(body: &Value) -> SubmitOutcome {
    let Some(first) = body.as_array().and_then(|rows| rows.first()) else {
        return SubmitOutcome {
            success: false,
            case_number: None,
            message: "Unexpected response from Salesforce".to_string(),
            case_id: None,
        };
    };

    let outputs = first.get("outputValues").cloned().unwrap_or_else(|| json!({}));
    SubmitOutcome {
        success: outputs
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        case_number: outputs.get("caseNumber").and_then(text_of),
        message: outputs
            .get("message")
            .and_then(text_of)
            .unwrap_or_default(),
        case_id: outputs.get("caseId").and_then(text_of),
    }
}

/// REST client for a Salesforce org.
pub struct SalesforceDesk {
    client: reqwest::Client,
    instance_url: String,
    access_token: String,
}

impl SalesforceDesk {
    pub fn new(config: &SalesforceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            instance_url: config.instance_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/services/data/{API_VERSION}/{path}", self.instance_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CaseDeskError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(CaseDeskError::Http {
            status: status.as_u16(),
            detail: clip(&detail, ERROR_DETAIL_LEN),
        })
    }

    async fn run_query(&self, soql: &str) -> Result<QueryResponse, CaseDeskError> {
        let response = self
            .client
            .get(self.api_url("query"))
            .bearer_auth(&self.access_token)
            .query(&[("q", soql)])
            .send()
            .await
            .map_err(CaseDeskError::from_request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| CaseDeskError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl CaseDesk for SalesforceDesk {
    async fn create_case(&self, case: &CaseCreate) -> Result<SubmitOutcome, CaseDeskError> {
        let body = json!({ "inputs": [case] });
        let response = self
            .client
            .post(self.api_url("actions/custom/apex/Create311Case"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(CaseDeskError::from_request)?;

        let body: Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|err| CaseDeskError::InvalidResponse(err.to_string()))?;

        Ok(parse_create_response(&body))
    }

    async fn attach_photo(
        &self,
        case_id: &str,
        photo_base64: &str,
    ) -> Result<(), CaseDeskError> {
        let body = json!({
            "Title": "Service Request Photo",
            "PathOnClient": "photo.jpg",
            "VersionData": photo_base64,
            "FirstPublishLocationId": case_id,
        });

        let response = self
            .client
            .post(self.api_url("sobjects/ContentVersion"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(CaseDeskError::from_request)?;

        Self::check(response).await?;
        info!("photo attached to case {case_id}");
        Ok(())
    }

    async fn recent_cases(&self) -> Result<Vec<RawCase>, CaseDeskError> {
        let response = self.run_query(RECENT_CASES_SOQL).await?;
        Ok(response.records)
    }

    async fn ping(&self) -> Result<u64, CaseDeskError> {
        let response = self.run_query(PING_SOQL).await?;
        Ok(response.total_size)
    }
}

/// Scripted desk for orchestration tests: hands out queued create
/// outcomes in order (then a canned success forever), serves a fixed
/// case list, and records every call.
pub struct FakeCaseDesk {
    create_outcomes: Mutex<VecDeque<Result<SubmitOutcome, CaseDeskError>>>,
    listing: Mutex<Result<Vec<RawCase>, CaseDeskError>>,
    attach_result: Mutex<Result<(), CaseDeskError>>,
    ping_result: Mutex<Result<u64, CaseDeskError>>,
    create_calls: Mutex<usize>,
    attach_calls: Mutex<usize>,
    list_calls: Mutex<usize>,
    ping_calls: Mutex<usize>,
    last_create: Mutex<Option<CaseCreate>>,
    last_attachment: Mutex<Option<(String, String)>>,
}

impl Default for FakeCaseDesk {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCaseDesk {
    pub fn new() -> Self {
        Self {
            create_outcomes: Mutex::new(VecDeque::new()),
            listing: Mutex::new(Ok(Vec::new())),
            attach_result: Mutex::new(Ok(())),
            ping_result: Mutex::new(Ok(1)),
            create_calls: Mutex::new(0),
            attach_calls: Mutex::new(0),
            list_calls: Mutex::new(0),
            ping_calls: Mutex::new(0),
            last_create: Mutex::new(None),
            last_attachment: Mutex::new(None),
        }
    }

    /// The create outcome handed out when the queue is empty.
    pub fn canned_success() -> SubmitOutcome {
        SubmitOutcome {
            success: true,
            case_number: Some("00001059".to_string()),
            message: "Case created successfully".to_string(),
            case_id: Some("500xx0000000001".to_string()),
        }
    }

    /// Queue a create result to be returned before the canned success.
    pub fn queue_create(self, result: Result<SubmitOutcome, CaseDeskError>) -> Self {
        self.create_outcomes
            .lock()
            .expect("fake create lock")
            .push_back(result);
        self
    }

    pub fn with_cases(self, cases: Vec<RawCase>) -> Self {
        *self.listing.lock().expect("fake listing lock") = Ok(cases);
        self
    }

    pub fn with_listing_error(self, error: CaseDeskError) -> Self {
        *self.listing.lock().expect("fake listing lock") = Err(error);
        self
    }

    pub fn with_attach_error(self, error: CaseDeskError) -> Self {
        *self.attach_result.lock().expect("fake attach lock") = Err(error);
        self
    }

    pub fn with_ping_error(self, error: CaseDeskError) -> Self {
        *self.ping_result.lock().expect("fake ping lock") = Err(error);
        self
    }

    pub fn create_calls(&self) -> usize {
        *self.create_calls.lock().expect("fake create lock")
    }

    pub fn attach_calls(&self) -> usize {
        *self.attach_calls.lock().expect("fake attach lock")
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().expect("fake listing lock")
    }

    pub fn ping_calls(&self) -> usize {
        *self.ping_calls.lock().expect("fake ping lock")
    }

    /// The most recent record handed to `create_case`.
    pub fn last_create(&self) -> Option<CaseCreate> {
        self.last_create.lock().expect("fake create lock").clone()
    }

    /// The most recent `(case_id, photo_base64)` pair handed to
    /// `attach_photo`.
    pub fn last_attachment(&self) -> Option<(String, String)> {
        self.last_attachment
            .lock()
            .expect("fake attach lock")
            .clone()
    }
}

#[async_trait]
impl CaseDesk for FakeCaseDesk {
    async fn create_case(&self, case: &CaseCreate) -> Result<SubmitOutcome, CaseDeskError> {
        *self.create_calls.lock().expect("fake create lock") += 1;
        *self.last_create.lock().expect("fake create lock") = Some(case.clone());

        let queued = self
            .create_outcomes
            .lock()
            .expect("fake create lock")
            .pop_front();
        queued.unwrap_or_else(|| Ok(Self::canned_success()))
    }

    async fn attach_photo(
        &self,
        case_id: &str,
        photo_base64: &str,
    ) -> Result<(), CaseDeskError> {
        *self.attach_calls.lock().expect("fake attach lock") += 1;
        *self.last_attachment.lock().expect("fake attach lock") =
            Some((case_id.to_string(), photo_base64.to_string()));
        self.attach_result.lock().expect("fake attach lock").clone()
    }

    async fn recent_cases(&self) -> Result<Vec<RawCase>, CaseDeskError> {
        *self.list_calls.lock().expect("fake listing lock") += 1;
        self.listing.lock().expect("fake listing lock").clone()
    }

    async fn ping(&self) -> Result<u64, CaseDeskError> {
        *self.ping_calls.lock().expect("fake ping lock") += 1;
        self.ping_result.lock().expect("fake ping lock").clone()
    }
}
