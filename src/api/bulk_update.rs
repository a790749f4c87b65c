//! Client for the bulk-update job endpoints of a record service.
//!
//! This module provides functionality to:
//! - Start a server-side bulk-update job for a set of record ids
//! - Query the status of a running job
//!
//! # Security
//!
//! - Mutation payloads and record ids are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, status codes and shortened job ids are logged

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::api::client::{redact_id, ApiClient};
use crate::edit::BulkMutationRequest;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Server-reported state of a bulk job.
///
/// Values the server sends that are not known here deserialize as `Unknown`
/// and are treated as still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Done,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// `done` and `error` are final; nothing else is.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

/// One per-record failure reported by the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobItemError {
    Detailed {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "message")]
        error: String,
    },
    Message(String),
    Other(serde_json::Value),
}

/// Final tally the server attaches once a job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Records updated successfully.
    #[serde(default)]
    pub ok: u64,
    /// Records that failed.
    #[serde(default, rename = "errores")]
    pub failed: u64,
}

/// Status of a bulk job as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub errors: Vec<JobItemError>,
    pub status: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl JobStatus {
    /// Client-side placeholder shown between submission and the first poll.
    pub fn placeholder(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            errors: Vec::new(),
            status: JobState::Pending,
            result: None,
        }
    }

    /// Completion percentage, `round(completed / max(total, 1) * 100)`,
    /// clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        let total = self.total.max(1) as f64;
        let pct = (self.completed as f64 / total * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Records reported as updated: the final tally if present, else `completed`.
    pub fn updated_count(&self) -> u64 {
        self.result.map(|r| r.ok).unwrap_or(self.completed)
    }

    /// Records reported as failed: the final tally if present, else the
    /// number of accumulated item errors.
    pub fn failed_count(&self) -> u64 {
        self.result
            .map(|r| r.failed)
            .unwrap_or(self.errors.len() as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for starting a bulk job.
#[derive(Debug, Serialize)]
struct StartBulkJobBody<'a> {
    ids: &'a [String],
    updates: &'a BulkMutationRequest,
}

/// Response of the start endpoint: `{ok, jobId?, error?}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStartResponse {
    #[serde(default)]
    ok: bool,
    job_id: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkUpdateClient
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the `bulk-update` job endpoints of one resource
/// (e.g. `movimientos`).
#[derive(Debug, Clone)]
pub struct BulkUpdateClient {
    api: ApiClient,
    resource: String,
}

impl BulkUpdateClient {
    pub fn new(api: ApiClient, resource: impl Into<String>) -> Self {
        Self {
            api,
            resource: resource.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Starts a bulk-update job for every id in `ids`.
    ///
    /// # Returns
    ///
    /// The job id on success. Does not wait for the job to finish.
    ///
    /// # Errors
    ///
    /// - `AppError::SubmissionRejected` - server answered `ok: false`
    /// - `AppError::RateLimited` - HTTP 429
    /// - `AppError::NotAuthenticated` - HTTP 401/403
    /// - `AppError::ServerError` - other non-success responses
    /// - `AppError::ConnectionFailed` - network error
    pub async fn start_bulk_job(
        &self,
        ids: &[String],
        updates: &BulkMutationRequest,
    ) -> Result<String, AppError> {
        let url = self.build_jobs_url()?;
        let body = serde_json::to_vec(&StartBulkJobBody { ids, updates })
            .map_err(|e| AppError::Internal(format!("Failed to serialize bulk request: {}", e)))?;

        info!(
            "[BULK-API] POST {} ({} records, {} fields)",
            url.path(),
            ids.len(),
            updates.len()
        );

        let response = self.api.execute(Method::POST, url, Some(body)).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        let wire: WireStartResponse = response.json().await.map_err(|e| {
            AppError::ServerError(format!("Failed to parse bulk start response: {}", e))
        })?;

        if !wire.ok {
            let message = wire
                .error
                .or(wire.message)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(AppError::SubmissionRejected(message));
        }

        let job_id = wire
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::ServerError("Bulk start response has no jobId".to_string()))?;

        info!("[BULK-API] Started job {}", redact_id(&job_id));
        Ok(job_id)
    }

    /// Gets the current status of a bulk job.
    ///
    /// A job the server reports as `error` is returned as a status, not as an
    /// `Err`; only transport and protocol problems are errors.
    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatus, AppError> {
        let url = self.build_job_url(job_id)?;

        let response = self.api.execute(Method::GET, url, None).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        response.json::<JobStatus>().await.map_err(|e| {
            AppError::ServerError(format!(
                "Failed to parse status of job {}: {}",
                redact_id(job_id),
                e
            ))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// `{base}/api/{resource}/bulk-update`
    fn build_jobs_url(&self) -> Result<Url, AppError> {
        self.api.build_url(self.jobs_path())
    }

    /// `{base}/api/{resource}/bulk-update/{job_id}`
    fn build_job_url(&self, job_id: &str) -> Result<Url, AppError> {
        let mut segments = self.jobs_path();
        segments.push(job_id);
        self.api.build_url(segments)
    }

    /// Path segments below the base URL. A nested resource such as
    /// `cuentas/pendientes` contributes one segment per part.
    fn jobs_path(&self) -> Vec<&str> {
        let mut segments = vec!["api"];
        segments.extend(self.resource.split('/').filter(|part| !part.is_empty()));
        segments.push("bulk-update");
        segments
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Maps a non-success response to an `AppError`.
async fn parse_error_response(response: reqwest::Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return AppError::NotAuthenticated;
    }

    let body = response.text().await.unwrap_or_default();

    if let Ok(wire) = serde_json::from_str::<WireStartResponse>(&body) {
        if let Some(message) = wire.error.or(wire.message) {
            if status.is_client_error() {
                return AppError::SubmissionRejected(message);
            }
            return AppError::ServerError(message);
        }
    }

    AppError::ServerError(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}
