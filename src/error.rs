use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "api_token",
    "access_token",
    "authorization:",
    "x-tenant-id:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected (or the message is blank), returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if msg.trim().is_empty() || contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Validation ────────────────────────────────────────────────────────────
    #[error("No complete field edits to submit")]
    EmptyRequest,

    #[error("No target records selected")]
    NoTargets,

    // ── Bulk Jobs ─────────────────────────────────────────────────────────────
    #[error("Bulk edit rejected: {0}")]
    SubmissionRejected(String),

    #[error("Bulk job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Bulk job {job_id} did not finish within {waited_secs}s")]
    PollTimeout { job_id: String, waited_secs: u64 },

    #[error("A polling loop is already active for this dialog")]
    AlreadyPolling,

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not authenticated")]
    NotAuthenticated,

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks tokens or tenant headers.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Validation ────────────────────────────────────────────────────
            AppError::EmptyRequest => ErrorPresentation {
                title: "Nothing to Apply".into(),
                message: "Select at least one field and give it a value.".into(),
                action: Some("Choose a field to edit".into()),
            },

            AppError::NoTargets => ErrorPresentation {
                title: "No Records Selected".into(),
                message: "Select the records you want to edit first.".into(),
                action: Some("Select records".into()),
            },

            // ── Bulk Jobs ─────────────────────────────────────────────────────
            AppError::SubmissionRejected(msg) => ErrorPresentation {
                title: "Bulk Edit Not Started".into(),
                message: sanitize_message(msg, "The server rejected the bulk edit."),
                action: Some("Close and try again".into()),
            },

            AppError::JobFailed { job_id: _, message } => ErrorPresentation {
                title: "Bulk Edit Failed".into(),
                message: sanitize_message(message, JOB_FAILED_MESSAGE),
                action: Some("Close and review the records".into()),
            },

            AppError::PollTimeout { waited_secs, .. } => ErrorPresentation {
                title: "Still Processing".into(),
                message: format!(
                    "The bulk edit did not finish within {} seconds. It may still complete on the server.",
                    waited_secs
                ),
                action: Some("Close and refresh the list later".into()),
            },

            AppError::AlreadyPolling => ErrorPresentation {
                title: "Bulk Edit In Progress".into(),
                message: "A bulk edit is already running in this dialog.".into(),
                action: Some("Wait for it to finish".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::ServerError(msg) => ErrorPresentation {
                title: "Server Error".into(),
                message: sanitize_message(msg, "The server returned an error."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("The server is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "Your session is not valid for this operation.".into(),
                action: Some("Log in again".into()),
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the server. Please check your connection.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Configuration ─────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The bulk edit service is misconfigured."),
                action: Some("Fix the configuration and restart".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

/// Fixed user-facing message for a job the server reported as failed.
pub const JOB_FAILED_MESSAGE: &str = "The server could not complete the bulk edit.";

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
