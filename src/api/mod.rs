//! HTTP access to the remote record services.
//!
//! - **Secure credential handling** via `secrecy::SecretString`
//! - **Safe logging** that never leaks tokens, payloads or sensitive URL parameters
//! - **Bulk-update jobs**: start a job and read its status

pub mod bulk_update;
pub mod client;

pub use bulk_update::{BulkUpdateClient, JobItemError, JobResult, JobState, JobStatus};
pub use client::{sanitize_url_for_logs, ApiClient, LoggingMode};
