//! Seam between the bulk-edit state machine and the remote job service.

use std::future::Future;
use std::pin::Pin;

use crate::api::{BulkUpdateClient, JobStatus};
use crate::edit::BulkMutationRequest;
use crate::error::AppError;

/// Remote operations the bulk-edit dialog depends on, allowing test fakes.
pub trait BulkJobOps: Send + Sync {
    /// Starts a bulk job for all `ids` and returns its job id.
    fn start_bulk_job<'a>(
        &'a self,
        ids: &'a [String],
        updates: &'a BulkMutationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

    /// Reads the current status of a job. Any `Err` is treated by the poller
    /// as a transient failure.
    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobStatus, AppError>> + Send + 'a>>;
}

impl BulkJobOps for BulkUpdateClient {
    fn start_bulk_job<'a>(
        &'a self,
        ids: &'a [String],
        updates: &'a BulkMutationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(BulkUpdateClient::start_bulk_job(self, ids, updates))
    }

    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<JobStatus, AppError>> + Send + 'a>> {
        Box::pin(BulkUpdateClient::get_job_status(self, job_id))
    }
}
