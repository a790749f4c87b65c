//! Bulk-edit dialog: submission, status polling and the four-phase
//! controller observers bind to.

pub mod controller;
pub mod ops;
pub mod poller;

pub use controller::{
    ApplyOutcome, BulkEditController, CompletionCallback, DialogFailure, DialogPhase, DialogView,
    DismissOutcome, JobProgress, PhaseKind, PollingStage,
};
pub use ops::BulkJobOps;
pub use poller::{
    PollEvent, PollHandle, PollPolicy, PollState, DEFAULT_POLL_INTERVAL, EVENT_BUFFER,
};
