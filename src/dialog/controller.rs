//! Bulk-edit dialog controller.
//!
//! Drives one dialog through `form → polling → done | error` and back to
//! `form` on dismiss. The controller owns the field selection, submits the
//! job through [`BulkJobOps`], owns the [`PollHandle`] for the job, and
//! publishes a [`DialogView`] snapshot after every transition.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::api::client::redact_id;
use crate::api::{JobState, JobStatus};
use crate::dialog::ops::BulkJobOps;
use crate::dialog::poller::{PollEvent, PollHandle, PollPolicy, EVENT_BUFFER};
use crate::edit::{build_request, FieldCatalog, FieldSelection, OperationKey};
use crate::error::{AppError, ErrorPresentation, JOB_FAILED_MESSAGE};

/// Callback run when a finished dialog is dismissed, e.g. to refresh the
/// record list and clear the external multi-select.
pub type CompletionCallback = Box<dyn FnMut(&JobStatus) + Send>;

// ─────────────────────────────────────────────────────────────────────────────
// Phases
// ─────────────────────────────────────────────────────────────────────────────

/// Job status as far as the dialog knows it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobProgress {
    /// Synthesized locally on submission; the server has not answered yet.
    Placeholder(JobStatus),
    /// Last status returned by the server.
    Confirmed(JobStatus),
}

impl JobProgress {
    pub fn status(&self) -> &JobStatus {
        match self {
            JobProgress::Placeholder(status) | JobProgress::Confirmed(status) => status,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, JobProgress::Confirmed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollingStage {
    /// Start-job call in flight.
    Submitting,
    /// Job accepted; its status is being polled.
    Tracking { job_id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogFailure {
    /// The server refused to start the job.
    Rejected { presentation: ErrorPresentation },
    /// The job ran and ended in `error`.
    JobFailed { job_id: String, status: JobStatus },
    /// The server accepted the job but it could not be polled.
    Untracked {
        job_id: String,
        presentation: ErrorPresentation,
    },
    /// Polling gave up before the job finished.
    TimedOut {
        job_id: String,
        waited: Duration,
        last: JobProgress,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogPhase {
    Form,
    Polling {
        stage: PollingStage,
        progress: JobProgress,
    },
    Done {
        job_id: String,
        status: JobStatus,
    },
    Error(DialogFailure),
}

impl DialogPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            DialogPhase::Form => PhaseKind::Form,
            DialogPhase::Polling { .. } => PhaseKind::Polling,
            DialogPhase::Done { .. } => PhaseKind::Done,
            DialogPhase::Error(_) => PhaseKind::Error,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            DialogPhase::Polling {
                stage: PollingStage::Tracking { job_id },
                ..
            }
            | DialogPhase::Done { job_id, .. }
            | DialogPhase::Error(DialogFailure::JobFailed { job_id, .. })
            | DialogPhase::Error(DialogFailure::Untracked { job_id, .. })
            | DialogPhase::Error(DialogFailure::TimedOut { job_id, .. }) => Some(job_id),
            _ => None,
        }
    }

    /// Latest known status and whether the server confirmed it.
    fn status(&self) -> Option<(&JobStatus, bool)> {
        match self {
            DialogPhase::Polling { progress, .. }
            | DialogPhase::Error(DialogFailure::TimedOut { last: progress, .. }) => {
                Some((progress.status(), progress.is_confirmed()))
            }
            DialogPhase::Done { status, .. }
            | DialogPhase::Error(DialogFailure::JobFailed { status, .. }) => Some((status, true)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Form,
    Polling,
    Done,
    Error,
}

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogView {
    pub phase: PhaseKind,
    pub job_id: Option<String>,
    pub total: u64,
    pub completed: u64,
    pub percent: u8,
    /// False while only the local placeholder is known.
    pub confirmed: bool,
    pub item_errors: u64,
    pub message: Option<String>,
    pub can_apply: bool,
    pub can_dismiss: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Not in `form`, nothing complete to submit, or no target records.
    Ignored,
    /// The server accepted the job.
    Started { job_id: String },
    /// Submission failed; the dialog is in `error`.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissOutcome {
    Dismissed,
    /// A job is running; the dialog stays open.
    Rejected,
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

pub struct BulkEditController<C: BulkJobOps + 'static> {
    client: Arc<C>,
    selection: FieldSelection,
    phase: DialogPhase,
    policy: PollPolicy,
    poller: Option<PollHandle>,
    events: Option<mpsc::Receiver<PollEvent>>,
    view: watch::Sender<DialogView>,
    on_complete: Option<CompletionCallback>,
}

impl<C: BulkJobOps + 'static> BulkEditController<C> {
    pub fn new(client: Arc<C>, catalog: Arc<FieldCatalog>, policy: PollPolicy) -> Self {
        let selection = FieldSelection::new(catalog);
        let phase = DialogPhase::Form;
        let initial = build_view(&phase, &selection);

        Self {
            client,
            selection,
            phase,
            policy,
            poller: None,
            events: None,
            view: watch::Sender::new(initial),
            on_complete: None,
        }
    }

    pub fn with_on_complete(mut self, callback: impl FnMut(&JobStatus) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> DialogView {
        self.view.borrow().clone()
    }

    pub fn phase(&self) -> &DialogPhase {
        &self.phase
    }

    pub fn selection(&self) -> &FieldSelection {
        &self.selection
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.phase, DialogPhase::Polling { .. })
    }

    pub fn can_apply(&self) -> bool {
        matches!(self.phase, DialogPhase::Form) && self.selection.is_ready_to_submit()
    }

    pub fn can_dismiss(&self) -> bool {
        !self.is_polling()
    }

    /// `round(completed / max(total, 1) * 100)`, or 0 before any submission.
    pub fn progress_percent(&self) -> u8 {
        self.phase.status().map(|(s, _)| s.percent()).unwrap_or(0)
    }

    pub fn message(&self) -> Option<String> {
        phase_message(&self.phase)
    }

    // ── Form edits (ignored outside `form`) ──────────────────────────────────

    pub fn toggle_field(&mut self, name: &str) {
        if self.in_form() {
            self.selection.toggle_field(name);
            self.publish();
        }
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<String>) {
        if self.in_form() {
            self.selection.set_value(name, value);
            self.publish();
        }
    }

    pub fn set_operation_field(&mut self, name: &str, key: OperationKey, value: Option<&str>) {
        if self.in_form() {
            self.selection.set_operation_field(name, key, value);
            self.publish();
        }
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    /// Submits the current selection for `target_ids` and starts polling.
    ///
    /// The placeholder status is published before the start-job call. A
    /// failed submission moves the dialog to `error` without polling. If the
    /// returned future is dropped before the server answers, the dialog goes
    /// back to `form` with the selection intact.
    pub async fn apply(&mut self, target_ids: &[String]) -> ApplyOutcome {
        if !self.in_form() {
            debug!("[BULK-EDIT] Apply ignored in {:?} phase", self.phase.kind());
            return ApplyOutcome::Ignored;
        }

        let request = build_request(&self.selection);
        if request.is_empty() {
            debug!("[BULK-EDIT] Apply ignored: {}", AppError::EmptyRequest);
            return ApplyOutcome::Ignored;
        }
        if target_ids.is_empty() {
            debug!("[BULK-EDIT] Apply ignored: {}", AppError::NoTargets);
            return ApplyOutcome::Ignored;
        }

        let ids = target_ids.to_vec();
        self.phase = DialogPhase::Polling {
            stage: PollingStage::Submitting,
            progress: JobProgress::Placeholder(JobStatus::placeholder(ids.len() as u64)),
        };
        self.publish();

        info!(
            "[BULK-EDIT] Submitting {} field(s) for {} record(s)",
            request.len(),
            ids.len()
        );

        let submitted = {
            let mut guard = SubmissionGuard {
                phase: &mut self.phase,
                selection: &self.selection,
                view: &self.view,
                armed: true,
            };
            let result = self.client.start_bulk_job(&ids, &request).await;
            guard.armed = false;
            result
        };

        let job_id = match submitted {
            Ok(job_id) => job_id,
            Err(e) => {
                warn!("[BULK-EDIT] Bulk edit not started: {}", e);
                self.phase = DialogPhase::Error(DialogFailure::Rejected {
                    presentation: e.to_presentation(),
                });
                self.publish();
                return ApplyOutcome::Rejected;
            }
        };

        if let Err(e) = self.start_polling(job_id.clone()) {
            // The job runs on the server regardless; never report it as refused.
            error!(
                "[BULK-EDIT] Job {} started but cannot be tracked: {}",
                redact_id(&job_id),
                e
            );
            self.phase = DialogPhase::Error(DialogFailure::Untracked {
                job_id: job_id.clone(),
                presentation: e.to_presentation(),
            });
            self.publish();
            return ApplyOutcome::Started { job_id };
        }

        info!("[BULK-EDIT] Job {} started", redact_id(&job_id));
        let progress = match std::mem::replace(&mut self.phase, DialogPhase::Form) {
            DialogPhase::Polling { progress, .. } => progress,
            _ => JobProgress::Placeholder(JobStatus::placeholder(ids.len() as u64)),
        };
        self.phase = DialogPhase::Polling {
            stage: PollingStage::Tracking {
                job_id: job_id.clone(),
            },
            progress,
        };
        self.publish();
        ApplyOutcome::Started { job_id }
    }

    /// Waits for the next polling event and applies it.
    ///
    /// Returns `None` when no job is being polled.
    pub async fn next_update(&mut self) -> Option<&DialogPhase> {
        let event = self.events.as_mut()?.recv().await?;
        self.handle_poll_event(event);
        Some(&self.phase)
    }

    /// Applies polling events until the dialog leaves `polling`.
    pub async fn wait_until_settled(&mut self) -> &DialogPhase {
        while self.is_polling() {
            if self.next_update().await.is_none() {
                break;
            }
        }
        &self.phase
    }

    /// Closes a finished dialog and resets it to an empty form.
    ///
    /// Rejected while a job is running. Leaving `done` runs the completion
    /// callback with the final status.
    pub fn dismiss(&mut self) -> DismissOutcome {
        match std::mem::replace(&mut self.phase, DialogPhase::Form) {
            polling @ DialogPhase::Polling { .. } => {
                self.phase = polling;
                debug!("[BULK-EDIT] Dismiss rejected while polling");
                return DismissOutcome::Rejected;
            }
            DialogPhase::Done { status, .. } => {
                if let Some(callback) = self.on_complete.as_mut() {
                    callback(&status);
                }
            }
            DialogPhase::Form | DialogPhase::Error(_) => {}
        }

        self.stop_polling();
        self.selection.clear();
        self.publish();
        DismissOutcome::Dismissed
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn in_form(&self) -> bool {
        matches!(self.phase, DialogPhase::Form)
    }

    fn start_polling(&mut self, job_id: String) -> Result<(), AppError> {
        if self.poller.as_ref().is_some_and(PollHandle::is_active) {
            return Err(AppError::AlreadyPolling);
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.poller = Some(PollHandle::spawn(
            self.client.clone(),
            job_id,
            self.policy,
            tx,
        ));
        self.events = Some(rx);
        Ok(())
    }

    fn stop_polling(&mut self) {
        self.poller = None;
        self.events = None;
    }

    fn handle_poll_event(&mut self, event: PollEvent) {
        let kind = self.phase.kind();
        let (job_id, progress) = match &mut self.phase {
            DialogPhase::Polling {
                stage: PollingStage::Tracking { job_id },
                progress,
            } => (job_id.clone(), progress),
            _ => {
                debug!("[BULK-EDIT] Poll event ignored in {:?} phase", kind);
                return;
            }
        };

        match event {
            PollEvent::Progress(status) => {
                *progress = JobProgress::Confirmed(status);
            }
            PollEvent::Finished(status) => {
                self.stop_polling();
                self.phase = if status.status == JobState::Done {
                    info!(
                        "[BULK-EDIT] Job {} done: {} updated, {} failed",
                        redact_id(&job_id),
                        status.updated_count(),
                        status.failed_count()
                    );
                    DialogPhase::Done { job_id, status }
                } else {
                    warn!(
                        "[BULK-EDIT] Job {} failed with {} item error(s)",
                        redact_id(&job_id),
                        status.failed_count()
                    );
                    DialogPhase::Error(DialogFailure::JobFailed { job_id, status })
                };
            }
            PollEvent::TimedOut { waited } => {
                let last = progress.clone();
                self.stop_polling();
                self.phase = DialogPhase::Error(DialogFailure::TimedOut {
                    job_id,
                    waited,
                    last,
                });
            }
        }

        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(build_view(&self.phase, &self.selection));
    }
}

impl<C: BulkJobOps + 'static> Drop for BulkEditController<C> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.as_mut() {
            if poller.is_active() {
                info!(
                    "[BULK-EDIT] Dialog closed while job {} was running, polling stopped",
                    redact_id(poller.job_id())
                );
            }
            poller.dispose();
        }
    }
}

/// Restores `form` if `apply` is dropped while the start-job call is pending.
struct SubmissionGuard<'a> {
    phase: &'a mut DialogPhase,
    selection: &'a FieldSelection,
    view: &'a watch::Sender<DialogView>,
    armed: bool,
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("[BULK-EDIT] Submission abandoned before the server answered, back to form");
            *self.phase = DialogPhase::Form;
            self.view.send_replace(build_view(self.phase, self.selection));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View helpers
// ─────────────────────────────────────────────────────────────────────────────

fn build_view(phase: &DialogPhase, selection: &FieldSelection) -> DialogView {
    let status = phase.status();
    let is_form = matches!(phase, DialogPhase::Form);

    DialogView {
        phase: phase.kind(),
        job_id: phase.job_id().map(str::to_string),
        total: status.map(|(s, _)| s.total).unwrap_or(0),
        completed: status.map(|(s, _)| s.completed).unwrap_or(0),
        percent: status.map(|(s, _)| s.percent()).unwrap_or(0),
        confirmed: status.map(|(_, confirmed)| confirmed).unwrap_or(false),
        item_errors: status.map(|(s, _)| s.failed_count()).unwrap_or(0),
        message: phase_message(phase),
        can_apply: is_form && selection.is_ready_to_submit(),
        can_dismiss: !matches!(phase, DialogPhase::Polling { .. }),
    }
}

fn phase_message(phase: &DialogPhase) -> Option<String> {
    match phase {
        DialogPhase::Form | DialogPhase::Polling { .. } => None,
        DialogPhase::Done { status, .. } => {
            let mut message = format!("{} updated", records(status.updated_count()));
            let failed = status.failed_count();
            if failed > 0 {
                message.push_str(&format!(", {} failed", records(failed)));
            }
            Some(message)
        }
        DialogPhase::Error(DialogFailure::Rejected { presentation }) => {
            Some(presentation.message.clone())
        }
        DialogPhase::Error(DialogFailure::Untracked { presentation, .. }) => Some(format!(
            "The bulk edit was started but its progress cannot be shown. {}",
            presentation.message
        )),
        DialogPhase::Error(DialogFailure::JobFailed { job_id, status }) => {
            let base = AppError::JobFailed {
                job_id: job_id.clone(),
                message: JOB_FAILED_MESSAGE.to_string(),
            }
            .to_presentation()
            .message;
            let failed = status.failed_count();
            if failed > 0 {
                Some(format!("{} {} reported errors.", base, records(failed)))
            } else {
                Some(base)
            }
        }
        DialogPhase::Error(DialogFailure::TimedOut { job_id, waited, .. }) => Some(
            AppError::PollTimeout {
                job_id: job_id.clone(),
                waited_secs: waited.as_secs(),
            }
            .to_presentation()
            .message,
        ),
    }
}

fn records(n: u64) -> String {
    if n == 1 {
        "1 record".to_string()
    } else {
        format!("{} records", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{JobItemError, JobResult};
    use crate::edit::{movement_catalog, BulkMutationRequest};
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fake job service: one scripted start result and a queue of status
    /// responses (`None` = transport failure, exhausted = transport failure).
    struct FakeJobs {
        start_result: Mutex<Option<Result<String, AppError>>>,
        statuses: Mutex<VecDeque<Option<JobStatus>>>,
        start_delay: Duration,
        start_calls: AtomicUsize,
        status_calls: AtomicUsize,
    }

    impl FakeJobs {
        fn new(start: Result<String, AppError>, statuses: Vec<Option<JobStatus>>) -> Self {
            Self {
                start_result: Mutex::new(Some(start)),
                statuses: Mutex::new(statuses.into()),
                start_delay: Duration::ZERO,
                start_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
            }
        }

        fn with_start_delay(mut self, delay: Duration) -> Self {
            self.start_delay = delay;
            self
        }
    }

    impl BulkJobOps for FakeJobs {
        fn start_bulk_job<'a>(
            &'a self,
            _ids: &'a [String],
            _updates: &'a BulkMutationRequest,
        ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
            Box::pin(async move {
                self.start_calls.fetch_add(1, Ordering::SeqCst);
                if !self.start_delay.is_zero() {
                    tokio::time::sleep(self.start_delay).await;
                }
                self.start_result
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| Err(AppError::Internal("start called twice".into())))
            })
        }

        fn get_job_status<'a>(
            &'a self,
            _job_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<JobStatus, AppError>> + Send + 'a>> {
            Box::pin(async move {
                self.status_calls.fetch_add(1, Ordering::SeqCst);
                self.statuses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .flatten()
                    .ok_or_else(|| AppError::ConnectionFailed("offline".into()))
            })
        }
    }

    fn status(total: u64, completed: u64, state: JobState) -> JobStatus {
        JobStatus {
            total,
            completed,
            errors: Vec::new(),
            status: state,
            result: None,
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("mov-{}", i)).collect()
    }

    fn setup(fake: FakeJobs) -> (BulkEditController<FakeJobs>, Arc<FakeJobs>) {
        let fake = Arc::new(fake);
        let controller = BulkEditController::new(
            fake.clone(),
            Arc::new(movement_catalog()),
            PollPolicy::default(),
        );
        (controller, fake)
    }

    fn fill_total(controller: &mut BulkEditController<FakeJobs>, value: &str) {
        controller.toggle_field("total");
        controller.set_operation_field("total", OperationKey::Value, Some(value));
    }

    #[tokio::test]
    async fn apply_is_ignored_without_complete_fields() {
        let (mut controller, fake) = setup(FakeJobs::new(Ok("J1".into()), vec![]));
        controller.toggle_field("total");

        assert!(!controller.can_apply());
        assert_eq!(controller.apply(&ids(2)).await, ApplyOutcome::Ignored);
        assert_eq!(controller.phase(), &DialogPhase::Form);
        assert_eq!(fake.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn apply_is_ignored_without_targets() {
        let (mut controller, fake) = setup(FakeJobs::new(Ok("J1".into()), vec![]));
        fill_total(&mut controller, "10");

        assert_eq!(controller.apply(&[]).await, ApplyOutcome::Ignored);
        assert_eq!(fake.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn placeholder_is_published_before_start_call_resolves() {
        let (mut controller, _fake) = setup(
            FakeJobs::new(Ok("J1".into()), vec![]).with_start_delay(Duration::from_secs(1)),
        );
        fill_total(&mut controller, "10");
        let mut rx = controller.subscribe();
        let targets = ids(3);

        let (outcome, first_view) = tokio::join!(controller.apply(&targets), async {
            rx.changed().await.unwrap();
            rx.borrow_and_update().clone()
        });

        assert_eq!(first_view.phase, PhaseKind::Polling);
        assert_eq!(first_view.job_id, None);
        assert_eq!(first_view.total, 3);
        assert_eq!(first_view.completed, 0);
        assert!(!first_view.confirmed);
        assert!(!first_view.can_dismiss);
        assert_eq!(outcome, ApplyOutcome::Started { job_id: "J1".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn progress_becomes_confirmed_after_first_response() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Ok("J1".into()),
            vec![Some(status(4, 1, JobState::Pending))],
        ));
        fill_total(&mut controller, "10");

        controller.apply(&ids(4)).await;
        assert!(matches!(
            controller.phase(),
            DialogPhase::Polling { progress: JobProgress::Placeholder(_), .. }
        ));

        controller.next_update().await;
        assert!(matches!(
            controller.phase(),
            DialogPhase::Polling { progress: JobProgress::Confirmed(_), .. }
        ));
        assert_eq!(controller.progress_percent(), 25);
        assert_eq!(controller.view().job_id.as_deref(), Some("J1"));
    }

    #[tokio::test(start_paused = true)]
    async fn apply_outside_form_is_ignored() {
        let (mut controller, fake) = setup(FakeJobs::new(
            Ok("J1".into()),
            vec![Some(status(2, 0, JobState::Pending))],
        ));
        fill_total(&mut controller, "10");

        controller.apply(&ids(2)).await;
        assert_eq!(controller.apply(&ids(2)).await, ApplyOutcome::Ignored);
        assert_eq!(fake.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_poller_is_refused() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Ok("J1".into()),
            vec![Some(status(2, 0, JobState::Pending))],
        ));
        fill_total(&mut controller, "10");
        controller.apply(&ids(2)).await;

        let result = controller.start_polling("J2".into());
        assert!(matches!(result, Err(AppError::AlreadyPolling)));
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_job_that_cannot_be_polled_is_not_reported_as_rejected() {
        let (mut controller, fake) = setup(FakeJobs::new(Ok("J1".into()), vec![]));
        fill_total(&mut controller, "10");
        controller.start_polling("J0".into()).unwrap();

        let outcome = controller.apply(&ids(2)).await;

        assert_eq!(outcome, ApplyOutcome::Started { job_id: "J1".into() });
        assert!(matches!(
            controller.phase(),
            DialogPhase::Error(DialogFailure::Untracked { job_id, .. }) if job_id == "J1"
        ));
        assert_eq!(controller.view().job_id.as_deref(), Some("J1"));
        assert!(controller.message().unwrap().starts_with("The bulk edit was started"));
        assert!(controller.can_dismiss());
        assert_eq!(fake.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_apply_returns_to_form() {
        let (mut controller, fake) = setup(
            FakeJobs::new(Ok("J1".into()), vec![]).with_start_delay(Duration::from_secs(3_600)),
        );
        fill_total(&mut controller, "10");
        let rx = controller.subscribe();

        let result =
            tokio::time::timeout(Duration::from_secs(30), controller.apply(&ids(2))).await;

        assert!(result.is_err());
        assert_eq!(fake.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase(), &DialogPhase::Form);
        assert!(controller.selection().is_active("total"));
        assert_eq!(rx.borrow().phase, PhaseKind::Form);
        assert!(rx.borrow().can_apply);
        assert!(controller.can_apply());
        assert_eq!(controller.next_update().await, None);
        assert_eq!(controller.dismiss(), DismissOutcome::Dismissed);
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_is_rejected_while_polling() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Ok("J1".into()),
            vec![Some(status(2, 0, JobState::Pending))],
        ));
        fill_total(&mut controller, "10");
        controller.apply(&ids(2)).await;

        assert!(!controller.can_dismiss());
        assert_eq!(controller.dismiss(), DismissOutcome::Rejected);
        assert!(controller.is_polling());
        assert!(controller.selection().is_active("total"));
    }

    #[tokio::test(start_paused = true)]
    async fn dismissing_done_resets_and_notifies() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Ok("J1".into()),
            vec![Some(status(2, 2, JobState::Done))],
        ));
        let notified = Arc::new(Mutex::new(Vec::new()));
        let sink = notified.clone();
        controller = controller.with_on_complete(move |s| sink.lock().unwrap().push(s.completed));
        fill_total(&mut controller, "10");

        controller.apply(&ids(2)).await;
        controller.wait_until_settled().await;
        assert_eq!(controller.message().as_deref(), Some("2 records updated"));

        assert_eq!(controller.dismiss(), DismissOutcome::Dismissed);
        assert_eq!(controller.phase(), &DialogPhase::Form);
        assert!(controller.selection().active_fields().is_empty());
        assert_eq!(controller.progress_percent(), 0);
        assert_eq!(*notified.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn dismissing_rejection_does_not_notify() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Err(AppError::SubmissionRejected("quota exceeded".into())),
            vec![],
        ));
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        controller = controller.with_on_complete(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        fill_total(&mut controller, "10");

        assert_eq!(controller.apply(&ids(1)).await, ApplyOutcome::Rejected);
        assert_eq!(controller.dismiss(), DismissOutcome::Dismissed);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn job_error_reports_fixed_message_and_item_errors() {
        let mut failed = status(3, 3, JobState::Error);
        failed.errors = vec![
            JobItemError::Message("fila 2 invalida".into()),
            JobItemError::Message("fila 3 invalida".into()),
        ];
        let (mut controller, _fake) = setup(FakeJobs::new(Ok("J1".into()), vec![Some(failed)]));
        fill_total(&mut controller, "10");

        controller.apply(&ids(3)).await;
        controller.wait_until_settled().await;

        assert!(matches!(
            controller.phase(),
            DialogPhase::Error(DialogFailure::JobFailed { .. })
        ));
        assert_eq!(
            controller.message().as_deref(),
            Some("The server could not complete the bulk edit. 2 records reported errors.")
        );
        assert_eq!(controller.view().item_errors, 2);
        assert!(controller.can_dismiss());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_success_mentions_failures() {
        let mut done = status(5, 5, JobState::Done);
        done.result = Some(JobResult { ok: 4, failed: 1 });
        let (mut controller, _fake) = setup(FakeJobs::new(Ok("J1".into()), vec![Some(done)]));
        fill_total(&mut controller, "10");

        controller.apply(&ids(5)).await;
        controller.wait_until_settled().await;

        assert_eq!(
            controller.message().as_deref(),
            Some("4 records updated, 1 record failed")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn poll_timeout_moves_to_error() {
        let fake = Arc::new(FakeJobs::new(
            Ok("J1".into()),
            (0..10).map(|_| Some(status(9, 1, JobState::Pending))).collect(),
        ));
        let policy = PollPolicy {
            interval: Duration::from_secs(3),
            max_duration: Some(Duration::from_secs(5)),
        };
        let mut controller =
            BulkEditController::new(fake.clone(), Arc::new(movement_catalog()), policy);
        fill_total(&mut controller, "10");

        controller.apply(&ids(9)).await;
        controller.wait_until_settled().await;

        match controller.phase() {
            DialogPhase::Error(DialogFailure::TimedOut { waited, last, .. }) => {
                assert_eq!(*waited, Duration::from_secs(6));
                assert!(last.is_confirmed());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(controller.view().percent, 11);
        assert!(controller.message().unwrap().contains("6 seconds"));
    }

    #[tokio::test]
    async fn edits_are_ignored_outside_form() {
        let (mut controller, _fake) = setup(FakeJobs::new(
            Err(AppError::SubmissionRejected("no".into())),
            vec![],
        ));
        fill_total(&mut controller, "10");
        controller.apply(&ids(1)).await;

        controller.toggle_field("estado");
        assert!(!controller.selection().is_active("estado"));
    }

    #[test]
    fn record_counts_are_pluralized() {
        assert_eq!(records(1), "1 record");
        assert_eq!(records(0), "0 records");
        assert_eq!(records(3), "3 records");
    }
}
