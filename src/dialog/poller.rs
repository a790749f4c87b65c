//! Fixed-interval status polling for one bulk job.
//!
//! The loop runs as a single tokio task owned by a [`PollHandle`]. Status
//! requests are issued one at a time, so two requests for the same job are
//! never outstanding together. Dropping the handle cancels the task.
//!
//! Events go through a channel of [`EVENT_BUFFER`] slots. While the owner is
//! not reading, the loop waits on delivery and issues no further requests,
//! so unread progress never accumulates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::client::redact_id;
use crate::api::{JobState, JobStatus};
use crate::dialog::ops::BulkJobOps;

/// Default period between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3_000);

/// Capacity of the event channel passed to [`PollHandle::spawn`].
pub const EVENT_BUFFER: usize = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Period between status requests. The first request is immediate.
    pub interval: Duration,
    /// Give up after this long. `None` polls until the job finishes.
    pub max_duration: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_duration: None,
        }
    }
}

/// What the loop reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Non-terminal status received.
    Progress(JobStatus),
    /// Terminal status received; the loop has stopped.
    Finished(JobStatus),
    /// `max_duration` elapsed before a terminal status; the loop has stopped.
    TimedOut { waited: Duration },
}

/// Lifecycle of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Active,
    TerminalDone,
    TerminalError,
    TimedOut,
    Disposed,
}

// ─────────────────────────────────────────────────────────────────────────────
// PollHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of a running polling loop. Dropping it stops the loop.
pub struct PollHandle {
    job_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    state: Arc<watch::Sender<PollState>>,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("job_id", &self.job_id)
            .field("state", &self.state())
            .finish()
    }
}

impl PollHandle {
    /// Starts polling `job_id`: one request now, then one per `policy.interval`.
    ///
    /// Events are sent to `events` until the job reaches a terminal state,
    /// times out, the receiver is dropped, or the handle is dropped. Create
    /// the channel with [`EVENT_BUFFER`] slots.
    pub fn spawn<C: BulkJobOps + 'static>(
        client: Arc<C>,
        job_id: String,
        policy: PollPolicy,
        events: mpsc::Sender<PollEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let state = Arc::new(watch::Sender::new(PollState::Active));

        info!(
            "[BULK-POLL] Polling job {} every {}ms",
            redact_id(&job_id),
            policy.interval.as_millis()
        );

        let task = tokio::spawn(run_loop(
            client,
            job_id.clone(),
            policy,
            events,
            cancel.clone(),
            state.clone(),
        ));

        Self {
            job_id,
            cancel,
            task,
            state,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == PollState::Active
    }

    /// Stops the loop. No status request is issued and no event is sent
    /// after this returns.
    pub fn dispose(&mut self) {
        if transition(&self.state, PollState::Disposed) {
            debug!("[BULK-POLL] Disposed poller for job {}", redact_id(&self.job_id));
        }
        self.cancel.cancel();
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Moves an active loop to `next`. Terminal states are never overwritten.
fn transition(state: &watch::Sender<PollState>, next: PollState) -> bool {
    state.send_if_modified(|current| {
        if *current == PollState::Active {
            *current = next;
            true
        } else {
            false
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

async fn run_loop<C: BulkJobOps>(
    client: Arc<C>,
    job_id: String,
    policy: PollPolicy,
    events: mpsc::Sender<PollEvent>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<PollState>>,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(policy.interval);
    // A slow request delays the next tick instead of causing a burst.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Some(max) = policy.max_duration {
            let waited = started.elapsed();
            if waited >= max {
                warn!(
                    "[BULK-POLL] Job {} still running after {}s, giving up",
                    redact_id(&job_id),
                    waited.as_secs()
                );
                if transition(&state, PollState::TimedOut) {
                    deliver(&events, &cancel, PollEvent::TimedOut { waited }).await;
                }
                break;
            }
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = client.get_job_status(&job_id) => result,
        };

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    "[BULK-POLL] Status request for job {} failed, retrying next tick: {}",
                    redact_id(&job_id),
                    e
                );
                continue;
            }
        };

        debug!(
            "[BULK-POLL] Job {} {:?} {}/{} ({} item errors)",
            redact_id(&job_id),
            status.status,
            status.completed,
            status.total,
            status.errors.len()
        );

        if status.status.is_terminal() {
            let next = if status.status == JobState::Done {
                PollState::TerminalDone
            } else {
                PollState::TerminalError
            };
            if transition(&state, next) {
                info!("[BULK-POLL] Job {} finished: {:?}", redact_id(&job_id), status.status);
                deliver(&events, &cancel, PollEvent::Finished(status)).await;
            }
            break;
        }

        if !deliver(&events, &cancel, PollEvent::Progress(status)).await {
            // Nobody is listening any more.
            transition(&state, PollState::Disposed);
            break;
        }
    }
}

/// Sends `event`, waiting for a free slot. False if the receiver is gone or
/// the loop was cancelled while waiting.
async fn deliver(
    events: &mpsc::Sender<PollEvent>,
    cancel: &CancellationToken,
    event: PollEvent,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}
