//! The resumable abstraction: anything the scheduler can run for one
//! cooperative quantum.

use std::sync::Arc;

/// Outcome of one `resume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeResult {
    /// Quantum exhausted, mailbox still non-empty: re-enqueue.
    ResumeLater,
    /// Mailbox empty; the mailbox transitioned to `blocked`.
    AwaitingMessage,
    /// Actor terminated and its mailbox is closed; drop the reference.
    Done,
    /// Rare: the resumable asks its worker to stop outright. Used by the
    /// scheduler's own poison-pill token to unwind a worker thread cleanly.
    ShutdownExecutionUnit,
}

/// Something the scheduler can run for one quantum. Implemented by the
/// actor cell; detached-actor threads and worker-pool threads call the same
/// trait method.
pub trait Resumable: Send + Sync {
    /// Runs the resumable for up to `max_throughput` units of work (for an
    /// actor, envelopes) and returns why it stopped.
    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult;
}

/// What an actor cell submits itself to on `new -> ready` and
/// `awaiting_message -> ready` transitions. A trait rather than a concrete
/// scheduler type so `actor::cell` does not need to name the scheduler
/// module.
pub trait SchedulerHandle: Send + Sync {
    fn submit(&self, resumable: Arc<dyn Resumable>);
}
