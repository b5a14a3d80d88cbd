//! The actor-facing surface: the `Actor` trait user code implements, the
//! context handed to each invocation, and the three dispositions a
//! behaviour can leave an envelope in.

pub mod actor_ref;
pub mod cell;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::actor_ref::ActorRef;
use crate::actor::cell::ActorCell;
use crate::attachable::{AttachToken, Attachable};
use crate::clock::{ActorClock, ScheduleTarget};
use crate::envelope::{Envelope, Payload};
use crate::error::ExitReason;
use crate::message_id::MessageId;

/// What happened to an envelope handed to a behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The behaviour handled it. The default outcome.
    Consumed,
    /// The behaviour could not handle it right now; the cell re-stashes the
    /// same envelope at the head of its lane to preserve FIFO order among
    /// skipped envelopes.
    Skipped,
    /// Discarded; a warning is logged with the envelope's message id.
    Dropped,
}

/// Implemented by user actor types. One instance per running actor; `resume`
/// never invokes it from more than one thread at a time.
pub trait Actor: Send + 'static {
    /// Runs once before the first envelope is processed.
    fn pre_start(&mut self, _ctx: &ActorContext) {}

    /// Runs after `cleanup` completes, just before the cell is dropped.
    fn post_stop(&mut self, _reason: &ExitReason) {}

    /// Handles one envelope. Receives the envelope by reference so a
    /// `Disposition::Skipped` can hand the very same envelope back for
    /// re-stashing without the core needing to reconstruct it.
    fn receive(&mut self, ctx: &ActorContext, envelope: &Envelope) -> Disposition;
}

/// Handed to `Actor::receive` (and available via `ctx` helpers on the
/// envelope-processing path). Bundles the pieces of the cell a behaviour is
/// allowed to touch: identity, the sender of the in-flight envelope, the
/// clock, and the linking/attaching operations.
pub struct ActorContext<'a> {
    myself: ActorRef,
    sender: Option<ActorRef>,
    cell: &'a ActorCell,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(myself: ActorRef, sender: Option<ActorRef>, cell: &'a ActorCell) -> ActorContext<'a> {
        ActorContext { myself, sender, cell }
    }

    pub fn myself(&self) -> &ActorRef {
        &self.myself
    }

    pub fn sender(&self) -> Option<&ActorRef> {
        self.sender.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn ActorClock> {
        self.cell.clock()
    }

    /// Sends `msg` back to the envelope's sender as a response, preserving
    /// request/response correlation. A no-op (with a warning) if there was
    /// no sender.
    pub fn reply<T: Any + Send>(&self, request_id: MessageId, msg: T) {
        match &self.sender {
            Some(sender) => {
                sender.send(Some(self.myself.clone()), request_id.response_id(), Vec::new(), msg);
            }
            None => tracing::warn!("reply: envelope had no sender, response dropped"),
        }
    }

    /// Requests that this actor terminate with `reason` once the current
    /// envelope finishes processing.
    pub fn stop(&self, reason: ExitReason) {
        self.cell.request_stop(reason);
    }

    pub fn link_to(&self, other: &ActorRef) {
        self.myself.link_to(other);
    }

    pub fn unlink_from(&self, other: &ActorRef) {
        self.myself.unlink_from(other);
    }

    pub fn attach(&self, callback: Box<dyn Attachable>) -> AttachToken {
        self.cell.attach(callback)
    }

    pub fn detach(&self, token: AttachToken) -> bool {
        self.cell.detach(token)
    }

    /// Registers a one-shot handler against the next response to `request_id`,
    /// matched in strict LIFO order against other awaited registrations.
    /// `timeout` schedules a synthetic `request_timeout` delivery if no
    /// response arrives in time.
    pub fn await_response<F>(&self, request_id: MessageId, timeout: Duration, handler: F)
    where
        F: FnOnce(&ActorContext, Envelope) + Send + 'static,
    {
        self.cell.register_awaited(request_id, Box::new(handler), timeout);
    }

    /// Registers a handler against `request_id` dispatched in arrival order
    /// rather than LIFO order, independent of any other pending awaits.
    pub fn await_response_multiplexed<F>(&self, request_id: MessageId, timeout: Duration, handler: F)
    where
        F: FnOnce(&ActorContext, Envelope) + Send + 'static,
    {
        self.cell.register_multiplexed(request_id, Box::new(handler), timeout);
    }
}

/// Builds an `ActorRef`'s outgoing request envelope and schedules its
/// timeout against the clock, wiring id correlation between `ctx.clock()`
/// and the target's mailbox (used by `ActorContext::await_response*`'s
/// callers and by remote-style ask patterns built on top of this crate).
pub(crate) fn schedule_request_timeout(
    clock: &Arc<dyn ActorClock>,
    timeout: Duration,
    target: ScheduleTarget,
    request_id: MessageId,
) -> crate::clock::Disposable {
    use crate::error::{ErrorResponse, ExitReasonTag};

    let envelope = Envelope::new(
        None,
        request_id.error_response_id(),
        Vec::new(),
        Payload::new(ErrorResponse {
            reason: ExitReasonTag::RequestTimeout,
        }),
    );
    clock.schedule_message_in(timeout, target, envelope)
}
