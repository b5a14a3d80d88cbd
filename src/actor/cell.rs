//! The actor control block and body: identity, the mailbox, links,
//! attachables, behaviour, the awaited/multiplexed response registries, and
//! cleanup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::actor::actor_ref::{ActorRef, WeakActorRef};
use crate::actor::{Actor, ActorContext, Disposition};
use crate::attachable::{AttachToken, Attachable, Attachables};
use crate::clock::{ActorClock, Disposable, ScheduleTarget};
use crate::envelope::{Envelope, Payload};
use crate::error::{ErrorResponse, ExitReason, ExitReasonTag};
use crate::flags::ActorFlags;
use crate::id::ActorAddress;
use crate::mailbox::{Mailbox, PushReport};
use crate::message_id::MessageId;
use crate::profiler::{NoopProfiler, Profiler};
use crate::resumable::{ResumeResult, Resumable, SchedulerHandle};
use crate::system::RunningCount;

type AwaitedHandler = Box<dyn FnOnce(&ActorContext, Envelope) + Send>;

struct AwaitedEntry {
    request_number: u64,
    handler: AwaitedHandler,
    timeout: Disposable,
}

struct MultiplexedEntry {
    handler: AwaitedHandler,
    timeout: Disposable,
}

/// The control block: everything a handle needs regardless of whether it
/// ever runs. Holding an `Arc<ActorCell>` (an [`ActorRef`]) keeps the actor's
/// body alive; `Weak<ActorCell>` keeps only this struct alive.
pub struct ActorCell {
    pub(crate) address: ActorAddress,
    pub(crate) flags: ActorFlags,
    weak_self: WeakActorRef,
    mailbox: Mailbox,
    attachables: Attachables,
    pub(crate) links: Mutex<HashMap<ActorAddress, WeakActorRef>>,
    behavior: Mutex<Box<dyn Actor>>,
    awaited: Mutex<Vec<AwaitedEntry>>,
    multiplexed: Mutex<HashMap<u64, MultiplexedEntry>>,
    clock: Arc<dyn ActorClock>,
    scheduler: Arc<dyn SchedulerHandle>,
    running_count: Option<Arc<RunningCount>>,
    profiler: Arc<dyn Profiler>,
    stop_requested: Mutex<Option<ExitReason>>,
    cleanup_ran: AtomicBool,
}

/// Inputs needed to stand up a cell; kept together so `ActorSystem::actor_of`
/// has a single place to assemble them.
pub struct ActorCellArgs {
    pub behavior: Box<dyn Actor>,
    pub clock: Arc<dyn ActorClock>,
    pub scheduler: Arc<dyn SchedulerHandle>,
    pub running_count: Option<Arc<RunningCount>>,
    pub profiler: Arc<dyn Profiler>,
    pub hidden: bool,
    pub detached: bool,
}

impl ActorCell {
    /// Builds the cell and returns the strong handle. Uses `Arc::new_cyclic`
    /// so the cell can hand out `myself()` without an external setter.
    pub fn spawn(args: ActorCellArgs) -> ActorRef {
        let address = ActorAddress::new(crate::id::ActorId::next());
        let registered = !args.hidden;
        let detached = args.detached;
        let arc = Arc::new_cyclic(|weak: &Weak<ActorCell>| {
            let flags = ActorFlags::new();
            flags.set_hidden(args.hidden);
            flags.set_detached(args.detached);
            flags.set_registered(registered);
            ActorCell {
                address,
                flags,
                weak_self: WeakActorRef::new(weak.clone(), address),
                mailbox: Mailbox::new(),
                attachables: Attachables::new(),
                links: Mutex::new(HashMap::new()),
                behavior: Mutex::new(args.behavior),
                awaited: Mutex::new(Vec::new()),
                multiplexed: Mutex::new(HashMap::new()),
                clock: args.clock,
                scheduler: args.scheduler,
                running_count: args.running_count,
                profiler: args.profiler,
                stop_requested: Mutex::new(None),
                cleanup_ran: AtomicBool::new(false),
            }
        });
        if let Some(count) = &arc.running_count {
            if registered {
                count.increment();
            }
        }
        arc.profiler.add_actor(address);
        let actor_ref = ActorRef::new(arc.clone());
        let ctx = ActorContext::new(actor_ref.clone(), None, &arc);
        arc.behavior.lock().pre_start(&ctx);
        arc.flags.set_initialized(true);
        // `new -> ready`: a pool actor must be handed to the scheduler once
        // at launch, since nothing else will submit it until its mailbox
        // first transitions from blocked to ready. Detached actors skip
        // this; their dedicated thread drives `resume` itself.
        if !detached {
            arc.scheduler.submit(arc.clone());
        }
        actor_ref
    }

    pub(crate) fn myself(&self) -> ActorRef {
        self.weak_self.upgrade().expect("cell outlives any call running on it")
    }

    pub(crate) fn clock(&self) -> &Arc<dyn ActorClock> {
        &self.clock
    }

    /// Pushes to the mailbox. On the blocked-to-ready transition, submits
    /// this cell as a resumable to the scheduler. On `queue_closed`, the
    /// envelope is bounced and `false` is returned.
    pub fn enqueue(self: &Arc<Self>, envelope: Envelope) -> bool {
        match self.mailbox.push_back_reporting(envelope) {
            PushReport::Accepted => true,
            PushReport::UnblockedReader => {
                self.scheduler.submit(self.clone());
                true
            }
            PushReport::Closed => false,
        }
    }

    pub fn attach(&self, callback: Box<dyn Attachable>) -> AttachToken {
        self.attachables.attach(callback)
    }

    pub fn detach(&self, token: AttachToken) -> bool {
        self.attachables.detach(token)
    }

    pub(crate) fn request_stop(&self, reason: ExitReason) {
        let mut slot = self.stop_requested.lock();
        if slot.is_none() {
            *slot = Some(reason);
        }
    }

    pub(crate) fn register_awaited(self: &Arc<Self>, request_id: MessageId, handler: AwaitedHandler, timeout: Duration) {
        let disposable = self.schedule_timeout(request_id, timeout);
        self.awaited.lock().push(AwaitedEntry {
            request_number: request_id.request_number(),
            handler,
            timeout: disposable,
        });
    }

    pub(crate) fn register_multiplexed(self: &Arc<Self>, request_id: MessageId, handler: AwaitedHandler, timeout: Duration) {
        let disposable = self.schedule_timeout(request_id, timeout);
        self.multiplexed.lock().insert(
            request_id.request_number(),
            MultiplexedEntry {
                handler,
                timeout: disposable,
            },
        );
    }

    fn schedule_timeout(self: &Arc<Self>, request_id: MessageId, timeout: Duration) -> Disposable {
        let envelope = Envelope::new(
            None,
            request_id.error_response_id(),
            Vec::new(),
            Payload::new(ErrorResponse {
                reason: ExitReasonTag::RequestTimeout,
            }),
        );
        self.clock
            .schedule_message_in(timeout, ScheduleTarget::Weak(self.weak_self.clone()), envelope)
    }

    fn take_multiplexed(&self, request_number: u64) -> Option<MultiplexedEntry> {
        self.multiplexed.lock().remove(&request_number)
    }

    /// Pops the awaited stack's top entry iff it matches `request_number`
    /// (strictly LIFO matching).
    fn take_awaited_if_matching(&self, request_number: u64) -> Option<AwaitedEntry> {
        let mut awaited = self.awaited.lock();
        match awaited.last() {
            Some(top) if top.request_number == request_number => awaited.pop(),
            _ => None,
        }
    }

    fn has_awaited(&self) -> bool {
        !self.awaited.lock().is_empty()
    }

    /// Routes one envelope: response-shaped envelopes are matched against
    /// the multiplexed map first (arrival order, independent of the awaited
    /// stack), then the awaited stack's top; anything else, or a response
    /// that matches neither, falls to the ordinary behaviour.
    fn dispatch(self: &Arc<Self>, envelope: Envelope) {
        if envelope.message_id.is_response() {
            let original = envelope.message_id.answered_request_number();

            if let Some(entry) = self.take_multiplexed(original) {
                entry.timeout.dispose();
                let ctx = ActorContext::new(self.myself(), envelope.sender.clone(), self);
                (entry.handler)(&ctx, envelope);
                return;
            }

            if let Some(entry) = self.take_awaited_if_matching(original) {
                entry.timeout.dispose();
                let ctx = ActorContext::new(self.myself(), envelope.sender.clone(), self);
                (entry.handler)(&ctx, envelope);
                return;
            }

            if self.has_awaited() {
                // Doesn't match the awaited stack's head: stash it so FIFO
                // order among skipped responses is preserved, and let the
                // quantum budget bound how long this can spin.
                trace!(id = ?envelope.message_id, "response does not match awaited head, skipping");
                self.mailbox.push_front(envelope);
                return;
            }
        }

        let myself = self.myself();
        let sender = envelope.sender.clone();
        let ctx = ActorContext::new(myself, sender, self);
        self.profiler.before_processing(self.address);
        let disposition = self.behavior.lock().receive(&ctx, &envelope);
        self.profiler.after_processing(self.address);
        match disposition {
            Disposition::Consumed => {}
            Disposition::Skipped => self.mailbox.push_front(envelope),
            Disposition::Dropped => warn!(id = ?envelope.message_id, "behaviour dropped envelope"),
        }
    }

    /// Runs an actor's exit path exactly once, however it's triggered
    /// (explicit `stop`, a supervisor-driven restart, or the strong count
    /// hitting zero). Idempotent, thread-safe, sets `terminated`.
    pub(crate) fn cleanup(self: &Arc<Self>, reason: ExitReason) {
        if self.cleanup_ran.swap(true, Ordering::AcqRel) {
            return;
        }
        self.flags.set_terminated(true);

        self.attachables.cleanup(&reason);

        let partners: Vec<WeakActorRef> = std::mem::take(&mut *self.links.lock()).into_values().collect();
        for partner in partners {
            if let Some(partner_ref) = partner.upgrade() {
                partner_ref.tell(ExitMessage { source: self.address, reason: reason.clone() }, Some(self.myself()));
            }
        }

        let bounced = self.mailbox.close();
        trace!(address = %self.address, bounced, "mailbox closed during cleanup");

        if self.flags.registered() {
            if let Some(count) = &self.running_count {
                count.decrement();
            }
        }
        self.profiler.remove_actor(self.address);

        self.behavior.lock().post_stop(&reason);
    }
}

/// Delivered to link partners on cleanup. Not an ordinary behaviour message;
/// the one shape the core itself constructs and sends.
#[derive(Debug, Clone)]
pub struct ExitMessage {
    pub source: ActorAddress,
    pub reason: ExitReason,
}

impl Resumable for ActorCell {
    fn resume(self: Arc<Self>, max_throughput: usize) -> ResumeResult {
        let mut processed = 0usize;
        while processed < max_throughput {
            if let Some(reason) = self.stop_requested.lock().take() {
                self.cleanup(reason);
            }
            if self.flags.terminated() {
                return ResumeResult::Done;
            }
            match self.mailbox.pop_front() {
                Some(envelope) => {
                    self.dispatch(envelope);
                    processed += 1;
                }
                None => {
                    if self.mailbox.try_block() {
                        return ResumeResult::AwaitingMessage;
                    }
                    // A concurrent push unblocked us between `pop_front`
                    // returning empty and `try_block`'s CAS; loop and retry
                    // without counting it against the quantum.
                }
            }
        }
        if self.flags.terminated() {
            return ResumeResult::Done;
        }
        // Quantum exhausted exactly as the mailbox drained: prefer blocking
        // over reporting a non-empty mailbox that no longer has anything in
        // it.
        if self.mailbox.is_empty() && self.mailbox.try_block() {
            return ResumeResult::AwaitingMessage;
        }
        ResumeResult::ResumeLater
    }
}

impl Drop for ActorCell {
    fn drop(&mut self) {
        if !self.cleanup_ran.swap(true, Ordering::AcqRel) {
            // Strong count hit zero with no explicit `cleanup` call (e.g. the
            // cell was never resumed after construction). Runs the same exit
            // path `cleanup` would, minus the sender on the exit message:
            // there is no `Arc<Self>` left to hand out as `myself()`.
            self.flags.set_terminated(true);
            self.attachables.cleanup(&ExitReason::NotExited);
            for (_, partner) in std::mem::take(&mut *self.links.lock()) {
                if let Some(partner_ref) = partner.upgrade() {
                    partner_ref.tell(
                        ExitMessage {
                            source: self.address,
                            reason: ExitReason::NotExited,
                        },
                        None,
                    );
                }
            }
            let bounced = self.mailbox.close();
            trace!(address = %self.address, bounced, "cell dropped without explicit cleanup");
            if self.flags.registered() {
                if let Some(count) = &self.running_count {
                    count.decrement();
                }
            }
            self.profiler.remove_actor(self.address);
            self.behavior.lock().post_stop(&ExitReason::NotExited);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::virtual_clock::VirtualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopScheduler;
    impl SchedulerHandle for NoopScheduler {
        fn submit(&self, resumable: Arc<dyn Resumable>) {
            resumable.resume(50);
        }
    }

    struct Echo {
        received: Arc<AtomicUsize>,
    }

    impl Actor for Echo {
        fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
            if envelope.payload.is::<u32>() {
                self.received.fetch_add(1, Ordering::SeqCst);
                Disposition::Consumed
            } else {
                Disposition::Dropped
            }
        }
    }

    fn spawn_echo(received: Arc<AtomicUsize>) -> ActorRef {
        ActorCell::spawn(ActorCellArgs {
            behavior: Box::new(Echo { received }),
            clock: VirtualClock::new(),
            scheduler: Arc::new(NoopScheduler),
            running_count: None,
            profiler: Arc::new(NoopProfiler),
            hidden: true,
            detached: false,
        })
    }

    #[test]
    fn enqueue_runs_behaviour_via_scheduler() {
        let received = Arc::new(AtomicUsize::new(0));
        let actor = spawn_echo(received.clone());
        actor.tell(7u32, None);
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn linked_actors_receive_exit_message_on_cleanup() {
        let got_exit = Arc::new(AtomicUsize::new(0));
        let got_exit2 = got_exit.clone();

        struct Watcher {
            got_exit: Arc<AtomicUsize>,
        }
        impl Actor for Watcher {
            fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
                if envelope.payload.is::<ExitMessage>() {
                    self.got_exit.fetch_add(1, Ordering::SeqCst);
                    Disposition::Consumed
                } else {
                    Disposition::Dropped
                }
            }
        }

        let watcher = ActorCell::spawn(ActorCellArgs {
            behavior: Box::new(Watcher { got_exit: got_exit2 }),
            clock: VirtualClock::new(),
            scheduler: Arc::new(NoopScheduler),
            running_count: None,
            profiler: Arc::new(NoopProfiler),
            hidden: true,
            detached: false,
        });
        let received = Arc::new(AtomicUsize::new(0));
        let victim = spawn_echo(received);

        victim.link_to(&watcher);
        victim.cell().cleanup(ExitReason::Normal);

        assert_eq!(got_exit.load(Ordering::SeqCst), 1);
    }
}
