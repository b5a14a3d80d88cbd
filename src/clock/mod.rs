//! The actor clock: a monotonic timer service delivering scheduled actions
//! and delayed messages.

pub mod virtual_clock;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::actor::actor_ref::{ActorRef, WeakActorRef};
use crate::envelope::{Envelope, Payload};
use crate::error::{ErrorResponse, ExitReasonTag};
use crate::message_id::MessageId;

/// A synthetic point in time, independent of the wall clock so the virtual
/// test clock can mint values that do not correspond to any real instant.
/// Nanoseconds since the owning clock's epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimePoint(u128);

impl TimePoint {
    pub const EPOCH: TimePoint = TimePoint(0);

    pub fn from_nanos(n: u128) -> TimePoint {
        TimePoint(n)
    }

    pub fn checked_add(self, d: Duration) -> TimePoint {
        TimePoint(self.0 + d.as_nanos())
    }

    pub fn saturating_sub(self, other: TimePoint) -> Duration {
        if self.0 <= other.0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.0 - other.0).min(u64::MAX as u128) as u64)
        }
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t+{}ns", self.0)
    }
}

/// Stall policy for periodic scheduling against a target actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallPolicy {
    /// Dispose the action and send an error to the target.
    Fail,
    /// Silently skip missed ticks.
    Skip,
}

/// A cancellation handle. Disposing is idempotent and thread-safe and never
/// interrupts an execution already in flight.
#[derive(Clone)]
pub struct Disposable(Arc<AtomicBool>);

impl Disposable {
    fn new() -> Disposable {
        Disposable(Arc::new(AtomicBool::new(false)))
    }

    pub fn dispose(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Disposable(disposed={})", self.is_disposed())
    }
}

/// Either flavor of reference a scheduled message may hold onto its target
/// with.
#[derive(Clone)]
pub enum ScheduleTarget {
    Strong(ActorRef),
    Weak(WeakActorRef),
}

impl ScheduleTarget {
    fn resolve(&self) -> Option<ActorRef> {
        match self {
            ScheduleTarget::Strong(r) => Some(r.clone()),
            ScheduleTarget::Weak(w) => w.upgrade(),
        }
    }
}

pub(crate) enum Action {
    Bare(Box<dyn FnOnce() + Send>),
    Message { target: ScheduleTarget, envelope: Envelope },
}

pub(crate) struct Periodic {
    period: Duration,
    policy: StallPolicy,
    /// Rebuilds the next tick's action. `None` for one-shot entries.
    rebuild: Box<dyn Fn() -> Action + Send>,
}

pub(crate) struct Entry {
    due: TimePoint,
    seq: u64,
    disposable: Disposable,
    action: Action,
    periodic: Option<Periodic>,
}

/// Common scheduling surface shared by the real and virtual clocks.
pub trait ActorClock: Send + Sync {
    fn now(&self) -> TimePoint;

    fn schedule_at(&self, at: TimePoint, action: Box<dyn FnOnce() + Send>) -> Disposable;

    fn schedule_message_at(&self, at: TimePoint, target: ScheduleTarget, envelope: Envelope) -> Disposable;

    fn schedule_periodically(&self, first_run: TimePoint, period: Duration, action: Arc<dyn Fn() + Send + Sync>) -> Disposable;

    fn schedule_message_periodically(
        &self,
        first_run: TimePoint,
        period: Duration,
        policy: StallPolicy,
        target: ScheduleTarget,
        build: Arc<dyn Fn() -> Envelope + Send + Sync>,
    ) -> Disposable;

    /// Convenience: schedule relative to `now()`.
    fn schedule_in(&self, delay: Duration, action: Box<dyn FnOnce() + Send>) -> Disposable {
        self.schedule_at(self.now().checked_add(delay), action)
    }

    fn schedule_message_in(&self, delay: Duration, target: ScheduleTarget, envelope: Envelope) -> Disposable {
        self.schedule_message_at(self.now().checked_add(delay), target, envelope)
    }

    /// Stops the clock's background thread, if it has one. A no-op for the
    /// virtual test clock.
    fn stop(&self) {}
}

/// Runs one entry: for a bare action, calls it directly; for a targeted
/// message, resolves the target and enqueues. Returns whether a periodic
/// entry bound to a now-dead weak target should be disposed outright rather
/// than merely skipping this tick.
pub(crate) fn fire(action: Action, policy_for_message: Option<StallPolicy>) -> bool {
    match action {
        Action::Bare(f) => {
            f();
            false
        }
        Action::Message { target, envelope } => match target.resolve() {
            Some(actor_ref) => {
                if !actor_ref.enqueue(envelope) {
                    if let Some(StallPolicy::Fail) = policy_for_message {
                        warn!("actor clock: periodic target's mailbox is closed, disposing timer");
                        let error = Envelope::new(
                            None,
                            MessageId::ASYNC,
                            Vec::new(),
                            Payload::new(ErrorResponse {
                                reason: ExitReasonTag::QueueClosed,
                            }),
                        );
                        let _ = actor_ref.enqueue(error);
                        return true;
                    }
                }
                false
            }
            None => {
                trace!("actor clock: scheduled message's target is gone, dropping");
                matches!(target, ScheduleTarget::Weak(_))
            }
        },
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// The real, wall-clock-backed implementation: a single background thread
/// owns an ordered queue of actions and wakes up exactly when the next one
/// is due.
pub struct RealClock {
    start: Instant,
    state: Mutex<State>,
    condvar: Condvar,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct State {
    entries: Vec<Entry>,
}

impl RealClock {
    pub fn start() -> Arc<RealClock> {
        let clock = Arc::new(RealClock {
            start: Instant::now(),
            state: Mutex::new(State { entries: Vec::new() }),
            condvar: Condvar::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        });
        let worker_clock = clock.clone();
        let handle = thread::Builder::new()
            .name("actor-clock".into())
            .spawn(move || worker_clock.run())
            .expect("failed to spawn actor-clock thread");
        *clock.worker.lock().unwrap() = Some(handle);
        clock
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.condvar.notify_all();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn run(&self) {
        let mut guard = self.state.lock().unwrap();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            guard.entries.sort_by(|a, b| a.due.cmp(&b.due).then(a.seq.cmp(&b.seq)));
            let now = self.now();
            match guard.entries.first() {
                None => {
                    guard = self.condvar.wait(guard).unwrap();
                }
                Some(head) if head.due <= now => {
                    let entry = guard.entries.remove(0);
                    if entry.disposable.is_disposed() {
                        continue;
                    }
                    drop(guard);
                    self.run_entry(entry);
                    guard = self.state.lock().unwrap();
                }
                Some(head) => {
                    let wait_for = head.due.saturating_sub(now);
                    let (g, _timeout) = self.condvar.wait_timeout(guard, wait_for).unwrap();
                    guard = g;
                }
            }
        }
    }

    fn run_entry(&self, entry: Entry) {
        let Entry { due: _, seq: _, disposable, action, periodic } = entry;
        match periodic {
            None => {
                fire(action, None);
            }
            Some(periodic) => {
                let dispose = fire(action, Some(periodic.policy));
                if dispose {
                    disposable.dispose();
                }
                if dispose || disposable.is_disposed() {
                    return;
                }
                let next_due = self.now().checked_add(periodic.period);
                let next_action = (periodic.rebuild)();
                let mut guard = self.state.lock().unwrap();
                guard.entries.push(Entry {
                    due: next_due,
                    seq: next_seq(),
                    disposable,
                    action: next_action,
                    periodic: Some(periodic),
                });
                self.condvar.notify_all();
            }
        }
    }

    fn push(&self, entry: Entry) {
        let mut guard = self.state.lock().unwrap();
        guard.entries.push(entry);
        self.condvar.notify_all();
    }
}

impl ActorClock for RealClock {
    fn now(&self) -> TimePoint {
        TimePoint::from_nanos(self.start.elapsed().as_nanos())
    }

    fn schedule_at(&self, at: TimePoint, action: Box<dyn FnOnce() + Send>) -> Disposable {
        let disposable = Disposable::new();
        self.push(Entry {
            due: at,
            seq: next_seq(),
            disposable: disposable.clone(),
            action: Action::Bare(action),
            periodic: None,
        });
        disposable
    }

    fn schedule_message_at(&self, at: TimePoint, target: ScheduleTarget, envelope: Envelope) -> Disposable {
        let disposable = Disposable::new();
        self.push(Entry {
            due: at,
            seq: next_seq(),
            disposable: disposable.clone(),
            action: Action::Message { target, envelope },
            periodic: None,
        });
        disposable
    }

    fn schedule_periodically(&self, first_run: TimePoint, period: Duration, action: Arc<dyn Fn() + Send + Sync>) -> Disposable {
        let disposable = Disposable::new();
        self.push(Entry {
            due: first_run,
            seq: next_seq(),
            disposable: disposable.clone(),
            action: Action::Bare({
                let action = action.clone();
                Box::new(move || action())
            }),
            periodic: Some(Periodic {
                period,
                policy: StallPolicy::Skip,
                rebuild: Box::new(move || {
                    let action = action.clone();
                    Action::Bare(Box::new(move || action()))
                }),
            }),
        });
        disposable
    }

    fn schedule_message_periodically(
        &self,
        first_run: TimePoint,
        period: Duration,
        policy: StallPolicy,
        target: ScheduleTarget,
        build: Arc<dyn Fn() -> Envelope + Send + Sync>,
    ) -> Disposable {
        let disposable = Disposable::new();
        let first_envelope = build();
        self.push(Entry {
            due: first_run,
            seq: next_seq(),
            disposable: disposable.clone(),
            action: Action::Message {
                target: target.clone(),
                envelope: first_envelope,
            },
            periodic: Some(Periodic {
                period,
                policy,
                rebuild: Box::new({
                    let build = build.clone();
                    let target = target.clone();
                    move || Action::Message {
                        target: target.clone(),
                        envelope: build(),
                    }
                }),
            }),
        });
        disposable
    }

    fn stop(&self) {
        RealClock::stop(self)
    }
}

impl Drop for RealClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::actor_ref::ActorRef;
    use crate::actor::cell::{ActorCell, ActorCellArgs};
    use crate::actor::{Actor, ActorContext, Disposition};
    use crate::profiler::NoopProfiler;
    use crate::resumable::{Resumable, SchedulerHandle};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct InlineScheduler;
    impl SchedulerHandle for InlineScheduler {
        fn submit(&self, resumable: Arc<dyn Resumable>) {
            resumable.resume(50);
        }
    }

    struct Dumb;
    impl Actor for Dumb {
        fn receive(&mut self, _ctx: &ActorContext, _envelope: &Envelope) -> Disposition {
            Disposition::Consumed
        }
    }

    fn spawn_dumb(clock: Arc<dyn ActorClock>) -> ActorRef {
        ActorCell::spawn(ActorCellArgs {
            behavior: Box::new(Dumb),
            clock,
            scheduler: Arc::new(InlineScheduler),
            running_count: None,
            profiler: Arc::new(NoopProfiler),
            hidden: true,
            detached: false,
        })
    }

    #[test]
    fn bare_action_fires_after_delay() {
        let clock = RealClock::start();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        clock.schedule_in(Duration::from_millis(10), Box::new(move || fired2.store(true, Ordering::SeqCst)));
        thread::sleep(Duration::from_millis(60));
        assert!(fired.load(Ordering::SeqCst));
        clock.stop();
    }

    #[test]
    fn disposing_before_due_prevents_the_action() {
        let clock = RealClock::start();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let disposable = clock.schedule_in(Duration::from_millis(30), Box::new(move || fired2.store(true, Ordering::SeqCst)));
        disposable.dispose();
        thread::sleep(Duration::from_millis(80));
        assert!(!fired.load(Ordering::SeqCst));
        clock.stop();
    }

    #[test]
    fn periodic_bare_action_fires_more_than_once() {
        let clock = RealClock::start();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let disposable = clock.schedule_periodically(
            clock.now().checked_add(Duration::from_millis(5)),
            Duration::from_millis(5),
            Arc::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        thread::sleep(Duration::from_millis(60));
        disposable.dispose();
        assert!(count.load(Ordering::SeqCst) >= 2);
        clock.stop();
    }

    #[test]
    fn fail_stall_policy_sends_an_error_to_the_target_and_disposes() {
        let clock = RealClock::start();
        let target = spawn_dumb(clock.clone());
        target.cell().cleanup(crate::error::ExitReason::Normal);

        let disposable = clock.schedule_message_periodically(
            clock.now().checked_add(Duration::from_millis(5)),
            Duration::from_millis(5),
            StallPolicy::Fail,
            ScheduleTarget::Strong(target),
            Arc::new(|| Envelope::asynchronous(None, Payload::new(7u32))),
        );
        thread::sleep(Duration::from_millis(60));
        assert!(disposable.is_disposed(), "fail policy must dispose the timer once the target stalls");
        clock.stop();
    }
}
