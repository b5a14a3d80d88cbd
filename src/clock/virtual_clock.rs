//! The deterministic test clock: a virtual `current_time` advanced
//! explicitly by the test, with no real waiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Action, ActorClock, Disposable, Entry, Periodic, ScheduleTarget, StallPolicy, TimePoint};
use crate::envelope::Envelope;

/// Starts one nanosecond after the epoch, matching the source's virtual
/// clock initial value.
const INITIAL_OFFSET_NANOS: u128 = 1;

pub struct VirtualClock {
    state: Mutex<VirtualState>,
}

struct VirtualState {
    current: TimePoint,
    entries: Vec<Entry>,
}

impl VirtualClock {
    pub fn new() -> Arc<VirtualClock> {
        Arc::new(VirtualClock {
            state: Mutex::new(VirtualState {
                current: TimePoint::from_nanos(INITIAL_OFFSET_NANOS),
                entries: Vec::new(),
            }),
        })
    }

    /// Advances the virtual clock by `d` and fires every entry whose due
    /// time has now passed, in due-time order. Returns the number of
    /// entries fired.
    pub fn advance_time(&self, d: Duration) -> usize {
        let mut state = self.state.lock().unwrap();
        state.current = state.current.checked_add(d);
        self.drain_due(&mut state)
    }

    /// Fires the single next entry regardless of its due time, bumping
    /// `current_time` forward if needed. Returns whether anything fired.
    pub fn trigger_timeout(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.entries.sort_by(|a, b| a.due.cmp(&b.due).then(a.seq.cmp(&b.seq)));
        if state.entries.is_empty() {
            return false;
        }
        let due = state.entries[0].due;
        if due > state.current {
            state.current = due;
        }
        self.fire_one(&mut state);
        true
    }

    /// Fires every entry currently pending, including ones not yet due.
    pub fn trigger_timeouts(&self) -> usize {
        let mut n = 0;
        while self.trigger_timeout() {
            n += 1;
        }
        n
    }

    pub fn has_pending_timeout(&self) -> bool {
        !self.state.lock().unwrap().entries.is_empty()
    }

    fn drain_due(&self, state: &mut VirtualState) -> usize {
        let mut n = 0;
        loop {
            state.entries.sort_by(|a, b| a.due.cmp(&b.due).then(a.seq.cmp(&b.seq)));
            match state.entries.first() {
                Some(head) if head.due <= state.current => {
                    self.fire_one(state);
                    n += 1;
                }
                _ => break,
            }
        }
        n
    }

    fn fire_one(&self, state: &mut VirtualState) {
        let entry = state.entries.remove(0);
        let Entry { due: _, seq: _, disposable, action, periodic } = entry;
        if disposable.is_disposed() {
            return;
        }
        match periodic {
            None => {
                crate::clock::fire(action, None);
            }
            Some(periodic) => {
                let dispose = crate::clock::fire(action, Some(periodic.policy));
                if dispose {
                    disposable.dispose();
                }
                if dispose || disposable.is_disposed() {
                    return;
                }
                let next_due = state.current.checked_add(periodic.period);
                let next_action = (periodic.rebuild)();
                state.entries.push(Entry {
                    due: next_due,
                    seq: crate::clock::next_seq(),
                    disposable,
                    action: next_action,
                    periodic: Some(periodic),
                });
            }
        }
    }

    fn push(&self, entry: Entry) {
        self.state.lock().unwrap().entries.push(entry);
    }
}

impl ActorClock for VirtualClock {
    fn now(&self) -> TimePoint {
        self.state.lock().unwrap().current
    }

    fn schedule_at(&self, at: TimePoint, action: Box<dyn FnOnce() + Send>) -> Disposable {
        let disposable = Disposable::new();
        self.push(Entry {
            due: at,
            seq: crate::clock::next_seq(),
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
            seq: crate::clock::next_seq(),
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
            seq: crate::clock::next_seq(),
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
            seq: crate::clock::next_seq(),
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn advance_time_fires_due_actions_and_clears_pending() {
        let clock = VirtualClock::new();
        let t0 = clock.now();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        clock.schedule_at(t0.checked_add(Duration::from_secs(10)), Box::new(move || fired2.store(true, Ordering::SeqCst)));

        let n = clock.advance_time(Duration::from_secs(10));
        assert_eq!(n, 1);
        assert!(fired.load(Ordering::SeqCst));
        assert!(!clock.has_pending_timeout());
    }

    #[test]
    fn disposed_entry_is_skipped() {
        let clock = VirtualClock::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let d = clock.schedule_at(clock.now().checked_add(Duration::from_secs(1)), Box::new(move || fired2.store(true, Ordering::SeqCst)));
        d.dispose();
        clock.advance_time(Duration::from_secs(1));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn trigger_timeout_fires_next_regardless_of_time() {
        let clock = VirtualClock::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        clock.schedule_at(clock.now().checked_add(Duration::from_secs(1000)), Box::new(move || fired2.store(true, Ordering::SeqCst)));
        assert!(clock.trigger_timeout());
        assert!(fired.load(Ordering::SeqCst));
    }
}
