//! Delayed and periodic message delivery through an [`ActorSystem`]'s real
//! clock, and the virtual clock's deterministic equivalent (§4.7, §8
//! scenarios 4 and 6).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cascade_actors::actors::*;
use cascade_actors::clock::virtual_clock::VirtualClock;
use cascade_actors::envelope::to_envelope;

struct Pinged {
    hits: Arc<AtomicUsize>,
    done: mpsc::Sender<()>,
}

impl Actor for Pinged {
    fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
        if envelope.payload.is::<&'static str>() {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let _ = self.done.send(());
            Disposition::Consumed
        } else {
            Disposition::Dropped
        }
    }
}

#[test]
fn scheduled_message_is_delivered_once_after_the_delay() {
    let system = ActorSystem::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();
    let actor = system
        .actor_of(Box::new(Pinged { hits: hits.clone(), done: done_tx }), SpawnOptions::default())
        .unwrap();

    let envelope = to_envelope(None, MessageId::ASYNC, Vec::new(), "ping");
    // Not yet due: nothing should arrive before the delay elapses.
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    system
        .clock()
        .schedule_message_in(Duration::from_millis(20), ScheduleTarget::Strong(actor), envelope);

    done_rx.recv_timeout(Duration::from_millis(200)).expect("scheduled message never arrived");
    assert!(hits.load(Ordering::SeqCst) >= 1);
}

#[test]
fn scheduled_message_to_a_dropped_actor_is_silently_skipped() {
    let system = ActorSystem::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let (done_tx, _done_rx) = mpsc::channel();
    let weak = {
        let actor = system
            .actor_of(Box::new(Pinged { hits: hits.clone(), done: done_tx }), SpawnOptions::default())
            .unwrap();
        actor.downgrade()
        // `actor` (the only strong ref) is dropped here, along with the
        // system's internal weak registry entry once cleanup runs.
    };
    assert!(weak.upgrade().is_none() || weak.upgrade().map(|r| r.is_terminated()).unwrap_or(true));

    let envelope = to_envelope(None, MessageId::ASYNC, Vec::new(), "ping");
    // Scheduling against a target that can no longer be upgraded must not
    // panic; it is simply dropped when the clock fires it (§4.7 "a scheduled
    // message whose target has already been dropped is silently skipped").
    system
        .clock()
        .schedule_message_in(Duration::from_millis(10), ScheduleTarget::Weak(weak), envelope);

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn virtual_clock_delivers_a_scheduled_message_only_once_advanced_past_due() {
    let system = ActorSystem::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let (done_tx, _done_rx) = mpsc::channel();
    let actor = system
        .actor_of(Box::new(Pinged { hits: hits.clone(), done: done_tx }), SpawnOptions::default())
        .unwrap();

    let clock = VirtualClock::new();
    let t0 = clock.now();
    assert_eq!(t0, TimePoint::from_nanos(1));

    let envelope = to_envelope(None, MessageId::ASYNC, Vec::new(), "ping");
    clock.schedule_message_at(t0.checked_add(Duration::from_secs(5)), ScheduleTarget::Strong(actor.clone()), envelope);

    assert_eq!(clock.advance_time(Duration::from_secs(1)), 0);
    assert_eq!(clock.advance_time(Duration::from_secs(4)), 1);

    for _ in 0..200 {
        if hits.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
