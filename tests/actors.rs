//! End-to-end actor lifecycle and message dispatch through a real
//! [`ActorSystem`] (§4.4 "Behaviour invocation", §8 scenario 1).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use cascade_actors::actors::*;

struct Counter {
    count: Arc<AtomicUsize>,
    done_at: usize,
    done: mpsc::Sender<()>,
}

impl Actor for Counter {
    fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
        match envelope.payload.downcast_ref::<u32>() {
            Some(_) => {
                let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
                if n == self.done_at {
                    let _ = self.done.send(());
                }
                Disposition::Consumed
            }
            None => Disposition::Dropped,
        }
    }
}

#[test]
fn actor_created_through_the_system_receives_sends() {
    let system = ActorSystem::new();
    let count = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    let actor = system
        .actor_of(
            Box::new(Counter { count: count.clone(), done_at: 3, done: done_tx }),
            SpawnOptions::default(),
        )
        .unwrap();

    actor.tell(1u32, None);
    actor.tell(2u32, None);
    actor.tell(3u32, None);

    done_rx.recv_timeout(Duration::from_secs(2)).expect("counter never reached 3");
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

struct SkipUntilString {
    seen_string: Arc<AtomicUsize>,
    done: mpsc::Sender<()>,
}

impl Actor for SkipUntilString {
    fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
        if let Some(s) = envelope.payload.downcast_ref::<&'static str>() {
            self.seen_string.fetch_add(1, Ordering::SeqCst);
            assert_eq!(*s, "go");
            let _ = self.done.send(());
            Disposition::Consumed
        } else {
            // Not ready for numbers yet: skip, preserving FIFO order among
            // the skipped envelopes (§4.4 "Behaviour invocation").
            Disposition::Skipped
        }
    }
}

#[test]
fn skipped_envelopes_are_restashed_and_retried_later() {
    let system = ActorSystem::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    let actor = system
        .actor_of(
            Box::new(SkipUntilString { seen_string: seen.clone(), done: done_tx }),
            SpawnOptions::default(),
        )
        .unwrap();

    actor.tell(1u32, None);
    actor.tell(2u32, None);
    actor.tell("go", None);

    done_rx.recv_timeout(Duration::from_secs(2)).expect("string envelope never arrived");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

struct SelfStopper {
    stopped: Arc<AtomicUsize>,
}

impl Actor for SelfStopper {
    fn post_stop(&mut self, _reason: &ExitReason) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }

    fn receive(&mut self, ctx: &ActorContext, envelope: &Envelope) -> Disposition {
        if envelope.payload.is::<()>() {
            ctx.stop(ExitReason::Normal);
            Disposition::Consumed
        } else {
            Disposition::Dropped
        }
    }
}

#[test]
fn stopped_actor_closes_its_mailbox_and_rejects_further_sends() {
    let system = ActorSystem::new();
    let stopped = Arc::new(AtomicUsize::new(0));
    let actor = system
        .actor_of(Box::new(SelfStopper { stopped: stopped.clone() }), SpawnOptions::default())
        .unwrap();

    actor.tell((), None);

    for _ in 0..200 {
        if stopped.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(actor.is_terminated());
    assert!(!actor.tell(7u32, None));
}

#[test]
fn duplicate_actor_name_is_rejected() {
    let system = ActorSystem::new();
    let count = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::channel();
    system
        .actor_of(
            Box::new(Counter { count: count.clone(), done_at: usize::MAX, done: tx.clone() }),
            SpawnOptions::named("dup"),
        )
        .unwrap();

    let second = system.actor_of(
        Box::new(Counter { count, done_at: usize::MAX, done: tx }),
        SpawnOptions::named("dup"),
    );
    assert!(second.is_err());
}

#[test]
fn actor_names_are_validated() {
    let system = ActorSystem::new();
    let count = Arc::new(AtomicUsize::new(0));
    let (tx, _rx) = mpsc::channel();

    let new_actor = || {
        Box::new(Counter {
            count: count.clone(),
            done_at: usize::MAX,
            done: tx.clone(),
        })
    };

    assert!(system.actor_of(new_actor(), SpawnOptions::named("valid-name")).is_ok());
    assert!(system.actor_of(new_actor(), SpawnOptions::named("/")).is_err());
    assert!(system.actor_of(new_actor(), SpawnOptions::named("*")).is_err());
    assert!(system.actor_of(new_actor(), SpawnOptions::named("/a/b/c")).is_err());
}
