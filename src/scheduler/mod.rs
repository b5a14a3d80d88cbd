//! The worker pool: a shared run queue of resumables serviced by `N` worker
//! threads under a cooperative quantum, plus dedicated threads for detached
//! actors.

pub mod affinity;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::actor::actor_ref::ActorRef;
use crate::resumable::{ResumeResult, Resumable, SchedulerHandle};
use crate::scheduler::affinity::AffinityAssigner;

/// Options read once at `Scheduler::start`.
pub struct SchedulerConfig {
    pub workers: usize,
    pub max_throughput: usize,
    pub worker_affinity: AffinityAssigner,
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            workers: num_cpus::get(),
            max_throughput: 50,
            worker_affinity: AffinityAssigner::new(Vec::new()),
        }
    }
}

/// A poison pill: the scheduler's way of telling a worker to exit. This is
/// the one place this crate uses `ResumeResult::ShutdownExecutionUnit`.
struct StopToken;

impl Resumable for StopToken {
    fn resume(self: Arc<Self>, _max_throughput: usize) -> ResumeResult {
        ResumeResult::ShutdownExecutionUnit
    }
}

/// The shared-queue worker pool. `enqueue`/`submit` is non-blocking and
/// thread-safe; eventually some worker calls `resume` on the submitted
/// resumable.
pub struct Scheduler {
    sender: Sender<Arc<dyn Resumable>>,
    max_throughput: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn start(config: SchedulerConfig) -> Arc<Scheduler> {
        let (sender, receiver) = unbounded();
        let affinity = Arc::new(config.worker_affinity);
        let scheduler = Arc::new(Scheduler {
            sender,
            max_throughput: config.max_throughput,
            workers: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let receiver = receiver.clone();
            let resubmit = scheduler.sender.clone();
            let max_throughput = config.max_throughput;
            let affinity = affinity.clone();
            let handle = thread::Builder::new()
                .name(format!("actor-worker-{index}"))
                .spawn(move || {
                    pin_current_thread(affinity.next_group());
                    worker_loop(receiver, resubmit, max_throughput);
                })
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        *scheduler.workers.lock() = handles;
        scheduler
    }

    pub fn max_throughput(&self) -> usize {
        self.max_throughput
    }

    /// Broadcasts a stop token to every worker and joins their threads.
    /// Resumables still queued behind the tokens are simply never run;
    /// actors are expected to have been given the chance to finish via the
    /// shutdown barrier (`ActorSystem::await_all_actors_done`) beforehand.
    pub fn stop(&self) {
        let worker_count = self.workers.lock().len();
        debug!(worker_count, "scheduler: broadcasting stop tokens");
        for _ in 0..worker_count {
            let _ = self.sender.send(Arc::new(StopToken));
        }
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl SchedulerHandle for Scheduler {
    fn submit(&self, resumable: Arc<dyn Resumable>) {
        if self.sender.send(resumable).is_err() {
            warn!("scheduler: submit after shutdown, resumable dropped");
        }
    }
}

fn worker_loop(receiver: Receiver<Arc<dyn Resumable>>, resubmit: Sender<Arc<dyn Resumable>>, max_throughput: usize) {
    while let Ok(resumable) = receiver.recv() {
        match resumable.resume(max_throughput) {
            ResumeResult::ResumeLater => {
                if resubmit.send(resumable).is_err() {
                    break;
                }
            }
            ResumeResult::AwaitingMessage | ResumeResult::Done => {}
            ResumeResult::ShutdownExecutionUnit => break,
        }
    }
}

/// A `SchedulerHandle` that unparks one dedicated OS thread rather than
/// pushing to the shared run queue, used for `detached` actors (they bypass
/// the pool entirely).
struct DetachedHandle {
    thread: Thread,
    pending: AtomicBool,
}

impl SchedulerHandle for DetachedHandle {
    fn submit(&self, _resumable: Arc<dyn Resumable>) {
        self.pending.store(true, Ordering::SeqCst);
        self.thread.unpark();
    }
}

/// Spawns a dedicated thread for a detached actor, running `build` on that
/// thread to construct the cell (so its `DetachedHandle` can unpark the
/// right thread), then looping `resume` with an unbounded quantum for the
/// life of the actor.
pub fn spawn_detached<F>(label: impl Into<String>, core_group: Option<std::collections::BTreeSet<usize>>, build: F) -> ActorRef
where
    F: FnOnce(Arc<dyn SchedulerHandle>) -> ActorRef + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    let label = label.into();
    thread::Builder::new()
        .name(label)
        .spawn(move || {
            pin_current_thread(core_group.as_ref());
            let handle = Arc::new(DetachedHandle {
                thread: thread::current(),
                pending: AtomicBool::new(false),
            });
            let actor_ref = build(handle.clone());
            let resumable: Arc<dyn Resumable> = actor_ref.cell().clone();
            if tx.send(actor_ref).is_err() {
                return;
            }
            loop {
                handle.pending.store(false, Ordering::SeqCst);
                match resumable.clone().resume(usize::MAX) {
                    ResumeResult::AwaitingMessage => {
                        if !handle.pending.load(Ordering::SeqCst) {
                            thread::park();
                        }
                    }
                    ResumeResult::ResumeLater => continue,
                    ResumeResult::Done | ResumeResult::ShutdownExecutionUnit => break,
                }
            }
            trace!("detached actor thread exiting");
        })
        .expect("failed to spawn detached actor thread");
    rx.recv().expect("detached actor thread died before registering")
}

fn pin_current_thread(group: Option<&std::collections::BTreeSet<usize>>) {
    let Some(group) = group else {
        return;
    };
    let Some(core_ids) = core_affinity::get_core_ids() else {
        return;
    };
    match core_ids.into_iter().find(|c| group.contains(&c.id)) {
        Some(core_id) => {
            if !core_affinity::set_for_current(core_id) {
                warn!(core = core_id.id, "failed to pin thread to requested core");
            }
        }
        None => warn!("none of this thread's configured cores are available on this host"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingResumable {
        remaining: AtomicUsize,
        seen: Arc<AtomicUsize>,
    }

    impl Resumable for CountingResumable {
        fn resume(self: Arc<Self>, _max_throughput: usize) -> ResumeResult {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.remaining.fetch_sub(1, Ordering::SeqCst) > 1 {
                ResumeResult::ResumeLater
            } else {
                ResumeResult::Done
            }
        }
    }

    #[test]
    fn resume_later_gets_rerun_until_done() {
        let scheduler = Scheduler::start(SchedulerConfig {
            workers: 2,
            max_throughput: 10,
            worker_affinity: AffinityAssigner::new(Vec::new()),
        });
        let seen = Arc::new(AtomicUsize::new(0));
        let resumable = Arc::new(CountingResumable {
            remaining: AtomicUsize::new(3),
            seen: seen.clone(),
        });
        scheduler.submit(resumable);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        scheduler.stop();
    }
}
