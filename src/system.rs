//! `ActorSystem`: wires the scheduler, the clock, the shutdown barrier, and
//! the optional profiler together, and is the one place user code spawns
//! actors from.

use std::sync::Arc;

use dashmap::mapref::entry::Entry as DashEntry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::actor::actor_ref::{ActorRef, WeakActorRef};
use crate::actor::cell::{ActorCell, ActorCellArgs};
use crate::actor::Actor;
use crate::clock::{ActorClock, RealClock, TimePoint};
use crate::config::RuntimeConfig;
use crate::error::{ExitReason, RuntimeError};
use crate::id::ActorAddress;
use crate::profiler::{NoopProfiler, Profiler};
use crate::resumable::SchedulerHandle;
use crate::scheduler::affinity::AffinityAssigner;
use crate::scheduler::{self, Scheduler};
use crate::validate;

/// The shutdown barrier: the count of non-hidden registered actors currently
/// alive. `ActorSystem::await_all_actors_done` blocks on this reaching zero.
pub struct RunningCount {
    count: Mutex<usize>,
    idle: Condvar,
}

impl RunningCount {
    pub fn new() -> Arc<RunningCount> {
        Arc::new(RunningCount {
            count: Mutex::new(0),
            idle: Condvar::new(),
        })
    }

    pub fn increment(&self) {
        *self.count.lock() += 1;
    }

    pub fn decrement(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "running count underflow");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    pub fn get(&self) -> usize {
        *self.count.lock()
    }

    pub fn wait_until_zero(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// Inputs to [`ActorSystem::actor_of`]: an optional diagnostic name
/// (validated with the same rules as the teacher's path segments), and the
/// `hidden`/`detached` flags.
#[derive(Default, Clone)]
pub struct SpawnOptions {
    pub name: Option<String>,
    pub hidden: bool,
    pub detached: bool,
}

impl SpawnOptions {
    pub fn named(name: impl Into<String>) -> SpawnOptions {
        SpawnOptions {
            name: Some(name.into()),
            ..SpawnOptions::default()
        }
    }

    pub fn hidden(mut self) -> SpawnOptions {
        self.hidden = true;
        self
    }

    pub fn detached(mut self) -> SpawnOptions {
        self.detached = true;
        self
    }
}

/// Builds an [`ActorSystem`] with an optional explicit configuration and
/// profiler, mirroring the teacher's `SystemBuilder`.
pub struct ActorSystemBuilder {
    config: RuntimeConfig,
    profiler: Arc<dyn Profiler>,
}

impl ActorSystemBuilder {
    pub fn new() -> ActorSystemBuilder {
        ActorSystemBuilder {
            config: RuntimeConfig::load(),
            profiler: Arc::new(NoopProfiler),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> ActorSystemBuilder {
        self.config = config;
        self
    }

    pub fn profiler(mut self, profiler: Arc<dyn Profiler>) -> ActorSystemBuilder {
        self.profiler = profiler;
        self
    }

    pub fn create(self) -> ActorSystem {
        ActorSystem::build(self.config, self.profiler)
    }
}

impl Default for ActorSystemBuilder {
    fn default() -> ActorSystemBuilder {
        ActorSystemBuilder::new()
    }
}

/// The process-local runtime: one scheduler, one clock, one shutdown
/// barrier, one address/name registry. Cloning an [`ActorRef`] obtained
/// from it keeps the actor's body alive independent of the system.
pub struct ActorSystem {
    clock: Arc<dyn ActorClock>,
    scheduler: Arc<Scheduler>,
    running_count: Arc<RunningCount>,
    registry: Arc<DashMap<ActorAddress, WeakActorRef>>,
    names: Arc<DashMap<String, ActorAddress>>,
    profiler: Arc<dyn Profiler>,
    detached_affinity: AffinityAssigner,
    config: RuntimeConfig,
}

impl ActorSystem {
    /// Builds a system from configuration loaded via [`RuntimeConfig::load`].
    pub fn new() -> ActorSystem {
        ActorSystemBuilder::new().create()
    }

    pub fn with_config(config: RuntimeConfig) -> ActorSystem {
        ActorSystemBuilder::new().config(config).create()
    }

    pub fn builder() -> ActorSystemBuilder {
        ActorSystemBuilder::new()
    }

    fn build(config: RuntimeConfig, profiler: Arc<dyn Profiler>) -> ActorSystem {
        let scheduler = Scheduler::start(config.scheduler_config());
        let clock = RealClock::start();
        let detached_affinity = config.detached_affinity();
        ActorSystem {
            clock,
            scheduler,
            running_count: RunningCount::new(),
            registry: Arc::new(DashMap::new()),
            names: Arc::new(DashMap::new()),
            profiler,
            detached_affinity,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn now(&self) -> TimePoint {
        self.clock.now()
    }

    pub fn clock(&self) -> &Arc<dyn ActorClock> {
        &self.clock
    }

    /// Spawns an actor. On success, registers it under its address (and
    /// name, if any) for [`ActorSystem::lookup`] / [`ActorSystem::lookup_by_name`],
    /// and arranges for both entries to be dropped when the actor cleans up.
    pub fn actor_of(&self, behavior: Box<dyn Actor>, opts: SpawnOptions) -> Result<ActorRef, RuntimeError> {
        if let Some(name) = &opts.name {
            validate::validate_name(name).map_err(|e| RuntimeError::CreateFailed(e.to_string()))?;
        }

        // Reserve the name before spawning anything, so a collision never
        // leaves an orphaned actor behind.
        if let Some(name) = &opts.name {
            match self.names.entry(name.clone()) {
                DashEntry::Occupied(_) => {
                    return Err(RuntimeError::CreateFailed(format!("actor name \"{name}\" is already registered")))
                }
                DashEntry::Vacant(slot) => {
                    slot.insert(ActorAddress::invalid());
                }
            }
        }

        let actor_ref = if opts.detached {
            self.spawn_detached(behavior, opts.hidden)
        } else {
            ActorCell::spawn(ActorCellArgs {
                behavior,
                clock: self.clock.clone(),
                scheduler: self.scheduler.clone() as Arc<dyn SchedulerHandle>,
                running_count: Some(self.running_count.clone()),
                profiler: self.profiler.clone(),
                hidden: opts.hidden,
                detached: false,
            })
        };

        let address = actor_ref.address();
        if let Some(name) = &opts.name {
            self.names.insert(name.clone(), address);
        }
        self.registry.insert(address, actor_ref.downgrade());

        let registry = self.registry.clone();
        let names = self.names.clone();
        let name = opts.name;
        actor_ref.attach(Box::new(move |_reason: &ExitReason| {
            registry.remove(&address);
            if let Some(name) = &name {
                names.remove(name);
            }
        }));

        Ok(actor_ref)
    }

    fn spawn_detached(&self, behavior: Box<dyn Actor>, hidden: bool) -> ActorRef {
        let clock = self.clock.clone();
        let running_count = self.running_count.clone();
        let profiler = self.profiler.clone();
        let core_group = self.detached_affinity.next_group().cloned();
        scheduler::spawn_detached("actor-detached", core_group, move |handle| {
            ActorCell::spawn(ActorCellArgs {
                behavior,
                clock,
                scheduler: handle,
                running_count: Some(running_count),
                profiler,
                hidden,
                detached: true,
            })
        })
    }

    pub fn lookup(&self, address: ActorAddress) -> Option<ActorRef> {
        self.registry.get(&address).and_then(|weak| weak.upgrade())
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<ActorRef> {
        let address = *self.names.get(name)?;
        self.lookup(address)
    }

    /// Count of non-hidden registered actors currently alive.
    pub fn running_actor_count(&self) -> usize {
        self.running_count.get()
    }

    /// Blocks until the shutdown barrier reaches zero.
    pub fn await_all_actors_done(&self) {
        self.running_count.wait_until_zero();
    }

    /// Stops the worker pool and the clock thread. Idempotent.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        self.clock.stop();
    }
}

impl Default for ActorSystem {
    fn default() -> ActorSystem {
        ActorSystem::new()
    }
}

impl Drop for ActorSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorContext, Disposition};
    use crate::envelope::Envelope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter {
        seen: Arc<AtomicUsize>,
    }

    impl Actor for Counter {
        fn receive(&mut self, _ctx: &ActorContext, envelope: &Envelope) -> Disposition {
            if envelope.payload.is::<u32>() {
                self.seen.fetch_add(1, Ordering::SeqCst);
                Disposition::Consumed
            } else {
                Disposition::Dropped
            }
        }
    }

    #[test]
    fn actor_of_registers_by_address_and_name() {
        let system = ActorSystem::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let actor = system
            .actor_of(Box::new(Counter { seen: seen.clone() }), SpawnOptions::named("counter"))
            .unwrap();

        assert!(system.lookup(actor.address()).is_some());
        assert_eq!(system.lookup_by_name("counter").unwrap().address(), actor.address());

        actor.tell(7u32, None);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let system = ActorSystem::new();
        let seen = Arc::new(AtomicUsize::new(0));
        system
            .actor_of(Box::new(Counter { seen: seen.clone() }), SpawnOptions::named("dup"))
            .unwrap();
        let second = system.actor_of(Box::new(Counter { seen }), SpawnOptions::named("dup"));
        assert!(second.is_err());
    }

    #[test]
    fn shutdown_barrier_reaches_zero_after_actor_stops() {
        let system = ActorSystem::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let actor = system.actor_of(Box::new(Counter { seen }), SpawnOptions::default()).unwrap();
        assert_eq!(system.running_actor_count(), 1);
        actor.cell().cleanup(ExitReason::Normal);
        assert_eq!(system.running_actor_count(), 0);
        system.await_all_actors_done();
    }

    #[test]
    fn hidden_actor_is_not_counted_by_the_shutdown_barrier() {
        let system = ActorSystem::new();
        let seen = Arc::new(AtomicUsize::new(0));
        system
            .actor_of(Box::new(Counter { seen }), SpawnOptions::default().hidden())
            .unwrap();
        assert_eq!(system.running_actor_count(), 0);
    }
}
