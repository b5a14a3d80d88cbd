//! `cascade-actors`: a process-local actor runtime — mailboxes, a
//! cooperative scheduler and an actor clock.

#![deny(clippy::all)]
#![allow(clippy::new_ret_no_self)]
#![allow(clippy::large_enum_variant)]

pub mod actor;
pub mod attachable;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod flags;
pub mod id;
pub mod mailbox;
pub mod message_id;
pub mod profiler;
pub mod resumable;
pub mod scheduler;
pub mod system;

mod validate;

pub use config::load_config;

/// Convenience re-exports for user actor code, mirroring the teacher's
/// `actors` prelude module.
pub mod actors {
    pub use crate::actor::actor_ref::{ActorRef, WeakActorRef};
    pub use crate::actor::cell::ExitMessage;
    pub use crate::actor::{Actor, ActorContext, Disposition};
    pub use crate::attachable::{AttachToken, Attachable};
    pub use crate::clock::{ActorClock, Disposable, ScheduleTarget, StallPolicy, TimePoint};
    pub use crate::envelope::{Envelope, Payload};
    pub use crate::error::{ExitReason, RuntimeError};
    pub use crate::id::{ActorAddress, ActorId, NodeId};
    pub use crate::message_id::{Category, MessageId};
    pub use crate::system::{ActorSystem, ActorSystemBuilder, SpawnOptions};
}
