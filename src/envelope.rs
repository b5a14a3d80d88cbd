//! The message envelope: the unit of transport between actors.

use std::any::Any;
use std::fmt;
use std::mem;
use std::time::Instant;

use crate::actor::actor_ref::ActorRef;
use crate::message_id::MessageId;

/// An opaque, type-erased payload. The core never inspects the bytes; it
/// only needs the concrete type to be movable and, for the remote
/// marshalling seam, to expose a type name and size.
pub struct Payload {
    value: Box<dyn Any + Send>,
    type_name: &'static str,
    size: usize,
}

impl Payload {
    pub fn new<T: Any + Send>(value: T) -> Payload {
        Payload {
            type_name: std::any::type_name::<T>(),
            size: mem::size_of::<T>(),
            value: Box::new(value),
        }
    }

    pub fn downcast<T: Any + Send>(self) -> Result<T, Payload> {
        let type_name = self.type_name;
        let size = self.size;
        match self.value.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(boxed) => Err(Payload { value: boxed, type_name, size }),
        }
    }

    pub fn is<T: Any + Send>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any + Send>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Type name captured at construction time, exposed for the remote
    /// marshalling seam; the core itself never reads it.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Size in bytes of the concrete payload type, captured at construction
    /// time, exposed for the same seam.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Payload(..)")
    }
}

/// A message in transit: sender, message id, forwarding stack, opaque
/// payload, and an enqueue timestamp.
///
/// Envelopes are immovable once enqueued and uniquely owned: a sender hands
/// one off to a mailbox, which hands it off to whichever worker is running
/// the receiving actor.
#[derive(Debug)]
pub struct Envelope {
    pub sender: Option<ActorRef>,
    pub message_id: MessageId,
    /// Forwarding stack: intermediate receivers a reply should visit before
    /// reaching the ultimate requester. Popped from the back (the top of the
    /// stack is the *next* hop).
    pub stages: Vec<ActorRef>,
    pub payload: Payload,
    pub enqueued_at: Instant,
}

impl Envelope {
    pub fn new(sender: Option<ActorRef>, message_id: MessageId, stages: Vec<ActorRef>, payload: Payload) -> Envelope {
        Envelope {
            sender,
            message_id,
            stages,
            payload,
            enqueued_at: Instant::now(),
        }
    }

    pub fn asynchronous(sender: Option<ActorRef>, payload: Payload) -> Envelope {
        Envelope::new(sender, MessageId::ASYNC, Vec::new(), payload)
    }

    /// Pops the next forwarding hop, if any.
    pub fn pop_stage(&mut self) -> Option<ActorRef> {
        self.stages.pop()
    }
}

pub fn to_envelope<T: Any + Send>(sender: Option<ActorRef>, message_id: MessageId, stages: Vec<ActorRef>, msg: T) -> Envelope {
    Envelope::new(sender, message_id, stages, Payload::new(msg))
}
