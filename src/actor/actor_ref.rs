//! The actor handle: `ActorRef` shares ownership of the actor body;
//! `WeakActorRef` owns only the control block and must be upgraded before
//! it can be used to reach the body.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::actor::cell::ActorCell;
use crate::attachable::{AttachToken, Attachable};
use crate::envelope::{to_envelope, Envelope, Payload};
use crate::id::ActorAddress;
use crate::message_id::MessageId;

/// A strong, clonable handle to a running actor. Holding one keeps the
/// actor's body (and thus its strong count) alive.
#[derive(Clone)]
pub struct ActorRef {
    pub(crate) cell: Arc<ActorCell>,
}

impl ActorRef {
    pub(crate) fn new(cell: Arc<ActorCell>) -> ActorRef {
        ActorRef { cell }
    }

    pub fn address(&self) -> ActorAddress {
        self.cell.address
    }

    /// Enqueues an already-built envelope. This is the single path every
    /// other send helper, the clock, and remote transports funnel through.
    pub fn enqueue(&self, envelope: Envelope) -> bool {
        self.cell.enqueue(envelope)
    }

    /// Builds and sends an envelope for `msg`, as an alias for mailbox
    /// enqueue.
    pub fn send<T: Any + Send>(&self, sender: Option<ActorRef>, id: MessageId, stages: Vec<ActorRef>, msg: T) -> bool {
        self.enqueue(to_envelope(sender, id, stages, msg))
    }

    /// Fire-and-forget asynchronous send.
    pub fn tell<T: Any + Send>(&self, msg: T, sender: Option<ActorRef>) -> bool {
        self.send(sender, MessageId::ASYNC, Vec::new(), msg)
    }

    pub fn tell_urgent<T: Any + Send>(&self, msg: T, sender: Option<ActorRef>) -> bool {
        self.enqueue(Envelope::new(sender, MessageId::new_urgent_request(), Vec::new(), Payload::new(msg)))
    }

    pub fn attach(&self, callback: Box<dyn Attachable>) -> AttachToken {
        self.cell.attach(callback)
    }

    pub fn detach(&self, token: AttachToken) -> bool {
        self.cell.detach(token)
    }

    /// Links two actors for bidirectional failure propagation. Both cells'
    /// link mutexes are taken together, always in address order,
    /// to avoid deadlocking against a concurrent link/unlink of the same pair
    /// in the opposite direction.
    pub fn link_to(&self, other: &ActorRef) {
        if self.address() == other.address() {
            return;
        }
        let (first, second) = Self::ordered(self, other);
        let mut first_links = first.cell.links.lock();
        let mut second_links = second.cell.links.lock();
        first_links.insert(second.address(), second.downgrade());
        second_links.insert(first.address(), first.downgrade());
    }

    pub fn unlink_from(&self, other: &ActorRef) {
        if self.address() == other.address() {
            return;
        }
        let (first, second) = Self::ordered(self, other);
        let mut first_links = first.cell.links.lock();
        let mut second_links = second.cell.links.lock();
        first_links.remove(&second.address());
        second_links.remove(&first.address());
    }

    fn ordered<'a>(a: &'a ActorRef, b: &'a ActorRef) -> (&'a ActorRef, &'a ActorRef) {
        if a.address().id.raw() <= b.address().id.raw() {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn downgrade(&self) -> WeakActorRef {
        WeakActorRef {
            cell: Arc::downgrade(&self.cell),
            address: self.address(),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.cell.flags.terminated()
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell> {
        &self.cell
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}
impl Eq for ActorRef {}

impl Hash for ActorRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActorRef({})", self.address())
    }
}

/// A weak handle: keeps only the control block alive. Upgrading fails once
/// the strong count has already hit zero.
#[derive(Clone)]
pub struct WeakActorRef {
    cell: Weak<ActorCell>,
    address: ActorAddress,
}

impl WeakActorRef {
    pub(crate) fn new(cell: Weak<ActorCell>, address: ActorAddress) -> WeakActorRef {
        WeakActorRef { cell, address }
    }

    pub fn address(&self) -> ActorAddress {
        self.address
    }

    /// Upgrades to a strong ref. Fails if the strong count has already hit
    /// zero: `Arc`/`Weak`'s own refcount tracks strong/weak ownership
    /// directly, so this is a plain `Weak::upgrade`.
    pub fn upgrade(&self) -> Option<ActorRef> {
        self.cell.upgrade().map(ActorRef::new)
    }
}

impl fmt::Debug for WeakActorRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WeakActorRef({})", self.address)
    }
}
