//! Process-wide actor identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use uuid::Uuid;

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);
static LOCAL_NODE: OnceLock<NodeId> = OnceLock::new();

/// A process-wide unique actor id. `0` is reserved for "invalid".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(u64);

impl ActorId {
    pub const INVALID: ActorId = ActorId(0);

    /// Mints a fresh id. Ids are handed out from a single atomic counter, so
    /// uniqueness holds for the lifetime of the process regardless of how
    /// many actors are ever created or torn down.
    pub fn next() -> ActorId {
        ActorId(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names the host process. A single node id is generated lazily the first
/// time an actor system starts and reused for every actor created in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn local() -> NodeId {
        *LOCAL_NODE.get_or_init(|| NodeId(Uuid::new_v4()))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(id, node)` pair used for equality, hashing, and display of an actor
/// handle independent of the handle's strong/weak flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorAddress {
    pub id: ActorId,
    pub node: NodeId,
}

impl ActorAddress {
    pub fn new(id: ActorId) -> ActorAddress {
        ActorAddress {
            id,
            node: NodeId::local(),
        }
    }

    pub fn invalid() -> ActorAddress {
        ActorAddress {
            id: ActorId::INVALID,
            node: NodeId::local(),
        }
    }
}

impl fmt::Display for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.node)
    }
}
