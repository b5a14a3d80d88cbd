//! The attachable chain: cleanup callbacks invoked exactly once, in
//! registration order, when an actor's cleanup runs.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::ExitReason;

/// A cleanup callback. `FnOnce` rather than `FnMut`: the whole point of the
/// chain is to run each entry exactly once.
pub trait Attachable: Send {
    fn detach(self: Box<Self>, reason: &ExitReason);
}

impl<F: FnOnce(&ExitReason) + Send> Attachable for F {
    fn detach(self: Box<Self>, reason: &ExitReason) {
        (*self)(reason)
    }
}

/// Token returned by [`Attachables::attach`], usable to cancel before
/// cleanup runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachToken(u64);

struct Entry {
    token: AttachToken,
    callback: Box<dyn Attachable>,
}

/// Owned, per-actor list of attachables. Spec describes a singly-linked
/// list; a `Vec` behind a short-held `parking_lot::Mutex` gives the same
/// "invoked exactly once, in registration order" semantics without unsafe
/// intrusive-list bookkeeping.
#[derive(Default)]
pub struct Attachables {
    entries: Mutex<Vec<Entry>>,
    next_token: AtomicU64,
    ran: std::sync::atomic::AtomicBool,
}

impl Attachables {
    pub fn new() -> Attachables {
        Attachables::default()
    }

    pub fn attach(&self, callback: Box<dyn Attachable>) -> AttachToken {
        let token = AttachToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Entry { token, callback });
        token
    }

    /// Removes a callback before it has run. Returns `false` if cleanup
    /// already ran or the token was not found.
    pub fn detach(&self, token: AttachToken) -> bool {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|e| e.token == token) {
            entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Invokes every remaining attachable with `reason`, in registration
    /// order, then clears the list. Idempotent: a second call is a no-op.
    pub fn cleanup(&self, reason: &ExitReason) {
        if self.ran.swap(true, Ordering::AcqRel) {
            return;
        }
        let entries = std::mem::take(&mut *self.entries.lock());
        for entry in entries {
            entry.callback.detach(reason);
        }
    }
}
