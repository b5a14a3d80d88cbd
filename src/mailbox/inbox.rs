//! The intrusive MPSC inbox: a lock-free Treiber stack whose head pointer
//! doubles as the mailbox's `empty`/`blocked`/`closed` state.
//!
//! Grounded on the Treiber-stack/node-reversal shape of a lock-free MPSC
//! queue (`synthesizer-io-core::queue`), extended with the three-sentinel
//! state encoding `caf::intrusive::lifo_inbox` uses to fold mailbox state
//! into the same atomic as the data. The original tags sentinels by
//! address-casting the inbox itself (`this`, `this + 1`); to keep that
//! lock-free without reaching for pointer-arithmetic-as-tag UB, this port
//! reserves two private, non-zero-sized marker fields on the inbox and
//! tags with *their* addresses, with `ptr::null_mut()` standing in for
//! `empty`.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::envelope::Envelope;

struct Node {
    envelope: Envelope,
    next: *mut Node,
}

/// Result of [`Inbox::push_front`].
#[derive(Debug)]
pub enum PushOutcome {
    /// Enqueued; the reader was already running.
    Success,
    /// Enqueued; the reader was `blocked` and must be resubmitted to the
    /// scheduler. The pusher that observes this is the unique waker.
    UnblockedReader,
    /// The inbox was closed; the envelope is handed back so the caller can
    /// bounce it.
    Closed(Envelope),
}

/// What the owner leaves behind after reaping the stack with
/// [`Inbox::take_head`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum NewHead {
    Empty,
    Closed,
}

/// A single-consumer, multi-producer LIFO stack of envelopes with a
/// tri-state head: `empty`, `blocked`, or `closed`, plus the real stack top
/// when non-empty.
pub struct Inbox {
    head: AtomicPtr<Node>,
    empty_tag: u8,
    blocked_tag: u8,
    closed_tag: u8,
}

// The Node chain is only ever walked by the single owning thread (via
// `take_head`); producers only ever CAS the head and never dereference
// `next` of a node they did not just allocate.
unsafe impl Send for Inbox {}
unsafe impl Sync for Inbox {}

impl Inbox {
    pub fn new() -> Inbox {
        let inbox = Inbox {
            head: AtomicPtr::new(ptr::null_mut()),
            empty_tag: 0,
            blocked_tag: 0,
            closed_tag: 0,
        };
        inbox.head.store(inbox.empty(), Ordering::Relaxed);
        inbox
    }

    fn empty(&self) -> *mut Node {
        &self.empty_tag as *const u8 as *mut Node
    }

    fn blocked(&self) -> *mut Node {
        &self.blocked_tag as *const u8 as *mut Node
    }

    fn closed(&self) -> *mut Node {
        &self.closed_tag as *const u8 as *mut Node
    }

    fn is_sentinel(&self, p: *mut Node) -> bool {
        p == self.empty() || p == self.blocked() || p == self.closed()
    }

    /// Pushes a new envelope onto the stack. Fails with [`PushOutcome::Closed`]
    /// if the inbox has already been closed.
    pub fn push_front(&self, envelope: Envelope) -> PushOutcome {
        let node = Box::into_raw(Box::new(Node {
            envelope,
            next: ptr::null_mut(),
        }));
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == self.closed() {
                // SAFETY: we just allocated `node` and nobody else has seen it.
                let node = unsafe { Box::from_raw(node) };
                return PushOutcome::Closed(node.envelope);
            }
            let next = if self.is_sentinel(head) { ptr::null_mut() } else { head };
            unsafe {
                (*node).next = next;
            }
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) if head == self.blocked() => return PushOutcome::UnblockedReader,
                Ok(_) => return PushOutcome::Success,
                Err(_) => continue,
            }
        }
    }

    /// Single-consumer: atomically swaps the head to `new_head` and returns
    /// the previously pending stack, oldest push last (i.e. LIFO order).
    /// Callers that need FIFO order must reverse the result.
    ///
    /// # Safety contract
    /// Only the owning actor may call this.
    pub fn take_head(&self, new_head: NewHead) -> Vec<Envelope> {
        let replacement = match new_head {
            NewHead::Empty => self.empty(),
            NewHead::Closed => self.closed(),
        };
        let mut head = self.head.swap(replacement, Ordering::AcqRel);
        let mut popped = Vec::new();
        while !self.is_sentinel(head) {
            // SAFETY: nodes are only ever constructed by `push_front` and
            // handed to exactly one `take_head` call via the swapped head.
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
            popped.push(node.envelope);
        }
        popped
    }

    /// CAS `empty -> blocked`. Only the owner calls this.
    pub fn try_block(&self) -> bool {
        self.head
            .compare_exchange(self.empty(), self.blocked(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// CAS `blocked -> empty`. Only the owner calls this.
    pub fn try_unblock(&self) -> bool {
        self.head
            .compare_exchange(self.blocked(), self.empty(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.closed()
    }

    /// Closes the inbox and applies `bouncer` to every envelope that was
    /// still pending. Idempotent: closing an already-closed inbox drains
    /// nothing further.
    pub fn close<F: FnMut(Envelope)>(&self, mut bouncer: F) -> usize {
        let drained = self.take_head(NewHead::Closed);
        let n = drained.len();
        for envelope in drained {
            bouncer(envelope);
        }
        n
    }
}

impl Default for Inbox {
    fn default() -> Inbox {
        Inbox::new()
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        // Any envelopes still pending at drop time (e.g. the owning actor was
        // dropped without ever calling `close`) are simply deallocated.
        let head = self.head.swap(self.closed(), Ordering::AcqRel);
        let mut head = head;
        while !self.is_sentinel(head) {
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;
    use crate::message_id::MessageId;

    fn env(n: u32) -> Envelope {
        Envelope::new(None, MessageId::ASYNC, Vec::new(), Payload::new(n))
    }

    fn payload_of(e: Envelope) -> u32 {
        e.payload.downcast::<u32>().expect("test envelopes carry u32 payloads")
    }

    #[test]
    fn push_then_take_head_is_lifo_order() {
        let inbox = Inbox::new();
        assert!(matches!(inbox.push_front(env(1)), PushOutcome::Success));
        assert!(matches!(inbox.push_front(env(2)), PushOutcome::Success));
        assert!(matches!(inbox.push_front(env(3)), PushOutcome::Success));

        let popped = inbox.take_head(NewHead::Empty);
        let ids: Vec<u32> = popped.into_iter().map(payload_of).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn block_unblock_roundtrip() {
        let inbox = Inbox::new();
        assert!(inbox.try_block());
        assert!(!inbox.try_block(), "double try_block must fail");
        match inbox.push_front(env(1)) {
            PushOutcome::UnblockedReader => {}
            _ => panic!("push into blocked inbox must report UnblockedReader"),
        }
        // head is no longer `blocked`; a second try_unblock must fail.
        assert!(!inbox.try_unblock());
    }

    #[test]
    fn push_after_close_is_bounced() {
        let inbox = Inbox::new();
        inbox.push_front(env(1));
        let closed = inbox.close(|_| {});
        assert_eq!(closed, 1);
        match inbox.push_front(env(2)) {
            PushOutcome::Closed(_) => {}
            _ => panic!("push into closed inbox must bounce"),
        }
    }

    #[test]
    fn close_is_idempotent() {
        let inbox = Inbox::new();
        inbox.push_front(env(1));
        assert_eq!(inbox.close(|_| {}), 1);
        assert_eq!(inbox.close(|_| {}), 0);
    }
}
