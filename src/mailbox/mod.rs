//! The mailbox: combines the lock-free inbox with the priority task queue
//! and exposes the owner-facing operations the actor body drives from
//! `resume`.

pub mod inbox;
pub mod queue;

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::envelope::Envelope;
use crate::error::bounce;
use crate::message_id::MessageId;
use inbox::{Inbox, PushOutcome};
use queue::TaskQueue;

/// Mirrors the inbox's own open/blocked/closed state for cheap external
/// inspection (profiler hooks, tests) without taking the queue lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxState {
    Open,
    Blocked,
    Closed,
}

const STATE_OPEN: u8 = 0;
const STATE_BLOCKED: u8 = 1;
const STATE_CLOSED: u8 = 2;

pub struct Mailbox {
    inbox: Inbox,
    // The contract reserves all `TaskQueue` operations to the owning actor;
    // the mutex exists for safety against accidental misuse, not contention
    // (it is never held across user code and is always uncontended in
    // practice, matching the teacher's use of `parking_lot` for
    // briefly-held, owner-local state elsewhere in the cell).
    queue: Mutex<TaskQueue>,
    state: AtomicU8,
}

impl Mailbox {
    pub fn new() -> Mailbox {
        Mailbox {
            inbox: Inbox::new(),
            queue: Mutex::new(TaskQueue::new()),
            state: AtomicU8::new(STATE_OPEN),
        }
    }

    pub fn state(&self) -> MailboxState {
        match self.state.load(Ordering::Relaxed) {
            STATE_BLOCKED => MailboxState::Blocked,
            STATE_CLOSED => MailboxState::Closed,
            _ => MailboxState::Open,
        }
    }

    /// Enqueues an envelope. Called from any thread. Reports whether this
    /// push transitioned the reader from blocked to ready, so the caller
    /// knows whether it must resubmit the actor to the scheduler. On
    /// `queue_closed` the envelope is handed to the bouncer.
    pub fn push_back_reporting(&self, envelope: Envelope) -> PushReport {
        match self.inbox.push_front(envelope) {
            PushOutcome::Success => PushReport::Accepted,
            PushOutcome::UnblockedReader => {
                self.state.store(STATE_OPEN, Ordering::Relaxed);
                PushReport::UnblockedReader
            }
            PushOutcome::Closed(envelope) => {
                bounce(envelope);
                PushReport::Closed
            }
        }
    }

    /// Stashes a previously-popped envelope back at the head of its lane.
    pub fn push_front(&self, envelope: Envelope) {
        self.queue.lock().push_front(envelope);
    }

    pub fn pop_front(&self) -> Option<Envelope> {
        let mut queue = self.queue.lock();
        queue.refill(&self.inbox);
        queue.pop()
    }

    pub fn peek_response(&self, id: MessageId) -> bool {
        let mut queue = self.queue.lock();
        queue.refill(&self.inbox);
        queue.peek_response(id)
    }

    /// Triggers a refill before reporting, since size includes stashed
    /// inbox contents.
    pub fn len(&self) -> usize {
        let mut queue = self.queue.lock();
        queue.refill(&self.inbox);
        queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// CAS `empty -> blocked` on the inbox, and mirrors the state for
    /// cheap external reads.
    pub fn try_block(&self) -> bool {
        if self.inbox.try_block() {
            self.state.store(STATE_BLOCKED, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn try_unblock(&self) -> bool {
        if self.inbox.try_unblock() {
            self.state.store(STATE_OPEN, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Drains both lanes and the inbox stack, bouncing every pending
    /// envelope. Idempotent.
    pub fn close(&self) -> usize {
        self.state.store(STATE_CLOSED, Ordering::Relaxed);
        let mut queue = self.queue.lock();
        let mut n = 0;
        for envelope in queue.drain_all() {
            bounce(envelope);
            n += 1;
        }
        n += self.inbox.close(bounce);
        n
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

impl Default for Mailbox {
    fn default() -> Mailbox {
        Mailbox::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushReport {
    Accepted,
    UnblockedReader,
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    fn env(n: u32) -> Envelope {
        Envelope::new(None, MessageId::ASYNC, Vec::new(), Payload::new(n))
    }

    #[test]
    fn push_then_pop_on_open_mailbox() {
        let mbox = Mailbox::new();
        assert_eq!(mbox.push_back_reporting(env(4)), PushReport::Accepted);
        let popped = mbox.pop_front().unwrap();
        assert_eq!(popped.payload.downcast::<u32>().unwrap(), 4);
    }

    #[test]
    fn block_then_push_reports_unblocked_reader() {
        let mbox = Mailbox::new();
        assert!(mbox.try_block());
        assert_eq!(mbox.state(), MailboxState::Blocked);
        assert_eq!(mbox.push_back_reporting(env(4)), PushReport::UnblockedReader);
        assert_eq!(mbox.state(), MailboxState::Open);
        let popped = mbox.pop_front().unwrap();
        assert_eq!(popped.payload.downcast::<u32>().unwrap(), 4);
    }

    #[test]
    fn close_reports_closed_state_and_drains() {
        let mbox = Mailbox::new();
        mbox.push_back_reporting(env(1));
        mbox.push_back_reporting(env(2));
        let n = mbox.close();
        assert_eq!(n, 2);
        assert_eq!(mbox.state(), MailboxState::Closed);
        assert_eq!(mbox.close(), 0, "close must be idempotent");
    }
}
