//! The per-actor FIFO task queue: urgent and normal lanes, refilled in bulk
//! from the inbox and private to the owning actor.

use std::collections::VecDeque;

use crate::envelope::Envelope;
use crate::mailbox::inbox::{Inbox, NewHead};
use crate::message_id::{Category, MessageId};

#[derive(Default)]
pub struct TaskQueue {
    urgent: VecDeque<Envelope>,
    normal: VecDeque<Envelope>,
}

impl TaskQueue {
    pub fn new() -> TaskQueue {
        TaskQueue::default()
    }

    fn lane_for(envelope: &Envelope) -> &'static str {
        match envelope.message_id.category() {
            Category::Urgent => "urgent",
            _ => "normal",
        }
    }

    fn push_back_sorted(&mut self, envelope: Envelope) {
        if Self::lane_for(&envelope) == "urgent" {
            self.urgent.push_back(envelope);
        } else {
            self.normal.push_back(envelope);
        }
    }

    /// Reaps the inbox (LIFO order) and appends each envelope to its lane in
    /// FIFO order.
    pub fn refill(&mut self, inbox: &Inbox) {
        if self.urgent.is_empty() && self.normal.is_empty() {
            let drained = inbox.take_head(NewHead::Empty);
            for envelope in drained.into_iter().rev() {
                self.push_back_sorted(envelope);
            }
        }
    }

    /// Urgent lane first, then normal.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.urgent.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Re-stashes a skipped envelope at the head of its lane.
    pub fn push_front(&mut self, envelope: Envelope) {
        if Self::lane_for(&envelope) == "urgent" {
            self.urgent.push_front(envelope);
        } else {
            self.normal.push_front(envelope);
        }
    }

    /// Whether an envelope matching `id` is present in either lane, without
    /// removing it.
    pub fn peek_response(&self, id: MessageId) -> bool {
        self.urgent.iter().chain(self.normal.iter()).any(|e| e.message_id == id)
    }

    pub fn peek_front(&self) -> Option<&Envelope> {
        self.urgent.front().or_else(|| self.normal.front())
    }

    pub fn is_empty(&self) -> bool {
        self.urgent.is_empty() && self.normal.is_empty()
    }

    pub fn len(&self) -> usize {
        self.urgent.len() + self.normal.len()
    }

    pub fn drain_all(&mut self) -> Vec<Envelope> {
        let mut out: Vec<Envelope> = self.urgent.drain(..).collect();
        out.extend(self.normal.drain(..));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    fn urgent(n: u32) -> Envelope {
        Envelope::new(None, MessageId::new_urgent_request(), Vec::new(), Payload::new(n))
    }

    fn normal(n: u32) -> Envelope {
        Envelope::new(None, MessageId::ASYNC, Vec::new(), Payload::new(n))
    }

    #[test]
    fn urgent_lane_pops_before_normal() {
        let inbox = Inbox::new();
        inbox.push_front(normal(1));
        inbox.push_front(normal(2));
        inbox.push_front(urgent(3));

        let mut q = TaskQueue::new();
        q.refill(&inbox);

        let first = q.pop().unwrap().payload.downcast::<u32>().unwrap();
        let second = q.pop().unwrap().payload.downcast::<u32>().unwrap();
        let third = q.pop().unwrap().payload.downcast::<u32>().unwrap();
        assert_eq!((first, second, third), (3, 1, 2));
        assert!(q.pop().is_none());
    }

    #[test]
    fn refill_only_happens_when_both_lanes_drained() {
        let inbox = Inbox::new();
        inbox.push_front(normal(1));
        let mut q = TaskQueue::new();
        q.refill(&inbox);
        inbox.push_front(normal(2));
        // lanes are non-empty, so a second refill must not pull in (2) yet.
        q.refill(&inbox);
        assert_eq!(q.len(), 1);
    }
}
