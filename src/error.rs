//! The error taxonomy and the bouncer used by `Mailbox::close` and by a
//! cell's `Drop` when the strong count hits zero without an explicit
//! cleanup.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::envelope::{Envelope, Payload};
use crate::message_id::Category;

/// The core's error taxonomy. Errors are values, never exceptions: nothing
/// in this crate panics in response to a bad message or a closed mailbox.
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    /// Push into a closed mailbox.
    #[error("queue closed")]
    QueueClosed,
    /// Behaviour had no handler for the delivered message.
    #[error("unexpected message")]
    UnexpectedMessage,
    /// Clock-fired timeout on a pending response.
    #[error("request timed out")]
    RequestTimeout,
    /// A request sat in a mailbox that was then closed.
    #[error("message bounced: {0}")]
    BouncedMessage(#[source] Box<RuntimeError>),
    /// Operation on an actor whose strong count already hit zero.
    #[error("actor exited: {0}")]
    ActorExited(ExitReason),
    /// Actor creation failed (name collision, panicking `pre_start`, ...).
    #[error("failed to create actor: {0}")]
    CreateFailed(String),
    /// Actor restart failed after a supervised failure.
    #[error("failed to restart actor")]
    RestartFailed,
}

/// The reason an actor's cleanup ran with. Cloned into every `exit_message`
/// sent to link partners.
#[derive(Debug, Clone)]
pub enum ExitReason {
    Normal,
    /// Synthesized when the strong count hits zero without a prior
    /// explicit `cleanup` call.
    NotExited,
    QueueClosed,
    Error(Arc<RuntimeError>),
    Custom(Arc<str>),
}

impl ExitReason {
    pub fn custom(msg: impl Into<Arc<str>>) -> ExitReason {
        ExitReason::Custom(msg.into())
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ExitReason::Normal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "ok"),
            ExitReason::NotExited => write!(f, "not_exited"),
            ExitReason::QueueClosed => write!(f, "queue_closed"),
            ExitReason::Error(e) => write!(f, "{e}"),
            ExitReason::Custom(s) => write!(f, "{s}"),
        }
    }
}

/// A synthetic error-response payload, routed back to the original sender
/// of a request that could not be delivered or answered.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub reason: ExitReasonTag,
}

/// A lightweight, `Clone`-friendly tag mirroring [`ExitReason`] without
/// carrying a full error chain into the envelope payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReasonTag {
    QueueClosed,
    RequestTimeout,
    ActorExited,
    NotExited,
}

/// Applied to every envelope drained from a closed mailbox (or an
/// unreachable actor): if the envelope carried a request id, an
/// error-response with reason `queue_closed` goes back to the sender;
/// otherwise the envelope is dropped silently.
pub fn bounce(envelope: Envelope) {
    let Envelope {
        sender,
        message_id,
        payload: _,
        ..
    } = envelope;

    if message_id.is_async() || matches!(message_id.category(), Category::Response | Category::ErrorResponse) {
        // asynchronous sends and responses are simply discarded: there is
        // nobody waiting on a reply to a reply.
        return;
    }

    match sender {
        Some(sender) => {
            let response_id = message_id.error_response_id();
            let response = Envelope::new(
                None,
                response_id,
                Vec::new(),
                Payload::new(ErrorResponse {
                    reason: ExitReasonTag::QueueClosed,
                }),
            );
            if !sender.enqueue(response) {
                warn!("bounce: sender's mailbox was also closed, error-response dropped");
            }
        }
        None => warn!("bounce: request had no sender, error-response dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_display() {
        assert_eq!(ExitReason::Normal.to_string(), "ok");
        assert_eq!(ExitReason::QueueClosed.to_string(), "queue_closed");
        assert_eq!(ExitReason::custom("boom").to_string(), "boom");
    }
}
