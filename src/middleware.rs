//! The seam between the orchestration core and the actual middleware.
//!
//! The core never talks to a transport directly: it publishes released
//! messages and triggers timer callbacks through the [`Middleware`]
//! trait, and the binding feeds intercepted traffic back in through
//! [`Orchestrator::handle_message`] /
//! [`Orchestrator::handle_status`]. Everything transport-specific —
//! subscriptions, QoS, serialization — lives on the binding's side of
//! this trait.
//!
//! [`ChannelMiddleware`] is the crate's own implementation: a flume
//! channel that records every side effect in order. It backs the test
//! suites and any in-process loopback harness.
//!
//! [`Orchestrator::handle_message`]: crate::orchestrator::Orchestrator::handle_message
//! [`Orchestrator::handle_status`]: crate::orchestrator::Orchestrator::handle_status

use miette::Diagnostic;
use thiserror::Error;

use crate::types::{LogicalTime, NodeName, Payload, TopicName};

/// Errors surfaced by a middleware binding.
#[derive(Debug, Error, Diagnostic)]
pub enum MiddlewareError {
    /// A publication could not be delivered to the transport.
    #[error("publish on {topic} failed: {reason}")]
    #[diagnostic(
        code(lockstep::middleware::publish),
        help("The binding rejected or dropped the publication. The orchestrator cannot continue deterministically after a lost release.")
    )]
    PublishFailed { topic: TopicName, reason: String },

    /// A timer callback could not be triggered.
    #[error("timer fire for node {node} failed: {reason}")]
    #[diagnostic(code(lockstep::middleware::timer))]
    TimerFailed { node: NodeName, reason: String },
}

/// Outbound side effects of the scheduler.
///
/// `publish` releases one buffered message on a dedicated fan-out topic.
/// `fire_timer` is the hook through which a binding triggers the actual
/// timer callback at a node once the scheduler has cleared it to run;
/// how that is wired (nudging a sim-time timer, invoking a test double)
/// is the binding's business. Completion flows back like any other
/// callback, through the node's declared effects.
pub trait Middleware: Send {
    fn publish(&mut self, topic: &str, payload: Payload) -> Result<(), MiddlewareError>;

    fn fire_timer(
        &mut self,
        node: &str,
        period_ns: u64,
        at: LogicalTime,
    ) -> Result<(), MiddlewareError>;
}

/// One recorded side effect, in scheduler order.
#[derive(Clone, Debug)]
pub enum MiddlewareEvent {
    /// A message released on an interception fan-out topic.
    Message { topic: TopicName, payload: Payload },
    /// A timer callback cleared to fire.
    Timer {
        node: NodeName,
        period_ns: u64,
        at: LogicalTime,
    },
}

/// Channel-backed [`Middleware`]: every side effect is sent over a flume
/// channel in the order the scheduler produced it.
///
/// # Examples
///
/// ```rust
/// use lockstep::middleware::{ChannelMiddleware, Middleware, MiddlewareEvent};
///
/// let (mut link, events) = ChannelMiddleware::unbounded();
/// link.publish("/intercepted/n/sub/a", b"m".as_ref().into()).unwrap();
///
/// match events.try_recv().unwrap() {
///     MiddlewareEvent::Message { topic, .. } => {
///         assert_eq!(topic, "/intercepted/n/sub/a");
///     }
///     MiddlewareEvent::Timer { .. } => unreachable!(),
/// }
/// ```
pub struct ChannelMiddleware {
    tx: flume::Sender<MiddlewareEvent>,
}

impl ChannelMiddleware {
    /// Create a middleware whose side effects drain through the
    /// returned receiver.
    #[must_use]
    pub fn unbounded() -> (Self, flume::Receiver<MiddlewareEvent>) {
        let (tx, rx) = flume::unbounded();
        (ChannelMiddleware { tx }, rx)
    }
}

impl Middleware for ChannelMiddleware {
    fn publish(&mut self, topic: &str, payload: Payload) -> Result<(), MiddlewareError> {
        self.tx
            .send(MiddlewareEvent::Message {
                topic: topic.to_string(),
                payload,
            })
            .map_err(|_| MiddlewareError::PublishFailed {
                topic: topic.to_string(),
                reason: "event channel disconnected".to_string(),
            })
    }

    fn fire_timer(
        &mut self,
        node: &str,
        period_ns: u64,
        at: LogicalTime,
    ) -> Result<(), MiddlewareError> {
        self.tx
            .send(MiddlewareEvent::Timer {
                node: node.to_string(),
                period_ns,
                at,
            })
            .map_err(|_| MiddlewareError::TimerFailed {
                node: node.to_string(),
                reason: "event channel disconnected".to_string(),
            })
    }
}
