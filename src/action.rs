//! Scheduled callback occurrences and their ordering vocabulary.
//!
//! An [`Action`] is one scheduled invocation of one node callback at one
//! logical instant. Rx actions wait for their payload to be intercepted
//! and buffered before they become runnable; timer actions are runnable
//! as soon as their ordering constraints clear. Actions are identified
//! by their arena handle ([`ActionId`](crate::graph::ActionId)), never
//! by value: the same node can hold several actions for the same topic
//! across timesteps.

use std::fmt;

use crate::model::Cause;
use crate::types::{LogicalTime, NodeName, Payload, TopicName};

/// Lifecycle state of an action.
///
/// Rx actions are born `Waiting` and become `Ready` when their payload
/// is buffered; timer actions are born `Ready`. The scheduler moves a
/// runnable action to `Running`, and the completion tracker destroys it
/// once all declared effects have been observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionState {
    Waiting,
    Ready,
    Running,
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionState::Waiting => write!(f, "waiting"),
            ActionState::Ready => write!(f, "ready"),
            ActionState::Running => write!(f, "running"),
        }
    }
}

/// Kind of ordering constraint between two actions.
///
/// An edge X→Y means X must wait until Y has completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeType {
    /// X runs at the same node as Y: callbacks at one node are serial.
    SameNode,
    /// X would publish a topic Y is still waiting to receive:
    /// concurrent publishers on one topic would make delivery order
    /// nondeterministic.
    SameTopic,
    /// Y is the publishing action that will produce X's input.
    Causality,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeType::SameNode => write!(f, "same-node"),
            EdgeType::SameTopic => write!(f, "same-topic"),
            EdgeType::Causality => write!(f, "causality"),
        }
    }
}

/// A pending delivery of one intercepted message to one subscriber.
#[derive(Clone, Debug)]
pub struct RxAction {
    pub node: NodeName,
    pub topic: TopicName,
    pub timestamp: LogicalTime,
    pub state: ActionState,
    /// The intercepted message, buffered once it arrives. `None` until
    /// then; exactly once per action.
    pub payload: Option<Payload>,
}

impl RxAction {
    /// A subscription action waiting for its payload.
    #[must_use]
    pub fn waiting(
        node: impl Into<NodeName>,
        topic: impl Into<TopicName>,
        timestamp: LogicalTime,
    ) -> Self {
        RxAction {
            node: node.into(),
            topic: topic.into(),
            timestamp,
            state: ActionState::Waiting,
            payload: None,
        }
    }
}

/// A pending timer callback, expanded when a timestep is granted.
#[derive(Clone, Debug)]
pub struct TimerAction {
    pub node: NodeName,
    pub period_ns: u64,
    pub timestamp: LogicalTime,
    pub state: ActionState,
}

impl TimerAction {
    /// A timer action; timers need no payload, so they start ready.
    #[must_use]
    pub fn ready(node: impl Into<NodeName>, period_ns: u64, timestamp: LogicalTime) -> Self {
        TimerAction {
            node: node.into(),
            period_ns,
            timestamp,
            state: ActionState::Ready,
        }
    }
}

/// One scheduled callback invocation.
#[derive(Clone, Debug)]
pub enum Action {
    Rx(RxAction),
    Timer(TimerAction),
}

impl Action {
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Action::Rx(rx) => &rx.node,
            Action::Timer(timer) => &timer.node,
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> LogicalTime {
        match self {
            Action::Rx(rx) => rx.timestamp,
            Action::Timer(timer) => timer.timestamp,
        }
    }

    #[must_use]
    pub fn state(&self) -> ActionState {
        match self {
            Action::Rx(rx) => rx.state,
            Action::Timer(timer) => timer.state,
        }
    }

    pub fn set_state(&mut self, state: ActionState) {
        match self {
            Action::Rx(rx) => rx.state = state,
            Action::Timer(timer) => timer.state = state,
        }
    }

    /// The model input that triggers this callback.
    #[must_use]
    pub fn cause(&self) -> Cause {
        match self {
            Action::Rx(rx) => Cause::Topic(rx.topic.clone()),
            Action::Timer(timer) => Cause::Timer {
                period_ns: timer.period_ns,
            },
        }
    }

    #[must_use]
    pub fn as_rx(&self) -> Option<&RxAction> {
        match self {
            Action::Rx(rx) => Some(rx),
            Action::Timer(_) => None,
        }
    }

    #[must_use]
    pub fn as_rx_mut(&mut self) -> Option<&mut RxAction> {
        match self {
            Action::Rx(rx) => Some(rx),
            Action::Timer(_) => None,
        }
    }

    /// Whether this is an rx action on `topic`.
    #[must_use]
    pub fn is_rx_on(&self, topic: &str) -> bool {
        self.as_rx().is_some_and(|rx| rx.topic == topic)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Rx(rx) => {
                write!(f, "{}: rx {} @{} ({})", rx.node, rx.topic, rx.timestamp, rx.state)
            }
            Action::Timer(t) => {
                write!(f, "{}: timer @{} ({})", t.node, t.timestamp, t.state)
            }
        }
    }
}
