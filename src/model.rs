//! Static per-node behavior models.
//!
//! A [`NodeModel`] describes everything the orchestrator knows about one
//! node: the inputs that trigger its callbacks ([`Cause`]) and, per
//! input, the outputs that callback produces ([`Effect`]). Effects are
//! deterministic given the cause — they never depend on message
//! contents — which is what allows the constraint graph to be expanded
//! before any payload exists.
//!
//! Models are immutable between reconfigurations. A node that emits an
//! output it did not declare is a modeling error and surfaces as a fatal
//! [`ActionNotFound`](crate::orchestrator::OrchestratorError::ActionNotFound).
//!
//! # Examples
//!
//! ```rust
//! use lockstep::model::{Cause, Effect, NodeModel};
//!
//! let tracker = NodeModel::builder("tracker")
//!     .input(Cause::topic("/meas/radar"), [Effect::publish("/tracks")])
//!     .input(Cause::timer(100_000_000), [Effect::status()])
//!     .build();
//!
//! assert_eq!(tracker.name(), "tracker");
//! assert!(tracker.subscribes_to("/meas/radar"));
//! assert_eq!(
//!     tracker.effects_for(&Cause::topic("/meas/radar")),
//!     Some(&[Effect::publish("/tracks")][..]),
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{NodeName, ServiceName, TopicName};

/// A declared input of a node: one subscription or one timer.
///
/// Each cause triggers exactly one callback at the node; the model maps
/// it to the ordered effects that callback produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cause {
    /// A subscription on the given canonical topic.
    Topic(TopicName),
    /// A periodic timer with the given period in nanoseconds.
    Timer { period_ns: u64 },
}

impl Cause {
    pub fn topic(topic: impl Into<TopicName>) -> Self {
        Cause::Topic(topic.into())
    }

    #[must_use]
    pub fn timer(period_ns: u64) -> Self {
        Cause::Timer { period_ns }
    }

    /// The subscribed topic, when this cause is a subscription.
    #[must_use]
    pub fn topic_name(&self) -> Option<&TopicName> {
        match self {
            Cause::Topic(t) => Some(t),
            Cause::Timer { .. } => None,
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Topic(t) => write!(f, "rx {t}"),
            Cause::Timer { period_ns } => write!(f, "timer @{period_ns}ns"),
        }
    }
}

/// A declared output of one callback.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// The callback publishes a message on the given canonical topic.
    Publish(TopicName),
    /// The callback finishes by signalling on the status channel instead
    /// of publishing data. This is how callbacks without topic outputs
    /// become observable.
    Status,
    /// The callback invokes a service. Tracked for completeness of the
    /// model; service calls are not ordering edges.
    Service(ServiceName),
}

impl Effect {
    pub fn publish(topic: impl Into<TopicName>) -> Self {
        Effect::Publish(topic.into())
    }

    #[must_use]
    pub fn status() -> Self {
        Effect::Status
    }

    pub fn service(service: impl Into<ServiceName>) -> Self {
        Effect::Service(service.into())
    }

    /// The published topic, when this effect is a publication.
    #[must_use]
    pub fn published_topic(&self) -> Option<&TopicName> {
        match self {
            Effect::Publish(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Publish(t) => write!(f, "publish {t}"),
            Effect::Status => write!(f, "status"),
            Effect::Service(s) => write!(f, "call {s}"),
        }
    }
}

/// Immutable description of one node: its name and the mapping from
/// each declared input to the effects its callback produces.
///
/// Input order is preserved from construction, so iteration over a
/// model is deterministic — the property the whole scheduler rests on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeModel {
    name: NodeName,
    inputs: Vec<(Cause, Vec<Effect>)>,
}

impl NodeModel {
    #[must_use]
    pub fn builder(name: impl Into<NodeName>) -> NodeModelBuilder {
        NodeModelBuilder {
            name: name.into(),
            inputs: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All declared inputs, in declaration order.
    pub fn possible_inputs(&self) -> impl Iterator<Item = &Cause> {
        self.inputs.iter().map(|(cause, _)| cause)
    }

    /// The ordered effects of the callback triggered by `cause`, or
    /// `None` if the cause is not declared for this node.
    #[must_use]
    pub fn effects_for(&self, cause: &Cause) -> Option<&[Effect]> {
        self.inputs
            .iter()
            .find(|(c, _)| c == cause)
            .map(|(_, effects)| effects.as_slice())
    }

    /// Whether this node declares a subscription on `topic`.
    #[must_use]
    pub fn subscribes_to(&self, topic: &str) -> bool {
        self.inputs
            .iter()
            .any(|(cause, _)| cause.topic_name().is_some_and(|t| t == topic))
    }

    /// Subscribed topics, in declaration order.
    pub fn subscribed_topics(&self) -> impl Iterator<Item = &TopicName> {
        self.inputs.iter().filter_map(|(cause, _)| cause.topic_name())
    }

    /// Topics this node may publish, in declaration order. A topic
    /// published by several causes appears once per cause.
    pub fn published_topics(&self) -> impl Iterator<Item = &TopicName> {
        self.inputs
            .iter()
            .flat_map(|(_, effects)| effects.iter().filter_map(Effect::published_topic))
    }

    /// Periods of all declared timer inputs, in nanoseconds.
    pub fn timer_periods(&self) -> impl Iterator<Item = u64> + '_ {
        self.inputs.iter().filter_map(|(cause, _)| match cause {
            Cause::Timer { period_ns } => Some(*period_ns),
            Cause::Topic(_) => None,
        })
    }
}

impl fmt::Display for NodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} inputs)", self.name, self.inputs.len())
    }
}

/// Fluent constructor for [`NodeModel`].
pub struct NodeModelBuilder {
    name: NodeName,
    inputs: Vec<(Cause, Vec<Effect>)>,
}

impl NodeModelBuilder {
    /// Declare an input and the effects of its callback. Inputs keep
    /// declaration order; declaring the same cause twice keeps the
    /// first declaration (configuration loading rejects duplicates
    /// before a model is ever built this way).
    #[must_use]
    pub fn input(mut self, cause: Cause, effects: impl IntoIterator<Item = Effect>) -> Self {
        if !self.inputs.iter().any(|(c, _)| *c == cause) {
            self.inputs.push((cause, effects.into_iter().collect()));
        }
        self
    }

    #[must_use]
    pub fn build(self) -> NodeModel {
        NodeModel {
            name: self.name,
            inputs: self.inputs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_lookup_matches_declared_cause() {
        let model = NodeModel::builder("n")
            .input(Cause::topic("/a"), [Effect::publish("/b"), Effect::status()])
            .build();

        assert_eq!(
            model.effects_for(&Cause::topic("/a")),
            Some(&[Effect::publish("/b"), Effect::status()][..])
        );
        assert_eq!(model.effects_for(&Cause::topic("/missing")), None);
        assert_eq!(model.effects_for(&Cause::timer(10)), None);
    }

    #[test]
    fn duplicate_causes_keep_first_declaration() {
        let model = NodeModel::builder("n")
            .input(Cause::topic("/a"), [Effect::status()])
            .input(Cause::topic("/a"), [Effect::publish("/b")])
            .build();

        assert_eq!(model.possible_inputs().count(), 1);
        assert_eq!(
            model.effects_for(&Cause::topic("/a")),
            Some(&[Effect::status()][..])
        );
    }

    #[test]
    fn published_topics_cover_all_causes() {
        let model = NodeModel::builder("n")
            .input(Cause::topic("/a"), [Effect::publish("/x")])
            .input(Cause::timer(100), [Effect::publish("/y"), Effect::status()])
            .build();

        let published: Vec<_> = model.published_topics().cloned().collect();
        assert_eq!(published, vec!["/x".to_string(), "/y".to_string()]);
        assert_eq!(model.timer_periods().collect::<Vec<_>>(), vec![100]);
    }
}
