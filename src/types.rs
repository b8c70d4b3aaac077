//! Core identifier and value types for the lockstep orchestrator.
//!
//! This module defines the fundamental vocabulary shared by every other
//! module: the name aliases for nodes, topics and services, the logical
//! clock value ([`LogicalTime`]), the opaque message payload handle
//! ([`Payload`]), and the interception naming scheme that gives every
//! subscriber its own fan-out topic.
//!
//! # Examples
//!
//! ```rust
//! use lockstep::types::{intercepted_topic, LogicalTime};
//!
//! let t = LogicalTime::from_millis(1500);
//! assert_eq!(t.as_nanos(), 1_500_000_000);
//! assert_eq!(t.to_string(), "1.500000000s");
//!
//! assert_eq!(
//!     intercepted_topic("tracker", "/meas/radar"),
//!     "/intercepted/tracker/sub/meas/radar",
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a processing node, unique within one configuration.
pub type NodeName = String;

/// Canonical topic name. Topics always begin with `/`.
pub type TopicName = String;

/// Name of a service endpoint a node may call as a side effect.
pub type ServiceName = String;

/// Opaque message payload.
///
/// The orchestrator never deserializes message contents; it buffers and
/// republishes byte blobs keyed by topic. Deserialization is the
/// receiving node's concern.
pub type Payload = bytes::Bytes;

/// Topic carrying simulated clock ticks. Ignored on the interception
/// path: clock publications are gated through [`offer_time`] instead of
/// being tracked as data edges.
///
/// [`offer_time`]: crate::orchestrator::Orchestrator::offer_time
pub const CLOCK_TOPIC: &str = "/clock";

/// Topic carrying per-node callback-finished signals, keyed by node
/// name. Used to complete callbacks that publish nothing.
pub const STATUS_TOPIC: &str = "/status";

/// A point on the simulation clock, in nanoseconds since the start of
/// the recording.
///
/// Logical time is set exclusively by the data source through granted
/// timestep offers and is monotonically nondecreasing. It has no
/// relation to wall-clock time.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LogicalTime(u64);

impl LogicalTime {
    /// Time zero, the instant before any recorded data.
    pub const ZERO: LogicalTime = LogicalTime(0);

    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        LogicalTime(nanos)
    }

    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        LogicalTime(millis * 1_000_000)
    }

    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        LogicalTime(secs * 1_000_000_000)
    }

    #[must_use]
    pub fn as_nanos(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.0 / 1_000_000_000, self.0 % 1_000_000_000)
    }
}

/// Derive the dedicated fan-out topic for one `(node, topic)`
/// subscription.
///
/// The scheme is injective on `(node, topic)` and disjoint from user
/// topics: `topic` already begins with `/`, so the result is
/// `/intercepted/<node>/sub<topic>`. The launch tooling rewrites each
/// subscriber's remappings to match, which is what lets the
/// orchestrator release every delivery individually.
#[must_use]
pub fn intercepted_topic(node: &str, topic: &str) -> TopicName {
    format!("/intercepted/{node}/sub{topic}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_time_display_pads_nanoseconds() {
        assert_eq!(LogicalTime::from_nanos(42).to_string(), "0.000000042s");
        assert_eq!(LogicalTime::from_secs(3).to_string(), "3.000000000s");
    }

    #[test]
    fn logical_time_orders_by_nanos() {
        assert!(LogicalTime::from_millis(99) < LogicalTime::from_millis(100));
        assert_eq!(LogicalTime::from_secs(1), LogicalTime::from_millis(1000));
    }

    #[test]
    fn interception_scheme_is_injective_on_node_and_topic() {
        let a = intercepted_topic("a", "/b/c");
        let b = intercepted_topic("a/b", "/c");
        assert_ne!(a, b);
        assert!(a.starts_with("/intercepted/"));
    }
}
