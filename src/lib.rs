//! # Lockstep: deterministic callback orchestration
//!
//! Lockstep replays recorded (or synthesized) inputs through a graph of
//! publish/subscribe processing nodes *deterministically*. Middleware
//! normally delivers messages concurrently and in whatever order the
//! transport produces, so replaying identical inputs twice can yield
//! different outputs. Lockstep removes that freedom: every inter-node
//! topic is intercepted, every subscriber gets a dedicated fan-out
//! topic, and messages are released one by one in an order derived from
//! static per-node models. The simulated clock only advances once every
//! callback for the previous instant has observably completed.
//!
//! ## Core concepts
//!
//! - **Node models** ([`model`]): each node's declared inputs (topic
//!   subscriptions, timers) and, per input, the effects its callback
//!   produces (topic publications, a status signal, service calls).
//! - **Actions** ([`action`]): one scheduled callback invocation at one
//!   logical instant, moving through waiting → ready → running.
//! - **Constraint graph** ([`graph`]): pending actions with same-node,
//!   same-topic and causality ordering edges; an action runs only once
//!   its out-degree reaches zero.
//! - **Orchestrator** ([`orchestrator`]): the admission gate the data
//!   source negotiates with ([`offer_input`] / [`offer_time`]), the
//!   scheduler that releases buffered messages, and the completion
//!   tracker that retires running actions as their declared effects are
//!   observed.
//! - **Middleware seam** ([`middleware`]): the narrow trait the core
//!   publishes through; bindings feed intercepted traffic back via
//!   [`handle_message`] / [`handle_status`].
//!
//! ## Quick start
//!
//! ```rust
//! use lockstep::middleware::ChannelMiddleware;
//! use lockstep::model::{Cause, Effect, NodeModel};
//! use lockstep::orchestrator::Orchestrator;
//! use lockstep::types::{LogicalTime, Payload};
//!
//! // One node: reacts to /camera by publishing /detections.
//! let detector = NodeModel::builder("detector")
//!     .input(Cause::topic("/camera"), [Effect::publish("/detections")])
//!     .build();
//!
//! let (link, events) = ChannelMiddleware::unbounded();
//! let mut orchestrator = Orchestrator::new(
//!     link,
//!     vec![detector],
//!     vec!["/camera".to_string()], // external input
//!     Vec::new(),                  // no extra output topics
//! );
//!
//! // The data source negotiates: clock first, then data.
//! let mut ticket = orchestrator.offer_time(LogicalTime::from_millis(100)).unwrap();
//! assert!(ticket.try_recv().is_ok());
//! let mut ticket = orchestrator.offer_input("/camera").unwrap();
//! assert!(ticket.try_recv().is_ok());
//!
//! // The binding hands the recorded message in; lockstep releases it
//! // on the detector's dedicated fan-out topic.
//! orchestrator
//!     .handle_message("/camera", Payload::from_static(b"frame"))
//!     .unwrap();
//! assert!(events.try_recv().is_ok());
//! ```
//!
//! ## Determinism contract
//!
//! A node that emits an output it never declared is undefined behavior
//! from the orchestrator's point of view and surfaces as a fatal
//! [`ActionNotFound`]. Errors are never retried locally: determinism is
//! preferred to liveness, and a hanging node hangs the replay, as
//! intended.
//!
//! [`offer_input`]: orchestrator::Orchestrator::offer_input
//! [`offer_time`]: orchestrator::Orchestrator::offer_time
//! [`handle_message`]: orchestrator::Orchestrator::handle_message
//! [`handle_status`]: orchestrator::Orchestrator::handle_status
//! [`ActionNotFound`]: orchestrator::OrchestratorError::ActionNotFound

pub mod action;
pub mod config;
pub mod graph;
pub mod middleware;
pub mod model;
pub mod orchestrator;
pub mod telemetry;
pub mod types;
