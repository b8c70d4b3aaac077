#![allow(dead_code)]

//! Shared fixtures for the integration suites: a recording middleware,
//! a loopback driver that plays the role of well-behaved nodes, and
//! invariant checks over the orchestrator's graph.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use lockstep::action::ActionState;
use lockstep::middleware::{Middleware, MiddlewareError, MiddlewareEvent};
use lockstep::model::{Cause, Effect, NodeModel};
use lockstep::orchestrator::{AdmissionTicket, Orchestrator, OrchestratorError};
use lockstep::types::{LogicalTime, NodeName, Payload, TopicName};

/// Middleware that records every side effect, in scheduler order,
/// behind a shared handle the test keeps a clone of.
#[derive(Clone, Default)]
pub struct RecordingLink {
    published: Arc<Mutex<Vec<(TopicName, Payload)>>>,
    timers: Arc<Mutex<Vec<(NodeName, u64, LogicalTime)>>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published_topics(&self) -> Vec<TopicName> {
        self.published.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn published(&self) -> Vec<(TopicName, Payload)> {
        self.published.lock().clone()
    }

    pub fn timer_fires(&self) -> Vec<(NodeName, u64, LogicalTime)> {
        self.timers.lock().clone()
    }
}

impl Middleware for RecordingLink {
    fn publish(&mut self, topic: &str, payload: Payload) -> Result<(), MiddlewareError> {
        self.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    fn fire_timer(
        &mut self,
        node: &str,
        period_ns: u64,
        at: LogicalTime,
    ) -> Result<(), MiddlewareError> {
        self.timers.lock().push((node.to_string(), period_ns, at));
        Ok(())
    }
}

pub fn ms(millis: u64) -> LogicalTime {
    LogicalTime::from_millis(millis)
}

pub fn payload(data: &str) -> Payload {
    Payload::copy_from_slice(data.as_bytes())
}

/// Whether an admission ticket has already resolved.
pub fn resolved(ticket: &mut AdmissionTicket) -> bool {
    ticket.try_recv().is_ok()
}

/// Split an interception fan-out topic back into `(node, canonical)`.
pub fn split_fanout(fanout: &str) -> (NodeName, TopicName) {
    let rest = fanout
        .strip_prefix("/intercepted/")
        .expect("not an interception topic");
    let (node, canonical) = rest.split_once("/sub").expect("malformed interception topic");
    (node.to_string(), canonical.to_string())
}

/// Play the role of every modeled node: drain the middleware events and
/// answer each released message (or cleared timer) with the effects the
/// model declares, until the system settles. The reachable-state
/// invariants are checked after every completion.
///
/// Returns the full ordered event log.
pub fn run_loopback(
    orchestrator: &mut Orchestrator,
    events: &flume::Receiver<MiddlewareEvent>,
) -> Result<Vec<MiddlewareEvent>, OrchestratorError> {
    let models: Vec<NodeModel> = orchestrator.models().to_vec();
    let effects_of = |node: &str, cause: &Cause| -> Vec<Effect> {
        models
            .iter()
            .find(|m| m.name() == node)
            .and_then(|m| m.effects_for(cause))
            .map(<[Effect]>::to_vec)
            .unwrap_or_default()
    };

    let mut log = Vec::new();
    while let Ok(event) = events.try_recv() {
        log.push(event.clone());
        let (node, cause) = match &event {
            MiddlewareEvent::Message { topic, .. } => {
                let (node, canonical) = split_fanout(topic);
                (node, Cause::topic(canonical))
            }
            MiddlewareEvent::Timer { node, period_ns, .. } => {
                (node.clone(), Cause::timer(*period_ns))
            }
        };
        for effect in effects_of(&node, &cause) {
            match effect {
                Effect::Publish(topic) => {
                    orchestrator.handle_message(&topic, payload(&topic))?;
                }
                Effect::Status => orchestrator.handle_status(&node)?,
                Effect::Service(_) => {}
            }
            assert_invariants(orchestrator);
        }
    }
    Ok(log)
}

/// Comparable form of an event log, for determinism assertions.
pub fn event_keys(log: &[MiddlewareEvent]) -> Vec<(String, Vec<u8>)> {
    log.iter()
        .map(|event| match event {
            MiddlewareEvent::Message { topic, payload } => (topic.clone(), payload.to_vec()),
            MiddlewareEvent::Timer { node, period_ns, at } => (
                format!("timer:{node}:{period_ns}"),
                at.as_nanos().to_be_bytes().to_vec(),
            ),
        })
        .collect()
}

/// Check the reachable-state invariants: acyclicity, at most one
/// running action per node, at most one running publisher per topic,
/// and no unconstrained ready actions left behind by the scheduler.
pub fn assert_invariants(orchestrator: &Orchestrator) {
    let graph = orchestrator.graph();
    assert!(graph.is_acyclic(), "constraint graph must stay acyclic");

    let mut running_nodes: FxHashSet<String> = FxHashSet::default();
    let mut running_publishers: FxHashSet<TopicName> = FxHashSet::default();

    for (id, action) in graph.iter() {
        match action.state() {
            ActionState::Running => {
                assert!(
                    running_nodes.insert(action.node().to_string()),
                    "two running actions at node {}",
                    action.node()
                );
                let model = orchestrator
                    .models()
                    .iter()
                    .find(|m| m.name() == action.node())
                    .expect("running action without model");
                for effect in model.effects_for(&action.cause()).unwrap_or_default() {
                    if let Some(topic) = effect.published_topic() {
                        assert!(
                            running_publishers.insert(topic.clone()),
                            "two running publishers on topic {topic}"
                        );
                    }
                }
            }
            ActionState::Ready => {
                assert!(
                    graph.out_degree(id) > 0,
                    "unconstrained ready action left unscheduled: {action}"
                );
            }
            ActionState::Waiting => {}
        }
    }
}
