//! The orchestration engine: admission gate, scheduler, completion
//! tracker and reconfiguration.
//!
//! The [`Orchestrator`] sits between a data source replaying recorded
//! inputs on a logical clock and a graph of processing nodes whose
//! inter-node topics have been rewritten onto dedicated per-subscriber
//! fan-out topics. It admits one offer at a time ([`offer_input`] /
//! [`offer_time`]), expands each admitted input into rx actions for
//! every modeled subscriber, and releases buffered messages one by one
//! in an order derived from the constraint graph, so that replaying the
//! same inputs twice produces identical publication sequences on every
//! fan-out topic.
//!
//! Everything runs single-threaded and cooperatively: the middleware
//! binding calls [`handle_message`] / [`handle_status`] from its
//! subscription callbacks, the data source awaits admission tickets
//! while the same executor drains those callbacks, and the simulated
//! clock only advances once every callback for the previous instant has
//! observably completed.
//!
//! # Examples
//!
//! ```rust
//! use lockstep::middleware::ChannelMiddleware;
//! use lockstep::model::{Cause, Effect, NodeModel};
//! use lockstep::orchestrator::Orchestrator;
//! use lockstep::types::{LogicalTime, Payload};
//!
//! let detector = NodeModel::builder("detector")
//!     .input(Cause::topic("/camera"), [Effect::publish("/detections")])
//!     .build();
//!
//! let (link, events) = ChannelMiddleware::unbounded();
//! let mut orchestrator = Orchestrator::new(
//!     link,
//!     vec![detector],
//!     vec!["/camera".to_string()],
//!     Vec::new(),
//! );
//!
//! // Clock first, then data; both offers resolve immediately on an
//! // idle graph.
//! let mut ticket = orchestrator.offer_time(LogicalTime::from_millis(100)).unwrap();
//! assert!(ticket.try_recv().is_ok());
//! let mut ticket = orchestrator.offer_input("/camera").unwrap();
//! assert!(ticket.try_recv().is_ok());
//!
//! // The recorded message is released on the detector's fan-out topic.
//! orchestrator
//!     .handle_message("/camera", Payload::from_static(b"frame"))
//!     .unwrap();
//! assert!(events.try_recv().is_ok());
//! ```
//!
//! [`offer_input`]: Orchestrator::offer_input
//! [`offer_time`]: Orchestrator::offer_time
//! [`handle_message`]: Orchestrator::handle_message
//! [`handle_status`]: Orchestrator::handle_status

mod admission;
mod errors;
mod handle;

pub use admission::AdmissionTicket;
pub use errors::OrchestratorError;
pub use handle::SharedOrchestrator;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::oneshot;

use crate::action::{Action, ActionState, EdgeType, RxAction};
use crate::graph::{ActionId, ConstraintGraph};
use crate::middleware::Middleware;
use crate::model::{Effect, NodeModel};
use crate::types::{intercepted_topic, LogicalTime, NodeName, Payload, TopicName, CLOCK_TOPIC};

use admission::{expand_timers, PendingOffer};

/// One `(node, topic)` interception: the canonical topic the
/// orchestrator subscribes to and the dedicated fan-out topic the
/// subscriber has been remapped onto.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interception {
    pub node: NodeName,
    pub canonical: TopicName,
    pub intercepted: TopicName,
}

impl Interception {
    /// Derive every `(node, topic)` interception triple from a model
    /// set, in model/declaration order, deduplicated.
    #[must_use]
    pub fn derive_all(models: &[NodeModel]) -> Vec<Interception> {
        let mut seen: FxHashSet<(NodeName, TopicName)> = FxHashSet::default();
        let mut out = Vec::new();
        for model in models {
            for topic in model.subscribed_topics() {
                if seen.insert((model.name().to_string(), topic.clone())) {
                    out.push(Interception {
                        node: model.name().to_string(),
                        canonical: topic.clone(),
                        intercepted: intercepted_topic(model.name(), topic),
                    });
                }
            }
        }
        out
    }
}

/// Outbound side effect of starting one action; computed under the
/// graph borrow, carried out after it is released.
enum SideEffect {
    Publish { fanout: TopicName, payload: Payload },
    FireTimer { node: NodeName, period_ns: u64, at: LogicalTime },
}

/// The deterministic callback orchestrator.
///
/// Owns the constraint graph, the node models, the single pending offer
/// and the interception publishers (via the [`Middleware`] seam). All
/// methods take `&mut self`; see [`SharedOrchestrator`] for bindings
/// whose callbacks need shared access.
pub struct Orchestrator {
    link: Box<dyn Middleware>,
    models: Vec<NodeModel>,
    external_inputs: FxHashSet<TopicName>,
    output_topics: Vec<TopicName>,
    graph: ConstraintGraph,
    /// Observable effects each running action still owes. An action is
    /// destroyed once this drains: a callback completes when all its
    /// declared effects have been observed, not at the first one.
    running_effects: FxHashMap<ActionId, Vec<Effect>>,
    pending: Option<PendingOffer>,
    simulator_time: Option<LogicalTime>,
    reconfiguration_waiters: Vec<oneshot::Sender<()>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given middleware binding.
    ///
    /// `external_inputs` are topics whose messages originate outside
    /// the modeled graph; `output_topics` are observed for completion
    /// but buffered nowhere.
    pub fn new(
        link: impl Middleware + 'static,
        models: Vec<NodeModel>,
        external_inputs: Vec<TopicName>,
        output_topics: Vec<TopicName>,
    ) -> Self {
        Orchestrator {
            link: Box::new(link),
            models,
            external_inputs: external_inputs.into_iter().collect(),
            output_topics,
            graph: ConstraintGraph::new(),
            running_effects: FxHashMap::default(),
            pending: None,
            simulator_time: None,
            reconfiguration_waiters: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Offer the next data input on `topic` for the current simulator
    /// time.
    ///
    /// The returned ticket resolves once the caller may publish on the
    /// canonical topic; the orchestrator's own subscription then picks
    /// the message up and feeds it into completion tracking. Fails if an
    /// offer is already pending or no timestep has been granted yet.
    pub fn offer_input(
        &mut self,
        topic: impl Into<TopicName>,
    ) -> Result<AdmissionTicket, OrchestratorError> {
        let topic = topic.into();
        if let Some(pending) = &self.pending {
            return Err(OrchestratorError::contract(format!(
                "input offered on {topic} while {pending} is still pending"
            )));
        }
        let Some(now) = self.simulator_time else {
            return Err(OrchestratorError::contract(
                "data source must provide a timestep before the first input",
            ));
        };
        tracing::info!(%topic, time = %now, "data source offers input");

        let (done, ticket) = oneshot::channel();
        self.pending = Some(PendingOffer::Input { topic, done });

        if !self.graph.is_busy() {
            tracing::debug!("no running actions, granting input offer immediately");
            self.grant_pending()?;
            self.process()?;
        }
        Ok(ticket)
    }

    /// Offer the next clock tick, advancing the simulator to `t`.
    ///
    /// The returned ticket resolves once the caller may publish the
    /// tick. Granting expands every timer that fires within the step;
    /// a step spanning more than one fire of the same timer is
    /// [`StepTooLarge`](OrchestratorError::StepTooLarge).
    pub fn offer_time(&mut self, t: LogicalTime) -> Result<AdmissionTicket, OrchestratorError> {
        if let Some(pending) = &self.pending {
            return Err(OrchestratorError::contract(format!(
                "timestep {t} offered while {pending} is still pending"
            )));
        }
        if self.simulator_time.is_some_and(|last| t < last) {
            return Err(OrchestratorError::contract(format!(
                "simulator time must be nondecreasing (offered {t})"
            )));
        }
        tracing::info!(time = %t, "data source offers clock input");

        let (done, ticket) = oneshot::channel();
        self.pending = Some(PendingOffer::Timestep { time: t, done });

        if !self.graph.is_busy() {
            tracing::debug!("no running actions, granting timestep offer immediately");
            self.grant_pending()?;
            self.process()?;
        }
        Ok(ticket)
    }

    // ------------------------------------------------------------------
    // Completion tracking
    // ------------------------------------------------------------------

    /// Feed in a message the binding received on a canonical topic.
    ///
    /// Identifies the running action that published it (or treats it as
    /// an external input), buffers it into the rx actions it feeds,
    /// removes the completed action and schedules whatever became
    /// runnable. Clock ticks are ignored here; time is gated through
    /// [`offer_time`](Self::offer_time) instead.
    pub fn handle_message(
        &mut self,
        topic: &str,
        payload: Payload,
    ) -> Result<(), OrchestratorError> {
        if topic == CLOCK_TOPIC {
            tracing::trace!("ignoring clock tick on the interception path");
            return Ok(());
        }
        tracing::debug!(%topic, "received message on intercepted topic");

        let cause_id = match self.find_running_publisher(topic) {
            Ok(id) => Some(id),
            Err(err) => {
                if self.external_inputs.contains(topic) {
                    None
                } else {
                    return Err(err);
                }
            }
        };

        // External inputs buffer only into the earliest timestep still
        // waiting, so data for future timesteps is never captured early.
        let input_timestep = match cause_id {
            Some(id) => {
                if let Some(action) = self.graph.get(id) {
                    tracing::debug!(
                        node = action.node(),
                        cause = %action.cause(),
                        "message completes a running callback"
                    );
                }
                None
            }
            None => {
                let earliest = self
                    .graph
                    .iter()
                    .filter(|(_, a)| a.state() == ActionState::Waiting && a.is_rx_on(topic))
                    .map(|(_, a)| a.timestamp())
                    .min();
                match earliest {
                    Some(t) => {
                        tracing::debug!(%topic, timestep = %t, "external input");
                        Some(t)
                    }
                    None => {
                        return Err(OrchestratorError::not_found(format!(
                            "an external input on \"{topic}\" (no waiting rx action)"
                        )));
                    }
                }
            }
        };

        let targets: Vec<ActionId> = self
            .graph
            .iter()
            .filter(|(id, action)| {
                if action.state() != ActionState::Waiting || !action.is_rx_on(topic) {
                    return false;
                }
                match cause_id {
                    Some(cause) => self.graph.has_edge(*id, cause, EdgeType::Causality),
                    None => input_timestep == Some(action.timestamp()),
                }
            })
            .map(|(id, _)| id)
            .collect();

        for id in &targets {
            if let Some(rx) = self.graph.get_mut(*id).and_then(Action::as_rx_mut) {
                debug_assert!(rx.payload.is_none());
                rx.payload = Some(payload.clone());
                rx.state = ActionState::Ready;
            }
        }
        tracing::debug!(buffered = targets.len(), "buffered message into waiting rx actions");

        if let Some(cause) = cause_id {
            self.complete_effect(cause, &Effect::Publish(topic.to_string()));
        }
        self.process()
    }

    /// Feed in a callback-finished signal from the status channel.
    ///
    /// Completes the running action at `node` whose declared effects
    /// include a status publication — the only way callbacks without
    /// topic outputs become observable.
    pub fn handle_status(&mut self, node: &str) -> Result<(), OrchestratorError> {
        tracing::debug!(%node, "received status signal");
        let id = self.find_running_status(node)?;
        if let Some(action) = self.graph.get(id) {
            tracing::debug!(cause = %action.cause(), "status completes a running callback");
        }
        self.complete_effect(id, &Effect::Status);
        self.process()
    }

    // ------------------------------------------------------------------
    // Reconfiguration
    // ------------------------------------------------------------------

    /// Atomically swap the node-model set.
    ///
    /// Valid only at quiescence: the graph must be empty and no offer
    /// pending. The binding re-derives [`interceptions`](Self::interceptions)
    /// afterwards.
    pub fn reconfigure(&mut self, models: Vec<NodeModel>) -> Result<(), OrchestratorError> {
        if !self.graph.is_empty() {
            return Err(OrchestratorError::contract(
                "reconfiguration while actions are pending",
            ));
        }
        if self.pending.is_some() {
            return Err(OrchestratorError::contract(
                "reconfiguration while an offer is pending",
            ));
        }
        tracing::info!(models = models.len(), "swapping node models");
        self.models = models;
        Ok(())
    }

    /// A future that resolves once reconfiguration is allowed: graph
    /// empty, no offer pending. Resolves immediately when already
    /// quiescent.
    pub fn wait_until_reconfiguration_allowed(&mut self) -> AdmissionTicket {
        let (done, ticket) = oneshot::channel();
        if self.graph.is_empty() && self.pending.is_none() {
            let _ = done.send(());
        } else {
            self.reconfiguration_waiters.push(done);
        }
        ticket
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Current simulator time; `None` before the first granted timestep.
    #[must_use]
    pub fn simulator_time(&self) -> Option<LogicalTime> {
        self.simulator_time
    }

    /// Whether no actions remain in the graph.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.graph.is_empty()
    }

    #[must_use]
    pub fn graph(&self) -> &ConstraintGraph {
        &self.graph
    }

    #[must_use]
    pub fn models(&self) -> &[NodeModel] {
        &self.models
    }

    /// All `(node, canonical, intercepted)` triples derived from the
    /// current models. The launch tooling rewrites each subscriber's
    /// remappings to the `intercepted` names.
    #[must_use]
    pub fn interceptions(&self) -> Vec<Interception> {
        Interception::derive_all(&self.models)
    }

    /// Canonical topics the binding must subscribe to on the
    /// orchestrator's behalf: every intercepted input plus the declared
    /// output topics. The status channel is separate.
    #[must_use]
    pub fn observed_topics(&self) -> Vec<TopicName> {
        let mut seen: FxHashSet<TopicName> = FxHashSet::default();
        let mut out = Vec::new();
        for model in &self.models {
            for topic in model.subscribed_topics() {
                if seen.insert(topic.clone()) {
                    out.push(topic.clone());
                }
            }
        }
        for topic in &self.output_topics {
            if seen.insert(topic.clone()) {
                out.push(topic.clone());
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Scheduling internals
    // ------------------------------------------------------------------

    /// Run every action whose constraints have cleared, then grant the
    /// pending offer if it has become admissible. Publication (and the
    /// timer hook) is the only side effect here; removal is driven
    /// solely by completion events.
    fn process(&mut self) -> Result<(), OrchestratorError> {
        tracing::debug!(actions = self.graph.len(), "processing constraint graph");
        loop {
            let mut progressed = true;
            while progressed {
                progressed = false;
                for id in self.graph.runnable() {
                    self.start_action(id)?;
                    progressed = true;
                }
            }

            if self.pending.is_some() && self.ready_for_pending() {
                tracing::debug!("ready for the offered input, granting");
                self.grant_pending()?;
                continue;
            }
            break;
        }

        if self.graph.is_empty() && self.pending.is_none() {
            self.flush_reconfiguration_waiters();
        }
        Ok(())
    }

    fn start_action(&mut self, id: ActionId) -> Result<(), OrchestratorError> {
        let Some(action) = self.graph.get(id) else {
            return Ok(());
        };
        // Snapshot the observable effects this callback owes before it
        // runs; service calls are side effects the orchestrator cannot
        // observe, so they never gate completion.
        let node = action.node().to_string();
        let cause = action.cause();
        let owed: Vec<Effect> = self
            .model_by_name(&node)?
            .effects_for(&cause)
            .unwrap_or_default()
            .iter()
            .filter(|effect| !matches!(effect, Effect::Service(_)))
            .cloned()
            .collect();

        let Some(action) = self.graph.get_mut(id) else {
            return Ok(());
        };
        let side_effect = match action {
            Action::Rx(rx) => {
                let Some(payload) = rx.payload.clone() else {
                    return Err(OrchestratorError::contract(format!(
                        "ready rx action for {} at {} has no buffered payload",
                        rx.topic, rx.node
                    )));
                };
                rx.state = ActionState::Running;
                SideEffect::Publish {
                    fanout: intercepted_topic(&rx.node, &rx.topic),
                    payload,
                }
            }
            Action::Timer(timer) => {
                timer.state = ActionState::Running;
                SideEffect::FireTimer {
                    node: timer.node.clone(),
                    period_ns: timer.period_ns,
                    at: timer.timestamp,
                }
            }
        };
        self.running_effects.insert(id, owed);
        match side_effect {
            SideEffect::Publish { fanout, payload } => {
                tracing::debug!(topic = %fanout, "action unconstrained and ready, releasing message");
                self.link.publish(&fanout, payload)?;
            }
            SideEffect::FireTimer { node, period_ns, at } => {
                tracing::debug!(%node, period_ns, at = %at, "clearing timer callback to fire");
                self.link.fire_timer(&node, period_ns, at)?;
            }
        }
        Ok(())
    }

    /// Whether the pending offer can be granted. Timesteps always can
    /// (timer coalescing across empty steps is accepted); an input can
    /// once no waiting or ready rx action on its topic remains.
    fn ready_for_pending(&self) -> bool {
        match &self.pending {
            None => false,
            Some(PendingOffer::Timestep { .. }) => true,
            Some(PendingOffer::Input { topic, .. }) => !self.graph.has_pending_rx_on(topic),
        }
    }

    fn grant_pending(&mut self) -> Result<(), OrchestratorError> {
        let Some(offer) = self.pending.take() else {
            return Err(OrchestratorError::contract(
                "no pending offer to grant",
            ));
        };
        match offer {
            PendingOffer::Input { topic, done } => {
                let Some(now) = self.simulator_time else {
                    return Err(OrchestratorError::contract(
                        "input granted before the first timestep",
                    ));
                };
                tracing::info!(%topic, time = %now, "requesting offered input");
                self.add_topic_input(now, &topic)?;
                let _ = done.send(());
            }
            PendingOffer::Timestep { time, done } => {
                tracing::info!(time = %time, "requesting offered clock input");
                // The first granted timestep only initializes the
                // clock; timers start counting from there.
                if let Some(last) = self.simulator_time {
                    for timer in expand_timers(&self.models, last, time)? {
                        self.add_action_and_effects(Action::Timer(timer), None)?;
                    }
                }
                self.simulator_time = Some(time);
                let _ = done.send(());
            }
        }
        Ok(())
    }

    /// Insert a waiting rx action at every node that models `topic` as
    /// an input, each with its downstream effects.
    fn add_topic_input(&mut self, t: LogicalTime, topic: &str) -> Result<(), OrchestratorError> {
        let receivers: Vec<NodeName> = self
            .models
            .iter()
            .filter(|model| model.subscribes_to(topic))
            .map(|model| model.name().to_string())
            .collect();
        tracing::debug!(%topic, receivers = receivers.len(), "expanding input into rx actions");
        for node in receivers {
            self.add_action_and_effects(
                Action::Rx(RxAction::waiting(node, topic.to_string(), t)),
                None,
            )?;
        }
        Ok(())
    }

    /// Insert `action` with its derived ordering edges, then recursively
    /// insert a waiting rx action for every subscriber of every topic it
    /// will publish. `parent` is the publishing action for rx actions
    /// that are not graph inputs.
    fn add_action_and_effects(
        &mut self,
        action: Action,
        parent: Option<ActionId>,
    ) -> Result<ActionId, OrchestratorError> {
        let cause = action.cause();
        let node = action.node().to_string();
        let timestamp = action.timestamp();

        let effects: Vec<Effect> = self
            .model_by_name(&node)?
            .effects_for(&cause)
            .ok_or_else(|| {
                OrchestratorError::contract(format!(
                    "node \"{node}\" has no declared input for {cause}"
                ))
            })?
            .to_vec();
        let publishes: Vec<TopicName> = effects
            .iter()
            .filter_map(Effect::published_topic)
            .cloned()
            .collect();

        let id = self.graph.insert(action, &publishes, parent);

        for topic in &publishes {
            let subscribers: Vec<NodeName> = self
                .models
                .iter()
                .filter(|model| model.subscribes_to(topic))
                .map(|model| model.name().to_string())
                .collect();
            for subscriber in subscribers {
                self.add_action_and_effects(
                    Action::Rx(RxAction::waiting(subscriber, topic.clone(), timestamp)),
                    Some(id),
                )?;
            }
        }
        Ok(id)
    }

    /// The unique running action that still owes a publication on
    /// `topic`. Duplicate completions find nothing here and fail loudly
    /// instead of being silently accepted.
    fn find_running_publisher(&self, topic: &str) -> Result<ActionId, OrchestratorError> {
        for (id, action) in self.graph.iter() {
            if action.state() != ActionState::Running {
                continue;
            }
            let owes_topic = self.running_effects.get(&id).is_some_and(|owed| {
                owed.iter()
                    .any(|effect| effect.published_topic().is_some_and(|t| t == topic))
            });
            if owes_topic {
                return Ok(id);
            }
        }
        Err(OrchestratorError::not_found(format!(
            "a publication on \"{topic}\""
        )))
    }

    /// The unique running action at `node` that still owes a status
    /// publication.
    fn find_running_status(&self, node: &str) -> Result<ActionId, OrchestratorError> {
        for (id, action) in self.graph.iter() {
            if action.state() != ActionState::Running || action.node() != node {
                continue;
            }
            let owes_status = self
                .running_effects
                .get(&id)
                .is_some_and(|owed| owed.contains(&Effect::Status));
            if owes_status {
                return Ok(id);
            }
        }
        Err(OrchestratorError::not_found(format!(
            "a status signal from node \"{node}\""
        )))
    }

    /// Mark one observed effect of a running action; destroy the action
    /// once every observable effect has been seen.
    fn complete_effect(&mut self, id: ActionId, effect: &Effect) {
        if let Some(owed) = self.running_effects.get_mut(&id) {
            if let Some(position) = owed.iter().position(|e| e == effect) {
                owed.remove(position);
            }
            if owed.is_empty() {
                self.running_effects.remove(&id);
                self.graph.remove(id);
            }
        }
    }

    fn model_by_name(&self, name: &str) -> Result<&NodeModel, OrchestratorError> {
        self.models
            .iter()
            .find(|model| model.name() == name)
            .ok_or_else(|| OrchestratorError::UnknownNode {
                node: name.to_string(),
            })
    }

    fn flush_reconfiguration_waiters(&mut self) {
        for waiter in self.reconfiguration_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}
