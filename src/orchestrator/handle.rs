//! Shared handle for bindings whose callbacks need joint access.
//!
//! The orchestrator itself is `&mut self` throughout. Real bindings
//! usually have two parties poking at it — the data source awaiting
//! admission tickets and the subscription callbacks feeding completions
//! back — so this wraps it in `Arc<parking_lot::Mutex<_>>` and mirrors
//! the public surface. Locks are held only across the synchronous calls,
//! never across awaits, which keeps the single-executor cooperative
//! model intact.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::model::NodeModel;
use crate::types::{LogicalTime, Payload, TopicName};

use super::admission::AdmissionTicket;
use super::errors::OrchestratorError;
use super::{Interception, Orchestrator};

/// Cloneable, lock-guarded handle to an [`Orchestrator`].
#[derive(Clone)]
pub struct SharedOrchestrator {
    inner: Arc<Mutex<Orchestrator>>,
}

impl SharedOrchestrator {
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        SharedOrchestrator {
            inner: Arc::new(Mutex::new(orchestrator)),
        }
    }

    /// See [`Orchestrator::offer_input`].
    pub fn offer_input(
        &self,
        topic: impl Into<TopicName>,
    ) -> Result<AdmissionTicket, OrchestratorError> {
        self.inner.lock().offer_input(topic)
    }

    /// See [`Orchestrator::offer_time`].
    pub fn offer_time(&self, t: LogicalTime) -> Result<AdmissionTicket, OrchestratorError> {
        self.inner.lock().offer_time(t)
    }

    /// See [`Orchestrator::handle_message`].
    pub fn handle_message(&self, topic: &str, payload: Payload) -> Result<(), OrchestratorError> {
        self.inner.lock().handle_message(topic, payload)
    }

    /// See [`Orchestrator::handle_status`].
    pub fn handle_status(&self, node: &str) -> Result<(), OrchestratorError> {
        self.inner.lock().handle_status(node)
    }

    /// See [`Orchestrator::reconfigure`].
    pub fn reconfigure(&self, models: Vec<NodeModel>) -> Result<(), OrchestratorError> {
        self.inner.lock().reconfigure(models)
    }

    /// See [`Orchestrator::wait_until_reconfiguration_allowed`].
    pub fn wait_until_reconfiguration_allowed(&self) -> AdmissionTicket {
        self.inner.lock().wait_until_reconfiguration_allowed()
    }

    #[must_use]
    pub fn simulator_time(&self) -> Option<LogicalTime> {
        self.inner.lock().simulator_time()
    }

    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.inner.lock().is_quiescent()
    }

    #[must_use]
    pub fn interceptions(&self) -> Vec<Interception> {
        self.inner.lock().interceptions()
    }

    /// Direct access for anything not mirrored here. The guard must not
    /// be held across an await.
    pub fn lock(&self) -> MutexGuard<'_, Orchestrator> {
        self.inner.lock()
    }
}
