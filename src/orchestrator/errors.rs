//! Fatal orchestration errors.
//!
//! Every error here is terminal for the replay: determinism is preferred
//! to liveness, so there are no local retries and no recovery paths. The
//! driving process is expected to surface the diagnostic and stop.

use miette::Diagnostic;
use thiserror::Error;

use crate::middleware::MiddlewareError;
use crate::types::{LogicalTime, NodeName};

/// Errors that can occur while orchestrating a replay.
#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    /// The data source broke the admission protocol: a second offer
    /// while one is pending, data before the first timestep, or a
    /// reconfiguration while actions are in flight.
    #[error("contract violation: {reason}")]
    #[diagnostic(
        code(lockstep::orchestrator::contract),
        help("The data source must await each admission future before the next offer, provide a timestep before any data, and reconfigure only at quiescence.")
    )]
    ContractViolation { reason: String },

    /// A granted timestep would require firing one timer more than once.
    #[error("timestep too large: {from} -> {to} spans multiple fires of a {period_ns}ns timer")]
    #[diagnostic(
        code(lockstep::orchestrator::step_too_large),
        help("Step the clock at sub-period granularity so every timer fires at most once per advance.")
    )]
    StepTooLarge {
        from: LogicalTime,
        to: LogicalTime,
        period_ns: u64,
    },

    /// A publication or status signal matched no running action. This is
    /// also how an undeclared effect manifests: a node that publishes a
    /// topic absent from its model has no running action to account for
    /// it.
    #[error("no running action accounts for {what}")]
    #[diagnostic(
        code(lockstep::orchestrator::action_not_found),
        help("Check the node models: every output a node emits at runtime must be declared as an effect of some input.")
    )]
    ActionNotFound { what: String },

    /// A completion or model lookup referenced a node with no model.
    #[error("no model for node \"{node}\"")]
    #[diagnostic(code(lockstep::orchestrator::unknown_node))]
    UnknownNode { node: NodeName },

    /// The middleware binding failed to carry out a scheduled side
    /// effect.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Middleware(#[from] MiddlewareError),
}

impl OrchestratorError {
    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        OrchestratorError::ContractViolation {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        OrchestratorError::ActionNotFound { what: what.into() }
    }
}
