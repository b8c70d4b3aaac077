//! Admission offers and timer expansion.
//!
//! The data source never publishes directly: it *offers* the next data
//! input or clock tick and awaits the returned ticket. The orchestrator
//! grants at most one pending offer, and only once the graph can accept
//! it without breaking ordering.

use std::fmt;

use tokio::sync::oneshot;

use crate::action::TimerAction;
use crate::model::NodeModel;
use crate::types::{LogicalTime, TopicName};

use super::errors::OrchestratorError;

/// Future returned by the offer entry points. Resolves when the caller
/// may publish; dropping it instead leaves the orchestrator stuck by
/// design.
pub type AdmissionTicket = oneshot::Receiver<()>;

/// The single outstanding offer from the data source.
pub(crate) enum PendingOffer {
    /// Data on `topic` for the current simulator time.
    Input {
        topic: TopicName,
        done: oneshot::Sender<()>,
    },
    /// A clock tick advancing the simulator to `time`.
    Timestep {
        time: LogicalTime,
        done: oneshot::Sender<()>,
    },
}

impl fmt::Display for PendingOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingOffer::Input { topic, .. } => write!(f, "input on {topic}"),
            PendingOffer::Timestep { time, .. } => write!(f, "timestep {time}"),
        }
    }
}

/// Compute the timer actions implied by advancing the clock from `last`
/// to `t`.
///
/// Every timer input of every model is considered. A timer with period
/// `P` fires next at `ceil((last+1)/P)·P` — timers do not fire at time
/// zero. If more than one fire of the same timer lands in `(last, t]`
/// the step is rejected: the caller's contract is to advance at
/// sub-period granularity.
pub(crate) fn expand_timers(
    models: &[NodeModel],
    last: LogicalTime,
    t: LogicalTime,
) -> Result<Vec<TimerAction>, OrchestratorError> {
    let last_ns = last.as_nanos();
    let t_ns = t.as_nanos();
    let mut expected = Vec::new();

    for model in models {
        for period_ns in model.timer_periods() {
            let fires = t_ns / period_ns - last_ns / period_ns;
            if fires > 1 {
                return Err(OrchestratorError::StepTooLarge {
                    from: last,
                    to: t,
                    period_ns,
                });
            }
            if fires == 1 {
                expected.push(TimerAction::ready(model.name(), period_ns, t));
            }
        }
    }
    Ok(expected)
}
