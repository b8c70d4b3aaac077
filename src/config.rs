//! Launch-configuration decoding and validation.
//!
//! A launch configuration is the JSON document the launch tooling and
//! the orchestrator share: per-node declared inputs and effects, the
//! external-input topic set, the observed output topics, and the replay
//! mode of the data source. Decoding is strict — every problem is
//! rejected here, before an [`Orchestrator`](crate::orchestrator::Orchestrator)
//! is ever constructed.
//!
//! # Format
//!
//! ```json
//! {
//!   "mode": "bag",
//!   "nodes": {
//!     "tracker": {
//!       "inputs": [
//!         {
//!           "cause": { "kind": "topic", "topic": "/meas/radar" },
//!           "effects": [ { "kind": "publish", "topic": "/tracks" } ]
//!         }
//!       ]
//!     }
//!   },
//!   "external_inputs": ["/meas/radar"],
//!   "outputs": ["/tracks"]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{Cause, Effect, NodeModel};
use crate::orchestrator::Interception;
use crate::types::TopicName;

/// Problems with a launch configuration. All of them are rejected
/// before initialization; none are recoverable.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown replay mode \"{0}\"")]
    #[diagnostic(
        code(lockstep::config::unknown_mode),
        help("Supported modes are \"bag\" and \"synthetic\".")
    )]
    UnknownMode(String),

    #[error("node \"{node}\" declares input {cause} more than once")]
    #[diagnostic(code(lockstep::config::duplicate_cause))]
    DuplicateCause { node: String, cause: String },

    #[error("node \"{0}\" declares no inputs")]
    #[diagnostic(code(lockstep::config::empty_node))]
    EmptyNode(String),

    #[error("external input \"{topic}\" is not subscribed by any node")]
    #[diagnostic(
        code(lockstep::config::unused_external_input),
        help("An external input with no subscriber can never be admitted; remove it or add a subscribing node.")
    )]
    UnusedExternalInput { topic: TopicName },

    #[error("failed to read launch configuration at {path}")]
    #[diagnostic(code(lockstep::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid launch configuration")]
    #[diagnostic(code(lockstep::config::parse))]
    Parse(#[from] serde_json::Error),
}

/// How the data source produces inputs: replaying a recorded log or
/// generating synthetic data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayMode {
    Bag,
    Synthetic,
}

impl FromStr for ReplayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bag" => Ok(ReplayMode::Bag),
            "synthetic" => Ok(ReplayMode::Synthetic),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum CauseSpec {
    Topic { topic: TopicName },
    Timer { period_ns: u64 },
}

impl From<CauseSpec> for Cause {
    fn from(spec: CauseSpec) -> Self {
        match spec {
            CauseSpec::Topic { topic } => Cause::Topic(topic),
            CauseSpec::Timer { period_ns } => Cause::Timer { period_ns },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EffectSpec {
    Publish { topic: TopicName },
    Status,
    Service { service: String },
}

impl From<EffectSpec> for Effect {
    fn from(spec: EffectSpec) -> Self {
        match spec {
            EffectSpec::Publish { topic } => Effect::Publish(topic),
            EffectSpec::Status => Effect::Status,
            EffectSpec::Service { service } => Effect::Service(service),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InputSection {
    cause: CauseSpec,
    #[serde(default)]
    effects: Vec<EffectSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSection {
    inputs: Vec<InputSection>,
}

/// Raw decoded launch configuration. [`resolve`](Self::resolve) turns
/// it into validated models.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchConfig {
    #[serde(default)]
    mode: Option<String>,
    /// BTreeMap keeps node order deterministic regardless of JSON
    /// object order.
    nodes: BTreeMap<String, NodeSection>,
    #[serde(default)]
    external_inputs: Vec<TopicName>,
    #[serde(default)]
    outputs: Vec<TopicName>,
}

impl LaunchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Validate and convert into the pieces an orchestrator is built
    /// from.
    pub fn resolve(self) -> Result<LaunchPlan, ConfigError> {
        let mode = self
            .mode
            .as_deref()
            .map(ReplayMode::from_str)
            .transpose()?;

        let mut models = Vec::with_capacity(self.nodes.len());
        for (name, section) in self.nodes {
            if section.inputs.is_empty() {
                return Err(ConfigError::EmptyNode(name));
            }
            let mut seen: Vec<Cause> = Vec::new();
            let mut builder = NodeModel::builder(name.as_str());
            for input in section.inputs {
                let cause: Cause = input.cause.into();
                if seen.contains(&cause) {
                    return Err(ConfigError::DuplicateCause {
                        node: name,
                        cause: cause.to_string(),
                    });
                }
                seen.push(cause.clone());
                builder = builder.input(cause, input.effects.into_iter().map(Effect::from));
            }
            models.push(builder.build());
        }

        for topic in &self.external_inputs {
            if !models.iter().any(|model| model.subscribes_to(topic)) {
                return Err(ConfigError::UnusedExternalInput {
                    topic: topic.clone(),
                });
            }
        }

        Ok(LaunchPlan {
            models,
            external_inputs: self.external_inputs,
            output_topics: self.outputs,
            mode,
        })
    }
}

/// A validated launch configuration, ready to construct an
/// orchestrator.
#[derive(Debug)]
pub struct LaunchPlan {
    pub models: Vec<NodeModel>,
    pub external_inputs: Vec<TopicName>,
    pub output_topics: Vec<TopicName>,
    pub mode: Option<ReplayMode>,
}

impl LaunchPlan {
    /// The remappings the launch tooling applies: each subscriber's
    /// canonical topic rewritten onto its dedicated fan-out topic.
    #[must_use]
    pub fn remappings(&self) -> Vec<Interception> {
        Interception::derive_all(&self.models)
    }
}
