use std::io::Write;

use lockstep::config::{ConfigError, LaunchConfig, ReplayMode};
use lockstep::middleware::{ChannelMiddleware, MiddlewareEvent};
use lockstep::model::{Cause, Effect};
use lockstep::orchestrator::Orchestrator;
use lockstep::types::{LogicalTime, Payload};

const TRACKING_CONFIG: &str = r#"{
  "mode": "bag",
  "nodes": {
    "tracker": {
      "inputs": [
        {
          "cause": { "kind": "topic", "topic": "/meas/radar" },
          "effects": [ { "kind": "publish", "topic": "/tracks" } ]
        },
        {
          "cause": { "kind": "timer", "period_ns": 100000000 },
          "effects": [ { "kind": "status" } ]
        }
      ]
    },
    "plausibility": {
      "inputs": [
        {
          "cause": { "kind": "topic", "topic": "/tracks" },
          "effects": [
            { "kind": "publish", "topic": "/verdict" },
            { "kind": "service", "service": "/report" }
          ]
        }
      ]
    }
  },
  "external_inputs": ["/meas/radar"],
  "outputs": ["/verdict"]
}"#;

#[test]
fn launch_config_resolves_into_models() {
    let plan = LaunchConfig::from_json(TRACKING_CONFIG).unwrap().resolve().unwrap();

    assert_eq!(plan.mode, Some(ReplayMode::Bag));
    assert_eq!(plan.external_inputs, vec!["/meas/radar".to_string()]);
    assert_eq!(plan.output_topics, vec!["/verdict".to_string()]);

    // BTreeMap keying: model order is name order.
    assert_eq!(plan.models.len(), 2);
    assert_eq!(plan.models[0].name(), "plausibility");
    assert_eq!(plan.models[1].name(), "tracker");

    let tracker = &plan.models[1];
    assert_eq!(
        tracker.effects_for(&Cause::topic("/meas/radar")),
        Some(&[Effect::publish("/tracks")][..])
    );
    assert_eq!(
        tracker.effects_for(&Cause::timer(100_000_000)),
        Some(&[Effect::status()][..])
    );
    assert_eq!(
        plan.models[0].effects_for(&Cause::topic("/tracks")),
        Some(&[Effect::publish("/verdict"), Effect::service("/report")][..])
    );
}

#[test]
fn remappings_follow_the_interception_scheme() {
    let plan = LaunchConfig::from_json(TRACKING_CONFIG).unwrap().resolve().unwrap();
    let remappings = plan.remappings();

    assert_eq!(remappings.len(), 2);
    assert_eq!(remappings[0].node, "plausibility");
    assert_eq!(remappings[0].canonical, "/tracks");
    assert_eq!(remappings[0].intercepted, "/intercepted/plausibility/sub/tracks");
    assert_eq!(remappings[1].intercepted, "/intercepted/tracker/sub/meas/radar");
}

#[test]
fn unknown_mode_is_rejected() {
    let json = r#"{
      "mode": "realtime",
      "nodes": {
        "x": { "inputs": [ { "cause": { "kind": "topic", "topic": "/a" } } ] }
      }
    }"#;
    let err = LaunchConfig::from_json(json).unwrap().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::UnknownMode(mode) if mode == "realtime"));
}

#[test]
fn duplicate_causes_are_rejected() {
    let json = r#"{
      "nodes": {
        "x": {
          "inputs": [
            { "cause": { "kind": "topic", "topic": "/a" } },
            { "cause": { "kind": "topic", "topic": "/a" } }
          ]
        }
      }
    }"#;
    let err = LaunchConfig::from_json(json).unwrap().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateCause { node, .. } if node == "x"));
}

#[test]
fn nodes_without_inputs_are_rejected() {
    let json = r#"{ "nodes": { "x": { "inputs": [] } } }"#;
    let err = LaunchConfig::from_json(json).unwrap().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::EmptyNode(node) if node == "x"));
}

#[test]
fn external_inputs_must_have_a_subscriber() {
    let json = r#"{
      "nodes": {
        "x": { "inputs": [ { "cause": { "kind": "topic", "topic": "/a" } } ] }
      },
      "external_inputs": ["/nobody"]
    }"#;
    let err = LaunchConfig::from_json(json).unwrap().resolve().unwrap_err();
    assert!(matches!(err, ConfigError::UnusedExternalInput { topic } if topic == "/nobody"));
}

#[test]
fn malformed_documents_fail_to_parse() {
    let err = LaunchConfig::from_json("{ \"nodes\": 3 }").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    // Unknown top-level keys are rejected outright.
    let err = LaunchConfig::from_json(r#"{ "nodes": {}, "extra": true }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

/// A resolved plan is everything an orchestrator needs.
#[tokio::test]
async fn resolved_plans_drive_an_orchestrator() {
    let plan = LaunchConfig::from_json(TRACKING_CONFIG).unwrap().resolve().unwrap();
    let (link, events) = ChannelMiddleware::unbounded();
    let mut orchestrator =
        Orchestrator::new(link, plan.models, plan.external_inputs, plan.output_topics);

    orchestrator.offer_time(LogicalTime::ZERO).unwrap().await.unwrap();
    orchestrator.offer_input("/meas/radar").unwrap().await.unwrap();
    orchestrator
        .handle_message("/meas/radar", Payload::from_static(b"echo"))
        .unwrap();

    match events.try_recv().unwrap() {
        MiddlewareEvent::Message { topic, .. } => {
            assert_eq!(topic, "/intercepted/tracker/sub/meas/radar");
        }
        MiddlewareEvent::Timer { .. } => panic!("no timers fire on the first timestep"),
    }
}

#[test]
fn configs_load_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(TRACKING_CONFIG.as_bytes()).unwrap();

    let plan = LaunchConfig::from_path(file.path()).unwrap().resolve().unwrap();
    assert_eq!(plan.models.len(), 2);

    let err = LaunchConfig::from_path("/nonexistent/launch.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}
