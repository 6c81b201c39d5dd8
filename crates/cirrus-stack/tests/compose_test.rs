//! End-to-end tests for stack composition.
//!
//! These tests drive the full pipeline from a configuration file:
//! 1. Load YAML configuration
//! 2. Package the build output
//! 3. Declare and resolve the resource graph
//! 4. Synthesize the document
//! 5. Persist and reload stack state

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::{Path, PathBuf};

use cirrus_artifact::Packager;
use cirrus_common::config::StackConfig;
use cirrus_common::error::CirrusError;
use cirrus_graph::node::{OutputValue, ResourceKind};
use cirrus_graph::value::{Reference, Value};
use cirrus_stack::state::StackState;
use cirrus_stack::{App, Synthesis, compose};

fn write_build(root: &Path, body: &str) -> PathBuf {
    let build = root.join("build");
    std::fs::create_dir_all(&build).expect("mkdir build");
    std::fs::write(build.join("index.js"), body).expect("write handler");
    build
}

fn write_config(root: &Path, extra: &str) -> PathBuf {
    let path = root.join("stack.yaml");
    let yaml = format!(
        "path: ./build\nruntime: runtime14\nstageName: prod\nversion: v1.0.0\n{extra}"
    );
    std::fs::write(&path, yaml).expect("write config");
    path
}

fn example_config(root: &Path) -> StackConfig {
    let _ = write_build(root, "exports.handler = async () => ({ statusCode: 200 });");
    StackConfig::load(&write_config(root, "handler: index.handler\n")).expect("load config")
}

fn position(synthesis: &Synthesis, id: &str) -> usize {
    synthesis
        .order
        .iter()
        .position(|n| n.as_str() == id)
        .unwrap_or_else(|| panic!("{id} missing from order"))
}

fn attribute<'a>(synthesis: &'a Synthesis, id: &str, name: &str) -> &'a Value {
    synthesis
        .graph
        .get(id)
        .and_then(|n| n.attribute(name))
        .unwrap_or_else(|| panic!("{id}.{name} missing"))
}

fn reference(target: &str, output: &str) -> Value {
    let id = cirrus_common::types::ResourceId::new(target).expect("id");
    Value::Ref(Reference::new(&id, output))
}

// ── Determinism ──────────────────────────────────────────────────────

#[test]
fn composing_twice_yields_identical_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = example_config(dir.path());
    let packager = Packager::new(dir.path().join("cirrus.out"));
    let mut state = StackState::new("prod");

    let first = compose("prod", &config, &mut state, &packager).expect("first");
    let second = compose("prod", &config, &mut state, &packager).expect("second");

    assert_eq!(first.order, second.order);
    assert_eq!(first.graph.edges(), second.graph.edges());
    assert_eq!(
        first.document.body_json().expect("json"),
        second.document.body_json().expect("json")
    );
    assert_ne!(
        first.document.metadata.synthesis_id,
        second.document.metadata.synthesis_id
    );
}

#[test]
fn persisted_state_reproduces_names_in_new_process() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = example_config(dir.path());
    let packager = Packager::new(dir.path().join("cirrus.out"));
    let state_path = dir.path().join("cirrus.out/prod.state.json");

    let mut state = StackState::load_or_new(&state_path, "prod").expect("load");
    let first = compose("prod", &config, &mut state, &packager).expect("first");
    state.save(&state_path).expect("save");

    let mut reloaded = StackState::load_or_new(&state_path, "prod").expect("reload");
    let second = compose("prod", &config, &mut reloaded, &packager).expect("second");

    assert_eq!(
        attribute(&first, "bucket", "bucket"),
        attribute(&second, "bucket", "bucket")
    );
    assert_eq!(
        first.document.body_json().expect("json"),
        second.document.body_json().expect("json")
    );
}

// ── Validation ───────────────────────────────────────────────────────

#[test]
fn missing_handler_fails_before_packaging() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _ = write_build(dir.path(), "exports.handler = 1;");
    let config = StackConfig::load(&write_config(dir.path(), "")).expect("load config");
    let out = dir.path().join("cirrus.out");
    let mut state = StackState::new("prod");

    let err = compose("prod", &config, &mut state, &Packager::new(&out)).unwrap_err();
    match err {
        CirrusError::Validation {
            resource, field, ..
        } => {
            assert_eq!(resource, "function");
            assert_eq!(field, "handler");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists(), "no archive may be written");
    assert!(state.identity_token.is_none());
    assert!(state.secrets.is_empty());
}

#[test]
fn blank_artifact_path_does_not_package_config_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let _ = write_build(dir.path(), "exports.handler = 1;");
    let path = dir.path().join("stack.yaml");
    std::fs::write(
        &path,
        "path: \"\"\nhandler: index.handler\nruntime: runtime14\nstageName: prod\nversion: v1\n",
    )
    .expect("write config");
    let config = StackConfig::load(&path).expect("load config");
    let out = dir.path().join("cirrus.out");

    let err = compose("prod", &config, &mut StackState::new("prod"), &Packager::new(&out))
        .unwrap_err();
    match err {
        CirrusError::Validation {
            resource, field, ..
        } => {
            assert_eq!(resource, "lambda-archive");
            assert_eq!(field, "path");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists(), "no archive may be written");
}

#[test]
fn missing_build_output_is_packaging_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        StackConfig::load(&write_config(dir.path(), "handler: index.handler\n")).expect("load");
    let err = compose(
        "prod",
        &config,
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .unwrap_err();
    assert!(matches!(err, CirrusError::Packaging { .. }), "got: {err}");
}

// ── Graph shape ──────────────────────────────────────────────────────

#[test]
fn every_edge_points_backwards_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synthesis = compose(
        "prod",
        &example_config(dir.path()),
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .expect("compose");

    assert_eq!(synthesis.order.len(), synthesis.graph.len());
    for edge in synthesis.graph.edges() {
        assert!(
            position(&synthesis, edge.to.as_str()) < position(&synthesis, edge.from.as_str()),
            "{} must follow {}",
            edge.from,
            edge.to
        );
    }
    assert!(position(&synthesis, "db-password") < position(&synthesis, "db"));
    assert!(position(&synthesis, "db") < position(&synthesis, "function"));
    assert!(position(&synthesis, "lambda-archive") < position(&synthesis, "function"));
    assert!(position(&synthesis, "function") < position(&synthesis, "api-gw"));
    assert!(position(&synthesis, "api-gw") < position(&synthesis, "apigw-lambda"));
}

#[test]
fn database_accepts_only_function_security_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synthesis = compose(
        "prod",
        &example_config(dir.path()),
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .expect("compose");

    let ingress = attribute(&synthesis, "db-sg", "ingress")
        .as_list()
        .expect("ingress list");
    assert_eq!(ingress.len(), 1);
    let rule = ingress[0].as_map().expect("rule map");
    assert_eq!(rule["protocol"], Value::from("tcp"));
    assert_eq!(rule["from_port"], Value::Integer(5432));
    assert_eq!(rule["to_port"], Value::Integer(5432));
    assert_eq!(rule["cidr_blocks"], Value::List(Vec::new()));
    assert_eq!(
        rule["security_groups"],
        Value::List(vec![reference("lambda-sg", "id")])
    );
}

#[test]
fn function_is_wired_by_reference() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synthesis = compose(
        "prod",
        &example_config(dir.path()),
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .expect("compose");

    assert_eq!(attribute(&synthesis, "function", "s3_bucket"), &reference("bucket", "bucket"));
    assert_eq!(attribute(&synthesis, "function", "s3_key"), &reference("lambda-archive", "key"));
    assert_eq!(attribute(&synthesis, "function", "role"), &reference("lambda-exec", "arn"));
    assert_eq!(attribute(&synthesis, "function", "handler"), &Value::from("index.handler"));

    let variables = attribute(&synthesis, "function", "environment")
        .as_map()
        .and_then(|env| env["variables"].as_map())
        .expect("variables");
    assert_eq!(variables["DB_URL"], reference("db", "address"));
    assert_eq!(variables["DB_PORT"], reference("db", "port"));
    assert_eq!(variables["DB_PASSWORD"], reference("db-password", "result"));

    let key = synthesis
        .graph
        .get("lambda-archive")
        .and_then(|n| n.outputs().get("key"))
        .expect("archive key");
    assert_eq!(
        key,
        &OutputValue::Known(Value::from(synthesis.artifact.storage_key()))
    );
}

#[test]
fn url_output_points_at_gateway_endpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synthesis = compose(
        "prod",
        &example_config(dir.path()),
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .expect("compose");

    assert_eq!(synthesis.output("url"), Some(&reference("api-gw", "api_endpoint")));
    assert!(!synthesis.document.body.outputs["url"].sensitive);
    let url = synthesis.graph.get("url").expect("url node");
    assert_eq!(url.kind(), ResourceKind::Output);
    assert_eq!(
        url.outputs()["value"],
        OutputValue::Deferred { sensitive: false }
    );
}

// ── Secrets ──────────────────────────────────────────────────────────

#[test]
fn secret_consumers_are_flagged_sensitive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synthesis = compose(
        "prod",
        &example_config(dir.path()),
        &mut StackState::new("prod"),
        &Packager::new(dir.path().join("cirrus.out")),
    )
    .expect("compose");

    let json: serde_json::Value =
        serde_json::from_str(&synthesis.document.body_json().expect("json")).expect("parse");
    let resources = json["resources"].as_array().expect("resources");
    let sensitive = |id: &str| {
        resources
            .iter()
            .find(|r| r["id"] == id)
            .map(|r| r["sensitive_attributes"].clone())
            .expect("resource")
    };
    assert_eq!(sensitive("db"), serde_json::json!(["password"]));
    assert_eq!(
        sensitive("function"),
        serde_json::json!(["environment.variables.DB_PASSWORD"])
    );
    assert_eq!(sensitive("api-gw"), serde_json::json!([]));

    let secret = resources
        .iter()
        .find(|r| r["id"] == "db-password")
        .expect("secret");
    assert_eq!(secret["outputs"]["result"]["state"], "deferred");
    assert_eq!(secret["outputs"]["result"]["value"]["sensitive"], true);
}

// ── Multiple stacks ──────────────────────────────────────────────────

#[test]
fn alpha_and_beta_share_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = example_config(dir.path());
    let mut app = App::new(Packager::new(dir.path().join("cirrus.out")));
    app.add_stack("alpha", config.clone(), StackState::new("alpha"))
        .expect("alpha");
    app.add_stack("beta", config, StackState::new("beta"))
        .expect("beta");

    let syntheses = app.synth_all().expect("synth");
    let (alpha, beta) = (&syntheses[0], &syntheses[1]);

    assert_eq!(alpha.artifact.content_hash, beta.artifact.content_hash);
    assert_ne!(
        attribute(alpha, "db-password", "keepers"),
        attribute(beta, "db-password", "keepers")
    );
    assert_ne!(
        attribute(alpha, "function", "function_name"),
        attribute(beta, "function", "function_name")
    );
    assert_eq!(
        alpha.document.metadata.stack, "alpha",
        "metadata names the stack"
    );
    assert_eq!(beta.document.metadata.stack, "beta");
}
