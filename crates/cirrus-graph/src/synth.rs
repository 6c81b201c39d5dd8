//! Synthesized stack document handed to the provisioning engine.
//!
//! The document lists resources in resolution order together with their
//! attributes, dependency edges, and declared outputs. Only the
//! [`Metadata`] block changes between two syntheses of the same input.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::ResourceId;
use serde::Serialize;
use uuid::Uuid;

use crate::graph::{Edge, StackGraph};
use crate::node::{OutputValue, ResourceKind};
use crate::value::Value;

/// Audit information stamped on every synthesis.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    /// Version of the document format.
    pub format_version: u32,
    /// Producing tool and version.
    pub tool: String,
    /// Stack name.
    pub stack: String,
    /// Identity token used for globally unique names.
    pub identity_token: String,
    /// Unique id of this synthesis run.
    pub synthesis_id: Uuid,
    /// Time of synthesis.
    pub synthesized_at: DateTime<Utc>,
}

impl Metadata {
    /// Stamps a new synthesis of `stack`.
    #[must_use]
    pub fn new(stack: impl Into<String>, identity_token: impl Into<String>) -> Self {
        Self {
            format_version: cirrus_common::constants::DOCUMENT_FORMAT_VERSION,
            tool: format!(
                "{}/{}",
                cirrus_common::constants::APP_NAME,
                env!("CARGO_PKG_VERSION")
            ),
            stack: stack.into(),
            identity_token: identity_token.into(),
            synthesis_id: Uuid::new_v4(),
            synthesized_at: Utc::now(),
        }
    }
}

/// Provider settings shared by all resources of the stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provider {
    /// Provider name.
    pub name: String,
    /// Region every resource is placed in.
    pub region: String,
}

/// One resource as emitted in the document.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceEntry {
    /// Resource id.
    pub id: ResourceId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Declared attributes, references rendered as `${id.output}`.
    pub attributes: BTreeMap<String, Value>,
    /// Direct dependencies, in declaration order.
    pub depends_on: Vec<ResourceId>,
    /// Attribute paths carrying write-only values.
    pub sensitive_attributes: Vec<String>,
    /// Outputs as resolved at synthesis time.
    pub outputs: BTreeMap<String, OutputValue>,
}

/// A declared stack output.
#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    /// Output expression.
    pub value: Value,
    /// Whether the engine must redact the value.
    pub sensitive: bool,
}

/// Deterministic part of the document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentBody {
    /// Provider settings.
    pub provider: Provider,
    /// Resources in resolution order.
    pub resources: Vec<ResourceEntry>,
    /// Dependency edges.
    pub edges: Vec<Edge>,
    /// Declared outputs by name.
    pub outputs: BTreeMap<String, OutputEntry>,
}

/// Complete synthesized document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Audit metadata.
    pub metadata: Metadata,
    /// Resources, edges, and outputs.
    #[serde(flatten)]
    pub body: DocumentBody,
}

impl Document {
    /// Builds the document for a resolved `graph` in `order`.
    #[must_use]
    pub fn build(
        graph: &StackGraph,
        order: &[ResourceId],
        provider: Provider,
        metadata: Metadata,
    ) -> Self {
        let resources = order
            .iter()
            .filter_map(|id| graph.node(id))
            .map(|node| ResourceEntry {
                id: node.id().clone(),
                kind: node.kind(),
                attributes: node.attributes().clone(),
                depends_on: graph.dependencies_of(node.id()),
                sensitive_attributes: graph.sensitive_attributes(node),
                outputs: node.outputs().clone(),
            })
            .collect();

        let outputs = graph
            .nodes()
            .iter()
            .filter(|node| node.kind() == ResourceKind::Output)
            .filter_map(|node| {
                let value = node.attribute("value")?.clone();
                let sensitive = !graph.sensitive_attributes(node).is_empty();
                Some((node.id().to_string(), OutputEntry { value, sensitive }))
            })
            .collect();

        Self {
            metadata,
            body: DocumentBody {
                provider,
                resources,
                edges: graph.edges(),
                outputs,
            },
        }
    }

    /// Serializes the full document as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serializes everything except the metadata block.
    ///
    /// Two syntheses of the same input produce identical bytes here.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn body_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.body)?)
    }

    /// Writes the document to `path` atomically, creating the parent
    /// directory if needed. A reader never sees a partially written file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| CirrusError::io(dir, e))?;

        let mut staging =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| CirrusError::io(dir, e))?;
        staging
            .write_all(json.as_bytes())
            .map_err(|e| CirrusError::io(staging.path(), e))?;
        let _ = staging
            .persist(path)
            .map_err(|e| CirrusError::io(path, e.error))?;
        tracing::info!(path = %path.display(), "synthesized document written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Attributes, ResourceNode};
    use crate::value::Reference;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).expect("valid id")
    }

    fn sample_graph() -> (StackGraph, Vec<ResourceId>) {
        let mut graph = StackGraph::new("demo");
        let _ = graph
            .add(
                ResourceNode::new(
                    id("password"),
                    ResourceKind::Secret,
                    Attributes::new().with("length", 16_u16),
                )
                .expect("valid"),
            )
            .expect("add");
        let _ = graph
            .add(
                ResourceNode::new(
                    id("url"),
                    ResourceKind::Output,
                    Attributes::new().with("value", "https://example.test"),
                )
                .expect("valid"),
            )
            .expect("add");
        let _ = graph
            .add(
                ResourceNode::new(
                    id("leaked"),
                    ResourceKind::Output,
                    Attributes::new().with("value", Reference::new(&id("password"), "result")),
                )
                .expect("valid"),
            )
            .expect("add");
        graph.grant(&id("password"), &id("leaked"));
        let order = graph.resolve().expect("resolve");
        (graph, order)
    }

    fn provider() -> Provider {
        Provider {
            name: "aws".into(),
            region: "eu-west-1".into(),
        }
    }

    #[test]
    fn document_lists_resources_in_order_with_outputs() {
        let (graph, order) = sample_graph();
        let doc = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        assert_eq!(doc.body.resources.len(), 3);
        assert_eq!(doc.body.outputs.len(), 2);
        assert!(!doc.body.outputs["url"].sensitive);
        assert!(doc.body.outputs["leaked"].sensitive);
    }

    #[test]
    fn sensitive_reference_is_flagged_not_inlined() {
        let (graph, order) = sample_graph();
        let doc = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        let leaked = doc
            .body
            .resources
            .iter()
            .find(|r| r.id.as_str() == "leaked")
            .expect("leaked");
        assert_eq!(leaked.sensitive_attributes, vec!["value"]);

        let json = doc.to_json().expect("json");
        assert!(json.contains("${password.result}"));
    }

    #[test]
    fn every_resource_carries_sensitive_attribute_list() {
        let (graph, order) = sample_graph();
        let doc = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        let json: serde_json::Value =
            serde_json::from_str(&doc.body_json().expect("json")).expect("parse");
        let resources = json["resources"].as_array().expect("resources");
        let url = resources.iter().find(|r| r["id"] == "url").expect("url");
        assert_eq!(url["sensitive_attributes"], serde_json::json!([]));
        let leaked = resources.iter().find(|r| r["id"] == "leaked").expect("leaked");
        assert_eq!(leaked["sensitive_attributes"], serde_json::json!(["value"]));
    }

    #[test]
    fn body_is_identical_across_syntheses() {
        let (graph, order) = sample_graph();
        let first = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        let second = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        assert_ne!(first.metadata.synthesis_id, second.metadata.synthesis_id);
        assert_eq!(
            first.body_json().expect("json"),
            second.body_json().expect("json")
        );
    }

    #[test]
    fn write_to_creates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (graph, order) = sample_graph();
        let doc = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        let path = dir.path().join("demo.stack.json");
        doc.write_to(&path).expect("write");
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(written["metadata"]["stack"], "demo");
        assert_eq!(written["provider"]["region"], "eu-west-1");
    }

    #[test]
    fn write_to_replaces_existing_file_without_leftovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/demo.stack.json");
        let (graph, order) = sample_graph();
        let first = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        let second = Document::build(&graph, &order, provider(), Metadata::new("demo", "calm-otter"));
        first.write_to(&path).expect("first write");
        second.write_to(&path).expect("second write");

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(
            written["metadata"]["synthesis_id"],
            second.metadata.synthesis_id.to_string()
        );
        let files = std::fs::read_dir(dir.path().join("nested")).expect("read dir").count();
        assert_eq!(files, 1);
    }
}
