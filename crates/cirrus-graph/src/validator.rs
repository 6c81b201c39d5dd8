//! Static analysis of a stack graph before it is ordered.
//!
//! Checks for dangling references, references to outputs the target does
//! not export, and unauthorized reads of sensitive outputs.

use cirrus_common::error::{CirrusError, Result};

use crate::graph::StackGraph;

/// Validates every reference declared in `graph`.
///
/// # Checks performed
///
/// 1. Every reference targets a node declared in the same stack.
/// 2. The referenced output is exported by the target's kind.
/// 3. Sensitive outputs are only read by nodes granted access.
///
/// # Errors
///
/// Returns `CirrusError::Validation` naming the referring node and the
/// attribute holding the offending reference.
pub fn validate(graph: &StackGraph) -> Result<()> {
    tracing::debug!(stack = graph.name(), nodes = graph.len(), "validating stack graph");
    check_reference_targets(graph)?;
    check_exported_outputs(graph)?;
    check_sensitive_access(graph)?;
    Ok(())
}

fn check_reference_targets(graph: &StackGraph) -> Result<()> {
    for node in graph.nodes() {
        for (attribute, reference) in node.references() {
            if graph.node(&reference.target).is_none() {
                return Err(CirrusError::validation(
                    node.id().as_str(),
                    attribute,
                    format!("references undeclared resource \"{}\"", reference.target),
                ));
            }
        }
    }
    Ok(())
}

fn check_exported_outputs(graph: &StackGraph) -> Result<()> {
    for node in graph.nodes() {
        for (attribute, reference) in node.references() {
            let Some(target) = graph.node(&reference.target) else {
                continue;
            };
            if target.kind().output(&reference.output).is_none() {
                return Err(CirrusError::validation(
                    node.id().as_str(),
                    attribute,
                    format!(
                        "{} \"{}\" does not export output \"{}\"",
                        target.kind(),
                        target.id(),
                        reference.output
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_sensitive_access(graph: &StackGraph) -> Result<()> {
    for node in graph.nodes() {
        for (attribute, reference) in node.references() {
            if graph.is_sensitive(reference) && !graph.is_granted(&reference.target, node.id()) {
                return Err(CirrusError::validation(
                    node.id().as_str(),
                    attribute,
                    format!(
                        "not granted access to sensitive output \"{}\" of \"{}\"",
                        reference.output, reference.target
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use cirrus_common::types::ResourceId;

    use super::*;
    use crate::node::{Attributes, ResourceKind, ResourceNode};
    use crate::value::Reference;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s).expect("valid id")
    }

    fn secret() -> ResourceNode {
        ResourceNode::new(
            id("db-password"),
            ResourceKind::Secret,
            Attributes::new().with("length", 16_u16),
        )
        .expect("valid")
    }

    fn consumer(name: &str, output: &str) -> ResourceNode {
        ResourceNode::new(
            id(name),
            ResourceKind::Output,
            Attributes::new().with("value", Reference::new(&id("db-password"), output)),
        )
        .expect("valid")
    }

    #[test]
    fn validate_empty_graph_succeeds() {
        assert!(validate(&StackGraph::new("empty")).is_ok());
    }

    #[test]
    fn undeclared_target_fails_with_attribute() {
        let mut graph = StackGraph::new("dangling");
        let _ = graph
            .add(
                ResourceNode::new(
                    id("subnet1"),
                    ResourceKind::Subnet,
                    Attributes::new()
                        .with("vpc_id", Reference::new(&id("ghost"), "id"))
                        .with("cidr_block", "10.0.0.0/24")
                        .with("availability_zone", "eu-west-1a"),
                )
                .expect("valid"),
            )
            .expect("add");

        match validate(&graph).unwrap_err() {
            CirrusError::Validation {
                resource,
                field,
                message,
            } => {
                assert_eq!(resource, "subnet1");
                assert_eq!(field, "vpc_id");
                assert!(message.contains("ghost"), "got: {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_output_fails() {
        let mut graph = StackGraph::new("typo");
        let _ = graph.add(secret()).expect("add");
        let _ = graph.add(consumer("leak", "password")).expect("add");
        let err = validate(&graph).unwrap_err();
        assert!(err.to_string().contains("does not export"), "got: {err}");
    }

    #[test]
    fn ungranted_secret_read_fails() {
        let mut graph = StackGraph::new("secret");
        let _ = graph.add(secret()).expect("add");
        let _ = graph.add(consumer("leak", "result")).expect("add");
        let err = validate(&graph).unwrap_err();
        assert!(err.to_string().contains("not granted"), "got: {err}");
    }

    #[test]
    fn granted_secret_read_succeeds() {
        let mut graph = StackGraph::new("secret");
        let _ = graph.add(secret()).expect("add");
        let _ = graph.add(consumer("db", "result")).expect("add");
        graph.grant(&id("db-password"), &id("db"));
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn non_sensitive_secret_output_needs_no_grant() {
        let mut graph = StackGraph::new("secret");
        let _ = graph.add(secret()).expect("add");
        let _ = graph.add(consumer("audit", "id")).expect("add");
        assert!(validate(&graph).is_ok());
        assert!(!graph.is_granted(&id("db-password"), &id("audit")));
    }
}
