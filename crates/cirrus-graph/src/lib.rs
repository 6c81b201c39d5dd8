//! # cirrus-graph
//!
//! Declaration and resolution of a stack's resource graph.
//!
//! Handles:
//! - **Value**: Literal attribute values and references to other resources' outputs.
//! - **Node**: Typed resource declarations with per-kind required attributes.
//! - **Blocks**: Validated nested configuration (firewall rules, network placement).
//! - **Graph**: Dependency edges and deterministic topological resolution.
//! - **Validator**: Dangling references, unknown outputs, sensitive access.
//! - **Synth**: The document handed to the provisioning engine.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod blocks;
pub mod graph;
pub mod node;
pub mod synth;
pub mod validator;
pub mod value;
