//! Resource nodes and the per-kind attribute schema.
//!
//! A [`ResourceNode`] records intent only: constructing one performs no
//! I/O and never contacts a provider. Construction checks that every
//! attribute the kind requires is present.

use std::collections::BTreeMap;
use std::fmt;

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::ResourceId;
use serde::{Deserialize, Serialize};

use crate::value::{Reference, Value};

/// Type of a declared infrastructure object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Private network.
    Network,
    /// Subnet within a network, pinned to one availability zone.
    Subnet,
    /// Stateful firewall scoped to a network.
    SecurityGroup,
    /// Managed relational database instance.
    DbInstance,
    /// Set of subnets a database may be placed in.
    DbSubnetGroup,
    /// Engine parameter set for a database.
    DbParameterGroup,
    /// Generated credential, provisioned by the engine.
    Secret,
    /// Object storage bucket.
    Bucket,
    /// Packaged artifact uploaded as a storage object.
    Artifact,
    /// Execution role assumed by the compute function.
    Role,
    /// Attachment of a managed policy to a role.
    RolePolicyAttachment,
    /// Serverless compute function.
    ComputeFunction,
    /// Public HTTP gateway.
    GatewayApi,
    /// Invocation permission on a compute function.
    Permission,
    /// Declared stack output.
    Output,
}

/// Output attribute exported by a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    /// Output name.
    pub name: &'static str,
    /// Input attribute whose value the output mirrors, if any.
    pub mirrors: Option<&'static str>,
    /// Whether the value must never appear in plain text.
    pub sensitive: bool,
}

const fn out(name: &'static str) -> OutputSpec {
    OutputSpec {
        name,
        mirrors: None,
        sensitive: false,
    }
}

const fn mirror(name: &'static str, attribute: &'static str) -> OutputSpec {
    OutputSpec {
        name,
        mirrors: Some(attribute),
        sensitive: false,
    }
}

const fn sensitive(name: &'static str) -> OutputSpec {
    OutputSpec {
        name,
        mirrors: None,
        sensitive: true,
    }
}

const ID_OUTPUTS: &[OutputSpec] = &[out("id")];
const NETWORK_OUTPUTS: &[OutputSpec] = &[out("id"), out("arn")];
const NAMED_OUTPUTS: &[OutputSpec] = &[out("id"), out("arn"), mirror("name", "name")];
const DB_INSTANCE_OUTPUTS: &[OutputSpec] = &[
    out("id"),
    out("arn"),
    out("address"),
    out("endpoint"),
    mirror("port", "port"),
];
const SECRET_OUTPUTS: &[OutputSpec] = &[out("id"), sensitive("result")];
const BUCKET_OUTPUTS: &[OutputSpec] = &[out("id"), out("arn"), mirror("bucket", "bucket")];
const ARTIFACT_OUTPUTS: &[OutputSpec] = &[
    out("id"),
    mirror("key", "key"),
    mirror("etag", "etag"),
    out("version_id"),
];
const FUNCTION_OUTPUTS: &[OutputSpec] = &[
    out("id"),
    out("arn"),
    out("invoke_arn"),
    mirror("function_name", "function_name"),
];
const GATEWAY_OUTPUTS: &[OutputSpec] = &[out("id"), out("api_endpoint"), out("execution_arn")];
const OUTPUT_OUTPUTS: &[OutputSpec] = &[mirror("value", "value")];

impl ResourceKind {
    /// Attributes that must be present (and not null) on every node of
    /// this kind.
    #[must_use]
    pub const fn required_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Network => &["cidr_block"],
            Self::Subnet => &["vpc_id", "cidr_block", "availability_zone"],
            Self::SecurityGroup => &["name", "vpc_id"],
            Self::DbInstance => &[
                "identifier",
                "engine",
                "instance_class",
                "username",
                "password",
                "port",
            ],
            Self::DbSubnetGroup => &["name", "subnet_ids"],
            Self::DbParameterGroup => &["name", "family"],
            Self::Secret => &["length"],
            Self::Bucket => &["bucket"],
            Self::Artifact => &["bucket", "key", "source"],
            Self::Role => &["name", "assume_role_policy"],
            Self::RolePolicyAttachment => &["role", "policy_arn"],
            Self::ComputeFunction => &[
                "function_name",
                "handler",
                "runtime",
                "role",
                "s3_bucket",
                "s3_key",
            ],
            Self::GatewayApi => &["name", "protocol_type", "target"],
            Self::Permission => &["function_name", "action", "principal", "source_arn"],
            Self::Output => &["value"],
        }
    }

    /// Outputs this kind exports to referencing nodes.
    #[must_use]
    pub const fn outputs(self) -> &'static [OutputSpec] {
        match self {
            Self::Network | Self::Subnet => NETWORK_OUTPUTS,
            Self::SecurityGroup | Self::DbSubnetGroup | Self::DbParameterGroup | Self::Role => {
                NAMED_OUTPUTS
            }
            Self::DbInstance => DB_INSTANCE_OUTPUTS,
            Self::Secret => SECRET_OUTPUTS,
            Self::Bucket => BUCKET_OUTPUTS,
            Self::Artifact => ARTIFACT_OUTPUTS,
            Self::RolePolicyAttachment | Self::Permission => ID_OUTPUTS,
            Self::ComputeFunction => FUNCTION_OUTPUTS,
            Self::GatewayApi => GATEWAY_OUTPUTS,
            Self::Output => OUTPUT_OUTPUTS,
        }
    }

    /// Looks up an exported output by name.
    #[must_use]
    pub fn output(self, name: &str) -> Option<OutputSpec> {
        self.outputs().iter().copied().find(|spec| spec.name == name)
    }

    /// Whether nodes of this kind accept provider tags.
    #[must_use]
    pub const fn is_taggable(self) -> bool {
        matches!(
            self,
            Self::Network
                | Self::Subnet
                | Self::SecurityGroup
                | Self::DbInstance
                | Self::Bucket
                | Self::Role
                | Self::ComputeFunction
                | Self::GatewayApi
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security_group",
            Self::DbInstance => "db_instance",
            Self::DbSubnetGroup => "db_subnet_group",
            Self::DbParameterGroup => "db_parameter_group",
            Self::Secret => "secret",
            Self::Bucket => "bucket",
            Self::Artifact => "artifact",
            Self::Role => "role",
            Self::RolePolicyAttachment => "role_policy_attachment",
            Self::ComputeFunction => "compute_function",
            Self::GatewayApi => "gateway_api",
            Self::Permission => "permission",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// Resolution state of a node output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum OutputValue {
    /// Value already determined at synthesis time.
    Known(Value),
    /// Value known only once the provisioning engine has applied the node.
    Deferred {
        /// Whether the engine must treat the value as write-only.
        sensitive: bool,
    },
}

/// Ordered attribute mapping used to declare a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing any previous value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.0.insert(name.into(), value.into());
        self
    }

    /// Sets `name` only when `value` is present.
    #[must_use]
    pub fn with_opt(self, name: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.with(name, value),
            None => self,
        }
    }
}

/// One declared infrastructure object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNode {
    id: ResourceId,
    kind: ResourceKind,
    attributes: BTreeMap<String, Value>,
    outputs: BTreeMap<String, OutputValue>,
}

impl ResourceNode {
    /// Declares a node of `kind`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` naming the node and attribute if
    /// an attribute required by `kind` is missing or null.
    pub fn new(id: ResourceId, kind: ResourceKind, attributes: Attributes) -> Result<Self> {
        let attributes = attributes.0;
        for &required in kind.required_attributes() {
            if attributes.get(required).is_none_or(Value::is_null) {
                return Err(CirrusError::validation(
                    id.as_str(),
                    required,
                    format!("{kind} requires attribute \"{required}\""),
                ));
            }
        }
        tracing::debug!(id = %id, kind = %kind, "declared resource");
        Ok(Self {
            id,
            kind,
            attributes,
            outputs: BTreeMap::new(),
        })
    }

    /// Returns the node identifier.
    #[must_use]
    pub const fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns all declared attributes.
    #[must_use]
    pub const fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Returns a single attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Returns resolved outputs; empty until the owning graph is resolved.
    #[must_use]
    pub const fn outputs(&self) -> &BTreeMap<String, OutputValue> {
        &self.outputs
    }

    pub(crate) fn set_outputs(&mut self, outputs: BTreeMap<String, OutputValue>) {
        self.outputs = outputs;
    }

    /// Builds a reference to one of this node's outputs.
    ///
    /// Whether `output` is actually exported is checked when the graph is
    /// validated, so a typo is reported against the referring node.
    #[must_use]
    pub fn output_ref(&self, output: &str) -> Reference {
        Reference::new(&self.id, output)
    }

    /// Every reference held by this node's attributes, with attribute paths.
    #[must_use]
    pub fn references(&self) -> Vec<(String, &Reference)> {
        let mut refs = Vec::new();
        for (name, value) in &self.attributes {
            value.collect_references(name, &mut refs);
        }
        refs
    }
}
