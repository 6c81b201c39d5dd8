//! Typed nested configuration blocks.
//!
//! Multi-field settings such as firewall rules and network placement are
//! built through validated structs and only then lowered into
//! [`Value::Map`] attributes.

use std::collections::BTreeMap;

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::ResourceId;

use crate::value::{Reference, Value};

/// CIDR block matching every IPv4 address.
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Transport protocol of a firewall rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Every protocol (`-1`).
    All,
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    const fn as_str(self) -> &'static str {
        match self {
            Self::All => "-1",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// A validated ingress or egress rule of a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    protocol: Protocol,
    from_port: u16,
    to_port: u16,
    cidr_blocks: Vec<String>,
    security_groups: Vec<Reference>,
}

impl SecurityRule {
    /// Starts building a rule for `protocol`.
    #[must_use]
    pub const fn builder(protocol: Protocol) -> SecurityRuleBuilder {
        SecurityRuleBuilder {
            protocol,
            from_port: 0,
            to_port: 0,
            cidr_blocks: Vec::new(),
            security_groups: Vec::new(),
        }
    }

    /// Rule allowing all traffic to or from anywhere.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: 0,
            to_port: 0,
            cidr_blocks: vec![ANY_IPV4.to_owned()],
            security_groups: Vec::new(),
        }
    }

    /// Returns the CIDR sources or destinations.
    #[must_use]
    pub fn cidr_blocks(&self) -> &[String] {
        &self.cidr_blocks
    }

    /// Returns the security-group sources or destinations.
    #[must_use]
    pub fn security_groups(&self) -> &[Reference] {
        &self.security_groups
    }

    /// Returns the inclusive port range.
    #[must_use]
    pub const fn ports(&self) -> (u16, u16) {
        (self.from_port, self.to_port)
    }
}

impl From<&SecurityRule> for Value {
    fn from(rule: &SecurityRule) -> Self {
        let mut map = BTreeMap::new();
        let _ = map.insert("protocol".to_owned(), Self::from(rule.protocol.as_str()));
        let _ = map.insert("from_port".to_owned(), Self::from(rule.from_port));
        let _ = map.insert("to_port".to_owned(), Self::from(rule.to_port));
        let _ = map.insert("cidr_blocks".to_owned(), Self::from(rule.cidr_blocks.clone()));
        let _ = map.insert(
            "security_groups".to_owned(),
            Self::from(rule.security_groups.clone()),
        );
        Self::Map(map)
    }
}

/// Builder for [`SecurityRule`].
#[derive(Debug)]
pub struct SecurityRuleBuilder {
    protocol: Protocol,
    from_port: u16,
    to_port: u16,
    cidr_blocks: Vec<String>,
    security_groups: Vec<Reference>,
}

impl SecurityRuleBuilder {
    /// Sets the inclusive port range.
    #[must_use]
    pub const fn ports(mut self, from: u16, to: u16) -> Self {
        self.from_port = from;
        self.to_port = to;
        self
    }

    /// Sets a single port.
    #[must_use]
    pub const fn port(self, port: u16) -> Self {
        self.ports(port, port)
    }

    /// Adds a CIDR block.
    #[must_use]
    pub fn cidr(mut self, block: impl Into<String>) -> Self {
        self.cidr_blocks.push(block.into());
        self
    }

    /// Adds a security group, by reference to its `id` output.
    #[must_use]
    pub fn security_group(mut self, group_id: Reference) -> Self {
        self.security_groups.push(group_id);
        self
    }

    /// Validates and builds the rule declared on `owner`'s `field`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the rule has no source or
    /// destination, or if the port range is inverted.
    pub fn build(self, owner: &ResourceId, field: &str) -> Result<SecurityRule> {
        if self.cidr_blocks.is_empty() && self.security_groups.is_empty() {
            return Err(CirrusError::validation(
                owner.as_str(),
                field,
                "rule needs at least one CIDR block or security group",
            ));
        }
        if self.from_port > self.to_port {
            return Err(CirrusError::validation(
                owner.as_str(),
                field,
                format!("port range {}-{} is inverted", self.from_port, self.to_port),
            ));
        }
        Ok(SecurityRule {
            protocol: self.protocol,
            from_port: self.from_port,
            to_port: self.to_port,
            cidr_blocks: self.cidr_blocks,
            security_groups: self.security_groups,
        })
    }
}

/// Lowers a rule set into a list attribute.
#[must_use]
pub fn rules_value(rules: &[SecurityRule]) -> Value {
    Value::List(rules.iter().map(Value::from).collect())
}

/// Network placement of a compute function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcConfig {
    subnet_ids: Vec<Reference>,
    security_group_ids: Vec<Reference>,
}

impl VpcConfig {
    /// Validates the placement of `owner`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if either list is empty.
    pub fn new(
        owner: &ResourceId,
        subnet_ids: Vec<Reference>,
        security_group_ids: Vec<Reference>,
    ) -> Result<Self> {
        if subnet_ids.is_empty() {
            return Err(CirrusError::validation(
                owner.as_str(),
                "vpc_config.subnet_ids",
                "at least one subnet is required",
            ));
        }
        if security_group_ids.is_empty() {
            return Err(CirrusError::validation(
                owner.as_str(),
                "vpc_config.security_group_ids",
                "at least one security group is required",
            ));
        }
        Ok(Self {
            subnet_ids,
            security_group_ids,
        })
    }
}

impl From<VpcConfig> for Value {
    fn from(config: VpcConfig) -> Self {
        let mut map = BTreeMap::new();
        let _ = map.insert("subnet_ids".to_owned(), Self::from(config.subnet_ids));
        let _ = map.insert(
            "security_group_ids".to_owned(),
            Self::from(config.security_group_ids),
        );
        Self::Map(map)
    }
}
