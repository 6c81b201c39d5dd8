//! Stack-scoped secret handles.
//!
//! The generator never sees a raw credential. It hands out a
//! [`SecretHandle`] that is declared as a `Secret` node; the provisioning
//! engine materializes the value once and exposes it only through the
//! node's write-only `result` output. Handles are persisted in
//! [`StackState`], so resynthesis reuses the handle dependents were
//! provisioned with instead of silently rotating the credential.

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::{ResourceId, is_kebab_segment};
use cirrus_graph::node::{Attributes, ResourceKind, ResourceNode};
use cirrus_graph::value::{Reference, Value};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::state::StackState;

const MIN_LENGTH: u16 = 8;
const MAX_LENGTH: u16 = 128;

/// Length and character-class constraints of a generated secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPolicy {
    /// Number of characters.
    pub length: u16,
    /// Whether special characters may appear.
    pub special: bool,
    /// Restricts the special characters to this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_special: Option<String>,
}

impl SecretPolicy {
    /// Policy of the managed database password: 16 characters, with `@`
    /// as the only special character.
    #[must_use]
    pub fn database_password() -> Self {
        Self {
            length: 16,
            special: true,
            override_special: Some("@".to_owned()),
        }
    }

    fn validate(&self, role: &str) -> Result<()> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&self.length) {
            return Err(CirrusError::validation(
                role,
                "length",
                format!(
                    "secret length {} is outside {MIN_LENGTH}..={MAX_LENGTH}",
                    self.length
                ),
            ));
        }
        if let Some(set) = &self.override_special {
            if !self.special {
                return Err(CirrusError::validation(
                    role,
                    "override_special",
                    "special characters are disabled",
                ));
            }
            if set.is_empty() || !set.chars().all(|c| c.is_ascii_punctuation()) {
                return Err(CirrusError::validation(
                    role,
                    "override_special",
                    format!("\"{set}\" must be a non-empty set of ASCII punctuation"),
                ));
            }
        }
        Ok(())
    }
}

/// Opaque reference to a generated secret. Never carries the raw value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHandle {
    /// Stack owning the secret.
    pub stack: String,
    /// Node id of the declared `Secret` resource.
    pub id: ResourceId,
    /// Policy the secret was generated with.
    pub policy: SecretPolicy,
    /// Random discriminator fixing the secret's identity.
    pub nonce: String,
}

impl SecretHandle {
    /// Declares the `Secret` node backing this handle.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the node is malformed.
    pub fn to_node(&self) -> Result<ResourceNode> {
        let mut keepers = std::collections::BTreeMap::new();
        let _ = keepers.insert("nonce".to_owned(), Value::from(self.nonce.as_str()));
        ResourceNode::new(
            self.id.clone(),
            ResourceKind::Secret,
            Attributes::new()
                .with("length", self.policy.length)
                .with("special", self.policy.special)
                .with_opt("override_special", self.policy.override_special.clone())
                .with("keepers", Value::Map(keepers)),
        )
    }

    /// Reference to the write-only generated value.
    #[must_use]
    pub fn result(&self) -> Reference {
        Reference::new(&self.id, "result")
    }
}

/// Hands out secret handles for one stack.
#[derive(Debug)]
pub struct SecretGenerator<'a> {
    stack: &'a str,
    state: &'a mut StackState,
}

impl<'a> SecretGenerator<'a> {
    /// Creates a generator recording handles in `state`.
    pub fn new(stack: &'a str, state: &'a mut StackState) -> Self {
        Self { stack, state }
    }

    /// Returns the handle for `role`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the role or policy is malformed,
    /// or if a persisted handle for `role` was created under a different
    /// policy or stack.
    pub fn generate(&mut self, role: &str, policy: &SecretPolicy) -> Result<SecretHandle> {
        if !is_kebab_segment(role) {
            return Err(CirrusError::validation(
                role,
                "role",
                "secret roles must be lowercase kebab-case",
            ));
        }
        policy.validate(role)?;

        if let Some(existing) = self.state.secrets.get(role) {
            if existing.stack != self.stack {
                return Err(CirrusError::validation(
                    role,
                    "stack",
                    format!(
                        "persisted secret belongs to stack \"{}\", not \"{}\"",
                        existing.stack, self.stack
                    ),
                ));
            }
            if existing.policy != *policy {
                return Err(CirrusError::validation(
                    role,
                    "policy",
                    "persisted secret was generated under a different policy",
                ));
            }
            tracing::debug!(stack = self.stack, role, "reusing persisted secret handle");
            return Ok(existing.clone());
        }

        let handle = SecretHandle {
            stack: self.stack.to_owned(),
            id: ResourceId::new(role)?,
            policy: policy.clone(),
            nonce: format!("{:016x}", rand::rng().random::<u64>()),
        };
        let _ = self.state.secrets.insert(role.to_owned(), handle.clone());
        tracing::info!(stack = self.stack, role, "generated new secret handle");
        Ok(handle)
    }
}
