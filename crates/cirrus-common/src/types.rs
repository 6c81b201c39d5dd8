//! Domain primitive types used across the Cirrus workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CirrusError, Result};

/// Identifier of a resource node, unique within one stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource ID, rejecting empty ids and characters outside
    /// `[a-z0-9_-]`.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the id is malformed.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid {
            return Err(CirrusError::validation(
                id,
                "id",
                "resource ids must be non-empty and use only [a-z0-9_-]",
            ));
        }
        Ok(Self(id))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// SHA-256 hash digest used for content addressing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(CirrusError::validation(
                "artifact",
                "content_hash",
                format!("invalid SHA-256 hex string: {hex}"),
            ));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Builds a hash from a raw 32-byte digest.
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        use std::fmt::Write as _;

        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Returns the first `len` hex characters, used in generated file names.
    #[must_use]
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Short pronounceable suffix that disambiguates globally unique names.
///
/// Generated once per stack and persisted alongside the stack state so
/// that resynthesis reproduces the same names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
    /// Wraps an existing token, typically one loaded from persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or not lowercase kebab-case.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if !is_kebab_segment(&token) {
            return Err(CirrusError::validation(
                "stack",
                "identity_token",
                format!("identity token \"{token}\" must be lowercase kebab-case"),
            ));
        }
        Ok(Self(token))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns `true` for non-empty lowercase alphanumeric strings whose hyphens
/// are neither leading, trailing, nor doubled.
#[must_use]
pub fn is_kebab_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && !value.contains("--")
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
