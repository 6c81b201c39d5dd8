//! Persistent stack state.
//!
//! Holds the values that must survive resynthesis: the identity token and
//! the secret handles. The provisioning engine owns this state in
//! production; the JSON file here lets the CLI reproduce a previous
//! synthesis without one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::IdentityToken;
use serde::{Deserialize, Serialize};

use crate::secret::SecretHandle;

/// Identity state of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackState {
    /// Stack this state belongs to.
    pub stack: String,
    /// Suffix for globally unique names, once allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_token: Option<IdentityToken>,
    /// Secret handles by role.
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretHandle>,
}

impl StackState {
    /// Creates empty state for `stack`.
    #[must_use]
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            identity_token: None,
            secrets: BTreeMap::new(),
        }
    }

    /// Loads the state of `stack` from `path`, or starts empty if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if it
    /// belongs to a different stack.
    pub fn load_or_new(path: &Path, stack: &str) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), stack, "no persisted state, starting fresh");
            return Ok(Self::new(stack));
        }
        tracing::debug!(path = %path.display(), "loading stack state");

        let content = std::fs::read_to_string(path).map_err(|e| CirrusError::io(path, e))?;
        let state: Self = serde_json::from_str(&content)?;
        if state.stack != stack {
            return Err(CirrusError::validation(
                stack,
                "state",
                format!(
                    "state file {} belongs to stack \"{}\"",
                    path.display(),
                    state.stack
                ),
            ));
        }
        Ok(state)
    }

    /// Persists the state to `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        tracing::debug!(path = %path.display(), stack = %self.stack, "saving stack state");

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| CirrusError::io(dir, e))?;

        let json = serde_json::to_string_pretty(self)?;
        let mut staging = tempfile::NamedTempFile::new_in(dir).map_err(|e| CirrusError::io(dir, e))?;
        staging
            .write_all(json.as_bytes())
            .map_err(|e| CirrusError::io(staging.path(), e))?;
        let _ = staging
            .persist(path)
            .map_err(|e| CirrusError::io(path, e.error))?;
        Ok(())
    }
}
