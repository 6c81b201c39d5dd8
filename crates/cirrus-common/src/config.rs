//! Stack configuration model.
//!
//! A [`StackConfig`] is supplied by the caller (normally a build pipeline)
//! and describes the pre-built artifact plus the runtime settings of the
//! compute function. Required fields are optional at the type level so that
//! a missing field surfaces as a `CirrusError::Validation` naming the
//! resource that consumes it, instead of a generic deserialization failure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CirrusError, Result};

/// Configuration for one stack synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct StackConfig {
    /// Local filesystem path of the pre-built artifact (file or directory).
    pub path: Option<PathBuf>,
    /// Platform-specific entry point of the compute function.
    pub handler: Option<String>,
    /// Runtime identifier of the compute function.
    pub runtime: Option<String>,
    /// Deployment stage label.
    #[serde(alias = "stageName")]
    pub stage_name: Option<String>,
    /// Version label embedded in the artifact's storage key.
    pub version: Option<String>,
    /// Provider region; availability zones are derived from it.
    #[serde(default = "default_region")]
    pub region: String,
    /// Port the managed database listens on.
    #[serde(default = "default_db_port", alias = "dbPort")]
    pub db_port: u16,
}

fn default_region() -> String {
    crate::constants::DEFAULT_REGION.to_owned()
}

const fn default_db_port() -> u16 {
    crate::constants::DEFAULT_DB_PORT
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            path: None,
            handler: None,
            runtime: None,
            stage_name: None,
            version: None,
            region: default_region(),
            db_port: default_db_port(),
        }
    }
}

impl StackConfig {
    /// Loads a configuration file, choosing YAML or JSON by extension.
    ///
    /// A relative artifact `path` is resolved against the directory holding
    /// the configuration file. A blank `path` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading stack configuration");

        let content = std::fs::read_to_string(path).map_err(|e| CirrusError::io(path, e))?;
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

        let mut config: Self = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                CirrusError::validation(path.display().to_string(), "config", e.to_string())
            })?
        } else {
            serde_json::from_str(&content)?
        };

        config.path = config.path.filter(|artifact| !is_blank_path(artifact));
        if let Some(base) = path.parent() {
            config.path = config
                .path
                .map(|artifact| if artifact.is_relative() { base.join(artifact) } else { artifact });
        }
        Ok(config)
    }

    /// Returns the artifact path if it is present and not blank.
    #[must_use]
    pub fn artifact_path(&self) -> Option<&Path> {
        self.path.as_deref().filter(|p| !is_blank_path(p))
    }

    /// Returns `field` if it is present and not blank.
    #[must_use]
    pub fn non_blank(field: Option<&str>) -> Option<&str> {
        field.map(str::trim).filter(|v| !v.is_empty())
    }
}

fn is_blank_path(path: &Path) -> bool {
    path.as_os_str().to_string_lossy().trim().is_empty()
}
