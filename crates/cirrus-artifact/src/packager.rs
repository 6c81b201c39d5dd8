//! Content-addressed artifact packaging.
//!
//! Archives land in `{out_dir}/assets/{hash}/archive-{hash16}.tar.gz`.
//! The storage key of an artifact is `{version}/{file_name}`, so the key
//! changes when either the contents or the explicit version change, and
//! stays put otherwise.

use std::path::{Path, PathBuf};

use cirrus_common::constants::{ARCHIVE_HASH_PREFIX_LENGTH, ASSETS_DIR};
use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::Sha256Hash;

use crate::archive;

/// A packaged build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Source file or directory that was packaged.
    pub source_path: PathBuf,
    /// SHA-256 of the reproducible tar stream.
    pub content_hash: Sha256Hash,
    /// Location of the compressed archive on disk.
    pub archive_path: PathBuf,
    /// Generated archive file name.
    pub file_name: String,
    /// Explicit version label.
    pub version: String,
    /// Size of the compressed archive.
    pub size_bytes: u64,
}

impl Artifact {
    /// Object key under which the archive is uploaded.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.version, self.file_name)
    }

    /// Archive location relative to the output directory.
    ///
    /// Unlike [`Artifact::archive_path`] this does not depend on where the
    /// output directory lives, so it is safe to embed in synthesized output.
    #[must_use]
    pub fn relative_archive_path(&self) -> String {
        format!(
            "{ASSETS_DIR}/{}/{}",
            self.content_hash.as_hex(),
            self.file_name
        )
    }
}

/// Generated archive file name for a content hash.
#[must_use]
pub fn archive_file_name(hash: &Sha256Hash) -> String {
    format!("archive-{}.tar.gz", hash.short(ARCHIVE_HASH_PREFIX_LENGTH))
}

/// Packages artifacts into an output directory.
#[derive(Debug, Clone)]
pub struct Packager {
    out_dir: PathBuf,
}

impl Packager {
    /// Creates a packager writing below `out_dir`.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    /// Returns the output directory.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Returns the directory holding packaged archives.
    #[must_use]
    pub fn assets_dir(&self) -> PathBuf {
        self.out_dir.join(ASSETS_DIR)
    }

    /// Packages `source` under `version`.
    ///
    /// The archive is streamed into a temporary file while being hashed,
    /// then moved into its content-addressed location. If an archive with
    /// the same hash already exists it is kept and the new copy discarded.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Packaging` if `source` is missing, empty, or
    /// unreadable, `CirrusError::Validation` for a malformed version, and
    /// `CirrusError::Io` if the output directory cannot be written.
    pub fn package(&self, source: &Path, version: &str) -> Result<Artifact> {
        validate_version(version)?;
        tracing::info!(source = %source.display(), version, "packaging artifact");

        let entries = archive::collect_entries_excluding(source, Some(&self.out_dir))?;
        let assets = self.assets_dir();
        std::fs::create_dir_all(&assets).map_err(|e| CirrusError::io(&assets, e))?;

        let mut staging =
            tempfile::NamedTempFile::new_in(&assets).map_err(|e| CirrusError::io(&assets, e))?;
        let written = archive::write_archive(&entries, staging.as_file_mut())?;
        let content_hash = written.content_hash;

        let file_name = archive_file_name(&content_hash);
        let target_dir = assets.join(content_hash.as_hex());
        let archive_path = target_dir.join(&file_name);

        if archive_path.exists() {
            tracing::info!(hash = %content_hash, "artifact unchanged, reusing archive");
        } else {
            std::fs::create_dir_all(&target_dir).map_err(|e| CirrusError::io(&target_dir, e))?;
            let _ = staging
                .persist(&archive_path)
                .map_err(|e| CirrusError::io(&archive_path, e.error))?;
        }

        let size_bytes = std::fs::metadata(&archive_path)
            .map_err(|e| CirrusError::io(&archive_path, e))?
            .len();

        tracing::info!(
            hash = %content_hash,
            archive = %archive_path.display(),
            size = size_bytes,
            "artifact packaged"
        );
        Ok(Artifact {
            source_path: source.to_path_buf(),
            content_hash,
            archive_path,
            file_name,
            version: version.to_owned(),
            size_bytes,
        })
    }
}

fn validate_version(version: &str) -> Result<()> {
    let version = version.trim();
    if version.is_empty() {
        return Err(CirrusError::validation(
            "artifact",
            "version",
            "version label is required",
        ));
    }
    if version.contains('/') || version.contains('\\') || version.chars().any(char::is_whitespace) {
        return Err(CirrusError::validation(
            "artifact",
            "version",
            format!("version label \"{version}\" must be a single key segment"),
        ));
    }
    Ok(())
}
