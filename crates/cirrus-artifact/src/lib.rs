//! # cirrus-artifact
//!
//! Packaging of pre-built compute artifacts for upload to object storage.
//!
//! Handles:
//! - **Hashing**: SHA-256 computed while the archive is streamed.
//! - **Archive**: Reproducible tar + gzip of a file or directory tree.
//! - **Packager**: Content-addressed archive placement and storage keys.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod archive;
pub mod hash;
pub mod packager;

pub use packager::{Artifact, Packager};
