//! Reproducible tar + gzip archives.
//!
//! The same input tree always produces the same tar stream: entries are
//! sorted by their `/`-separated relative path and headers carry no
//! timestamps, owners, or platform-specific permission bits.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::Sha256Hash;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::hash::HashingWriter;

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;
const GZIP_LEVEL: u32 = 6;

/// What an archive entry holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory.
    Dir,
    /// Regular file.
    File {
        /// Size in bytes.
        size: u64,
        /// Whether any execute bit is set.
        executable: bool,
    },
}

/// A file or directory to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path inside the archive, `/`-separated.
    pub name: String,
    /// Path on disk.
    pub path: PathBuf,
    /// Entry type.
    pub kind: EntryKind,
}

/// Result of streaming an archive.
#[derive(Debug)]
pub struct Written<W> {
    /// The underlying writer, after the gzip trailer.
    pub writer: W,
    /// SHA-256 of the uncompressed tar stream.
    pub content_hash: Sha256Hash,
    /// Length of the uncompressed tar stream.
    pub tar_bytes: u64,
}

/// Lists the entries of `source` in archive order.
///
/// A single file becomes one entry named after the file. A directory is
/// walked recursively; its own name is not part of entry names. Symbolic
/// links are skipped.
///
/// # Errors
///
/// Returns `CirrusError::Packaging` if `source` is missing, unreadable, or
/// contains no file content.
pub fn collect_entries(source: &Path) -> Result<Vec<Entry>> {
    collect_entries_excluding(source, None)
}

/// Like [`collect_entries`], but leaves out the `excluded` directory when
/// it lies inside `source`. Packaging into an output directory below the
/// source tree must not feed earlier archives into the next one.
///
/// # Errors
///
/// Same as [`collect_entries`], and `CirrusError::Packaging` if `source`
/// is the excluded directory itself.
pub fn collect_entries_excluding(source: &Path, excluded: Option<&Path>) -> Result<Vec<Entry>> {
    let metadata = std::fs::symlink_metadata(source)
        .map_err(|e| CirrusError::packaging(source, format!("source is not accessible: {e}")))?;

    let mut entries = Vec::new();
    if metadata.is_dir() {
        let skip = excluded.and_then(|dir| nested_name(source, dir));
        if skip.as_deref() == Some("") {
            return Err(CirrusError::packaging(
                source,
                "source is the output directory",
            ));
        }
        walk(source, source, skip.as_deref(), &mut entries)?;
    } else if metadata.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CirrusError::packaging(source, "source has no file name"))?;
        entries.push(Entry {
            name,
            path: source.to_path_buf(),
            kind: file_kind(&metadata),
        });
    } else {
        return Err(CirrusError::packaging(
            source,
            "source must be a regular file or a directory",
        ));
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let content: u64 = entries
        .iter()
        .map(|e| match e.kind {
            EntryKind::File { size, .. } => size,
            EntryKind::Dir => 0,
        })
        .sum();
    if content == 0 {
        return Err(CirrusError::packaging(source, "source is empty"));
    }
    Ok(entries)
}

/// Archive name of `dir` relative to `root`, if `dir` exists inside it.
fn nested_name(root: &Path, dir: &Path) -> Option<String> {
    let root = root.canonicalize().ok()?;
    let dir = dir.canonicalize().ok()?;
    let relative = dir.strip_prefix(&root).ok()?;
    Some(relative_name(Path::new(""), relative))
}

fn walk(root: &Path, dir: &Path, skip: Option<&str>, entries: &mut Vec<Entry>) -> Result<()> {
    let read_dir = std::fs::read_dir(dir)
        .map_err(|e| CirrusError::packaging(dir, format!("cannot read directory: {e}")))?;
    for item in read_dir {
        let item = item.map_err(|e| CirrusError::packaging(dir, e.to_string()))?;
        let path = item.path();
        let metadata = std::fs::symlink_metadata(&path)
            .map_err(|e| CirrusError::packaging(&path, e.to_string()))?;

        if metadata.file_type().is_symlink() {
            tracing::warn!(path = %path.display(), "skipping symbolic link");
            continue;
        }

        let name = relative_name(root, &path);
        if metadata.is_dir() {
            if skip == Some(name.as_str()) {
                tracing::debug!(path = %path.display(), "skipping output directory");
                continue;
            }
            entries.push(Entry {
                name,
                path: path.clone(),
                kind: EntryKind::Dir,
            });
            walk(root, &path, skip, entries)?;
        } else if metadata.is_file() {
            entries.push(Entry {
                name,
                path,
                kind: file_kind(&metadata),
            });
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(unix)]
fn file_kind(metadata: &std::fs::Metadata) -> EntryKind {
    use std::os::unix::fs::PermissionsExt;

    EntryKind::File {
        size: metadata.len(),
        executable: metadata.permissions().mode() & 0o111 != 0,
    }
}

#[cfg(not(unix))]
fn file_kind(metadata: &std::fs::Metadata) -> EntryKind {
    EntryKind::File {
        size: metadata.len(),
        executable: false,
    }
}

/// Streams `entries` as a gzip-compressed tar into `writer`.
///
/// # Errors
///
/// Returns `CirrusError::Packaging` if an entry cannot be read or the
/// writer fails.
pub fn write_archive<W: Write>(entries: &[Entry], writer: W) -> Result<Written<W>> {
    let encoder = GzEncoder::new(writer, Compression::new(GZIP_LEVEL));
    let mut builder = tar::Builder::new(HashingWriter::new(encoder));

    for entry in entries {
        append_entry(&mut builder, entry)?;
    }

    let hashing = builder
        .into_inner()
        .map_err(|e| CirrusError::packaging(PathBuf::new(), format!("cannot finish tar: {e}")))?;
    let (encoder, content_hash, tar_bytes) = hashing.finish();
    let writer = encoder
        .finish()
        .map_err(|e| CirrusError::packaging(PathBuf::new(), format!("cannot finish gzip: {e}")))?;

    tracing::debug!(entries = entries.len(), tar_bytes, hash = %content_hash, "archive streamed");
    Ok(Written {
        writer,
        content_hash,
        tar_bytes,
    })
}

fn append_entry<W: Write>(builder: &mut tar::Builder<W>, entry: &Entry) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    let appended = match entry.kind {
        EntryKind::Dir => {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(EXEC_MODE);
            header.set_size(0);
            builder.append_data(&mut header, format!("{}/", entry.name), io::empty())
        }
        EntryKind::File { size, executable } => {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(if executable { EXEC_MODE } else { FILE_MODE });
            header.set_size(size);
            let file = File::open(&entry.path)
                .map_err(|e| CirrusError::packaging(&entry.path, format!("cannot open file: {e}")))?;
            builder.append_data(&mut header, &entry.name, file)
        }
    };
    appended.map_err(|e| CirrusError::packaging(&entry.path, format!("cannot archive entry: {e}")))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn tree(dir: &Path) {
        std::fs::create_dir_all(dir.join("lib/nested")).expect("mkdir");
        std::fs::write(dir.join("index.js"), b"exports.handler = () => 1;").expect("write");
        std::fs::write(dir.join("lib/util.js"), b"module.exports = {};").expect("write");
        std::fs::write(dir.join("lib/nested/deep.txt"), b"deep").expect("write");
    }

    #[test]
    fn entries_are_sorted_with_slash_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        tree(dir.path());
        let names: Vec<String> = collect_entries(dir.path())
            .expect("entries")
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "index.js",
                "lib",
                "lib/nested",
                "lib/nested/deep.txt",
                "lib/util.js"
            ]
        );
    }

    #[test]
    fn nested_output_directory_is_left_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.js"), b"x").expect("write");
        let out = dir.path().join("cirrus.out/assets");
        std::fs::create_dir_all(&out).expect("mkdir");
        std::fs::write(out.join("old.tar.gz"), b"previous archive").expect("write");

        let entries =
            collect_entries_excluding(dir.path(), Some(&dir.path().join("cirrus.out"))).expect("entries");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["index.js"]);
    }

    #[test]
    fn source_equal_to_output_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("index.js"), b"x").expect("write");
        let err = collect_entries_excluding(dir.path(), Some(dir.path())).unwrap_err();
        assert!(matches!(err, CirrusError::Packaging { .. }), "got: {err}");
    }

    #[test]
    fn single_file_source_is_one_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("bundle.zip");
        std::fs::write(&file, b"zip bytes").expect("write");
        let entries = collect_entries(&file).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "bundle.zip");
    }

    #[test]
    fn missing_source_is_packaging_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = collect_entries(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CirrusError::Packaging { .. }), "got: {err}");
    }

    #[test]
    fn empty_directory_is_packaging_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("only/dirs")).expect("mkdir");
        let err = collect_entries(dir.path()).unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[test]
    fn archive_roundtrips_through_gzip_and_tar() {
        let dir = tempfile::tempdir().expect("tempdir");
        tree(dir.path());
        let entries = collect_entries(dir.path()).expect("entries");
        let written = write_archive(&entries, Vec::new()).expect("archive");

        let decoder = flate2::read::GzDecoder::new(written.writer.as_slice());
        let mut archive = tar::Archive::new(decoder);
        let mut seen = Vec::new();
        for file in archive.entries().expect("entries") {
            let mut file = file.expect("entry");
            assert_eq!(file.header().mtime().expect("mtime"), 0);
            let path = file.path().expect("path").to_string_lossy().into_owned();
            if path == "lib/nested/deep.txt" {
                let mut body = String::new();
                let _ = file.read_to_string(&mut body).expect("read");
                assert_eq!(body, "deep");
            }
            seen.push(path);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn identical_trees_hash_identically() {
        let first = tempfile::tempdir().expect("tempdir");
        let second = tempfile::tempdir().expect("tempdir");
        tree(first.path());
        tree(second.path());

        let a = write_archive(&collect_entries(first.path()).expect("entries"), Vec::new())
            .expect("archive");
        let b = write_archive(&collect_entries(second.path()).expect("entries"), Vec::new())
            .expect("archive");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.writer, b.writer);
    }
}
