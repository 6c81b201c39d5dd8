//! `cirrus package`: Package a build output into the asset directory.

use std::path::{Path, PathBuf};

use clap::Args;
use cirrus_artifact::Packager;

use crate::output;

/// Arguments for the `package` command.
#[derive(Args, Debug)]
pub struct PackageArgs {
    /// Build output to package (file or directory).
    pub path: PathBuf,

    /// Version label prefixed to the storage key.
    #[arg(long)]
    pub version: String,
}

/// Executes the `package` command.
///
/// # Errors
///
/// Returns an error if the source is missing, empty, or unreadable.
pub fn execute(args: PackageArgs, out: &Path) -> anyhow::Result<()> {
    let artifact = Packager::new(out).package(&args.path, &args.version)?;

    println!("Packaged: {}", args.path.display());
    output::print_rule();
    println!("  hash:    {}", artifact.content_hash);
    println!("  key:     {}", artifact.storage_key());
    println!("  archive: {}", artifact.archive_path.display());
    println!("  size:    {}", output::format_bytes(artifact.size_bytes));
    Ok(())
}
