//! CLI command definitions and dispatch.

pub mod package;
pub mod plan;
pub mod synth;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use cirrus_common::config::StackConfig;
use cirrus_common::constants::{DEFAULT_OUT_DIR, STATE_FILE_SUFFIX};

/// Cirrus: Serverless stack composition.
#[derive(Parser, Debug)]
#[command(name = "cirrus", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Directory receiving archives, documents, and stack state.
    #[arg(long, global = true, env = "CIRRUS_OUT", default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Package, compose, and write the document of one or more stacks.
    Synth(synth::SynthArgs),
    /// Show the resolved resource order of a stack without writing it.
    Plan(plan::PlanArgs),
    /// Package a build output and print its content hash and storage key.
    Package(package::PackageArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Synth(args) => synth::execute(args, &cli.out),
        Command::Plan(args) => plan::execute(args, &cli.out),
        Command::Package(args) => package::execute(args, &cli.out),
    }
}

/// Stack name derived from a configuration file: `prod.yaml` is `prod`.
fn stack_name(config: &Path) -> anyhow::Result<String> {
    config
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_owned)
        .with_context(|| format!("cannot derive a stack name from {}", config.display()))
}

/// Loads configuration files, naming each stack after its file unless
/// `name` overrides it.
fn load_stacks(
    configs: &[PathBuf],
    name: Option<&str>,
) -> anyhow::Result<Vec<(String, StackConfig)>> {
    if name.is_some() && configs.len() > 1 {
        anyhow::bail!("--stack can only be used with a single configuration file");
    }
    configs
        .iter()
        .map(|path| {
            let stack = match name {
                Some(n) => n.to_owned(),
                None => stack_name(path)?,
            };
            let config = StackConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            Ok((stack, config))
        })
        .collect()
}

fn state_path(out: &Path, stack: &str) -> PathBuf {
    out.join(format!("{stack}{STATE_FILE_SUFFIX}"))
}
