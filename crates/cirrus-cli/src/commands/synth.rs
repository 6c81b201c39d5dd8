//! `cirrus synth`: Package, compose, and write stack documents.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use cirrus_artifact::Packager;
use cirrus_common::constants::STACK_FILE_SUFFIX;
use cirrus_stack::App;
use cirrus_stack::state::StackState;

use crate::output;

/// Arguments for the `synth` command.
#[derive(Args, Debug)]
pub struct SynthArgs {
    /// Stack configuration files (YAML or JSON), one stack each.
    #[arg(required = true, num_args = 1..)]
    pub configs: Vec<PathBuf>,

    /// Stack name; defaults to the configuration file name.
    #[arg(long)]
    pub stack: Option<String>,
}

/// Executes the `synth` command.
///
/// Every stack is composed before anything is written, so a failing stack
/// leaves all documents and state files as they were.
///
/// # Errors
///
/// Returns an error if loading, packaging, composition, or writing fails.
pub fn execute(args: SynthArgs, out: &Path) -> anyhow::Result<()> {
    let stacks = super::load_stacks(&args.configs, args.stack.as_deref())?;
    let mut app = App::new(Packager::new(out));
    for (name, config) in stacks {
        let state = StackState::load_or_new(&super::state_path(out, &name), &name)?;
        app.add_stack(name, config, state)?;
    }

    let syntheses = app.synth_all()?;

    for synthesis in &syntheses {
        // State goes first: a document must never name a token or secret
        // handle that the persisted state does not hold.
        if let Some(state) = app.state(&synthesis.stack) {
            state.save(&super::state_path(out, &synthesis.stack))?;
        }
        let doc_path = out.join(format!("{}{STACK_FILE_SUFFIX}", synthesis.stack));
        synthesis
            .document
            .write_to(&doc_path)
            .with_context(|| format!("failed to write {}", doc_path.display()))?;

        println!("Stack: {}", synthesis.stack);
        output::print_rule();
        println!("  identity:  {}", synthesis.document.metadata.identity_token);
        println!("  resources: {}", synthesis.order.len());
        println!(
            "  artifact:  {} ({})",
            synthesis.artifact.storage_key(),
            output::format_bytes(synthesis.artifact.size_bytes)
        );
        println!("  document:  {}", doc_path.display());
        println!();
    }

    tracing::info!(stacks = syntheses.len(), out = %out.display(), "synthesis complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stack(root: &Path) -> PathBuf {
        let build = root.join("build");
        std::fs::create_dir_all(&build).expect("mkdir build");
        std::fs::write(build.join("index.js"), b"exports.handler = 1;").expect("write handler");
        let config = root.join("prod.yaml");
        std::fs::write(
            &config,
            "path: ./build\nhandler: index.handler\nruntime: runtime14\nstageName: prod\nversion: v1\n",
        )
        .expect("write config");
        config
    }

    #[test]
    fn synth_writes_document_and_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("cirrus.out");
        let args = SynthArgs {
            configs: vec![write_stack(dir.path())],
            stack: None,
        };
        execute(args, &out).expect("synth");

        let state = StackState::load_or_new(&super::super::state_path(&out, "prod"), "prod")
            .expect("state");
        let doc: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(out.join(format!("prod{STACK_FILE_SUFFIX}"))).expect("read"),
        )
        .expect("parse");
        let token = state.identity_token.expect("token persisted");
        assert_eq!(doc["metadata"]["identity_token"], token.as_str());
    }

    #[test]
    fn state_is_saved_even_when_document_write_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("cirrus.out");
        std::fs::create_dir_all(out.join(format!("prod{STACK_FILE_SUFFIX}")))
            .expect("block document path");
        let args = SynthArgs {
            configs: vec![write_stack(dir.path())],
            stack: None,
        };

        assert!(execute(args, &out).is_err());
        assert!(super::super::state_path(&out, "prod").is_file());
    }
}
