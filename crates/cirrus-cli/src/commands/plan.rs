//! `cirrus plan`: Display the resolved resource order of a stack.

use std::path::{Path, PathBuf};

use clap::Args;
use cirrus_artifact::Packager;
use cirrus_graph::node::OutputValue;
use cirrus_stack::compose;
use cirrus_stack::state::StackState;

use crate::output;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Stack configuration file (YAML or JSON).
    pub config: PathBuf,

    /// Stack name; defaults to the configuration file name.
    #[arg(long)]
    pub stack: Option<String>,
}

/// Executes the `plan` command.
///
/// Composes the stack against its persisted state and prints every
/// resource in resolution order with its dependencies. Neither the state
/// nor the document is written.
///
/// # Errors
///
/// Returns an error if loading, packaging, or composition fails.
pub fn execute(args: PlanArgs, out: &Path) -> anyhow::Result<()> {
    let mut stacks = super::load_stacks(std::slice::from_ref(&args.config), args.stack.as_deref())?;
    let Some((name, config)) = stacks.pop() else {
        anyhow::bail!("no configuration given");
    };
    let mut state = StackState::load_or_new(&super::state_path(out, &name), &name)?;
    let synthesis = compose(&name, &config, &mut state, &Packager::new(out))?;

    println!("Resource Plan for: {name}");
    output::print_rule();
    println!();

    for id in &synthesis.order {
        let Some(node) = synthesis.graph.node(id) else {
            continue;
        };
        println!("  + {id} ({})", node.kind());
        for dependency in synthesis.graph.dependencies_of(id) {
            println!("      after: {dependency}");
        }
        for (output_name, value) in node.outputs() {
            if let OutputValue::Known(value) = value {
                if let Ok(json) = serde_json::to_string(value) {
                    println!("      {output_name}: {json}");
                }
            }
        }
    }

    println!();
    println!("  {} resource(s) in stack.", synthesis.order.len());

    let edges = synthesis.graph.edges();
    if !edges.is_empty() {
        println!();
        println!("  References:");
        for edge in &edges {
            println!(
                "    {}.{} -> {}.{}",
                edge.from, edge.attribute, edge.to, edge.output_attribute
            );
        }
    }

    Ok(())
}
