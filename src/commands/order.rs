//! # Order Command Implementation
//!
//! Prints the order in which the components described by a manifest
//! directory would be loaded, dependencies first. Fails on a dependency
//! cycle or a missing required dependency.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use complink::graph::{ComponentDeclaration, DependencyGraph};

use super::load_declarations;

/// Print the order in which components would be loaded
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Directory containing component manifests (*.json).
    #[arg(short, long, value_name = "DIR", default_value = "components")]
    pub manifests: PathBuf,
}

/// Execute the `order` command.
pub fn execute(args: OrderArgs) -> Result<()> {
    let declarations = load_declarations(&args.manifests)?;
    for line in render(&declarations)? {
        println!("{}", line);
    }
    Ok(())
}

fn render(declarations: &[ComponentDeclaration]) -> Result<Vec<String>> {
    let graph = DependencyGraph::build(declarations)?;

    let required: Vec<String> = graph
        .check_missing_dependencies()
        .into_iter()
        .filter(|m| !m.optional)
        .map(|m| format!("{} -> {}", m.component_id, m.missing_id))
        .collect();
    if !required.is_empty() {
        return Err(anyhow::anyhow!(
            "Missing required dependencies: {}",
            required.join(", ")
        ));
    }

    let order = graph.topological_sort()?;
    Ok(order
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            graph
                .get(id)
                .map(|decl| format!("{:>3}. {} {}", i + 1, decl.id, decl.version))
        })
        .collect())
}
