//! # Check Command Implementation
//!
//! Validates a manifest directory: reports missing dependencies and
//! dependencies declared at a version their dependents do not accept.
//!
//! A missing required dependency makes the command fail. Missing optional
//! dependencies and version mismatches are reported but do not.
//!
//! This command is a safe, read-only operation that does not load anything.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use complink::graph::{ComponentDeclaration, DependencyGraph};

use super::load_declarations;

/// Report missing and mismatched dependencies
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Directory containing component manifests (*.json).
    #[arg(short, long, value_name = "DIR", default_value = "components")]
    pub manifests: PathBuf,
}

/// Findings of one check run.
#[derive(Debug, Default)]
struct CheckOutcome {
    lines: Vec<String>,
    required_missing: usize,
}

/// Execute the `check` command.
pub fn execute(args: CheckArgs) -> Result<()> {
    let declarations = load_declarations(&args.manifests)?;
    println!(
        "Checking {} component(s) in {}",
        declarations.len(),
        args.manifests.display()
    );

    let outcome = check(&declarations)?;
    for line in &outcome.lines {
        println!("{}", line);
    }

    if outcome.required_missing > 0 {
        return Err(anyhow::anyhow!(
            "{} required dependenc{} missing",
            outcome.required_missing,
            if outcome.required_missing == 1 {
                "y is"
            } else {
                "ies are"
            }
        ));
    }
    Ok(())
}

fn check(declarations: &[ComponentDeclaration]) -> Result<CheckOutcome> {
    let graph = DependencyGraph::build(declarations)?;
    let mut outcome = CheckOutcome::default();

    for missing in graph.check_missing_dependencies() {
        let requirement = missing
            .constraint
            .as_ref()
            .map(|c| format!(" {}", c))
            .unwrap_or_default();
        let kind = if missing.optional {
            "optional"
        } else {
            outcome.required_missing += 1;
            "required"
        };
        outcome.lines.push(format!(
            "missing: {} -> {}{} ({})",
            missing.component_id, missing.missing_id, requirement, kind
        ));
    }

    for mismatch in graph.check_version_requirements() {
        outcome.lines.push(format!(
            "version: {} -> {} {} (declared {})",
            mismatch.component_id, mismatch.dependency_id, mismatch.constraint, mismatch.found
        ));
    }

    if outcome.lines.is_empty() {
        outcome.lines.push("All dependencies satisfied".to_string());
    }
    Ok(outcome)
}
