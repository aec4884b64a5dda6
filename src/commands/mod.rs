//! # CLI Command Implementations
//!
//! Each subcommand of the `complink` tool lives in its own file and
//! contains:
//! - An `Args` struct with the command's options, derived using `clap`.
//! - An `execute` function that takes the parsed `Args`, calls into the
//!   `complink` library and prints the result.
//!
//! Every command reads component manifests from a directory; loading them is
//! shared here.

pub mod check;
pub mod conflicts;
pub mod order;
pub mod tree;

use anyhow::Result;
use std::path::Path;

use complink::graph::ComponentDeclaration;
use complink::manifest;

/// Discover and validate every manifest in `dir`.
pub fn load_declarations(dir: &Path) -> Result<Vec<ComponentDeclaration>> {
    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Manifest directory not found: {}",
            dir.display()
        ));
    }
    let manifests = manifest::discover(dir)
        .map_err(|e| anyhow::anyhow!("Failed to read manifests from {}: {}", dir.display(), e))?;
    let declarations = manifest::declarations(&manifests)
        .map_err(|e| anyhow::anyhow!("Invalid manifest: {}", e))?;
    Ok(declarations)
}
