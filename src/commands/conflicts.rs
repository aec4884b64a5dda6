//! # Conflicts Command Implementation
//!
//! Registers every export declared in a manifest directory, without
//! loading any library, and lists symbol names that are exported in more
//! than one version. With `--component`, each entry also shows which
//! version that component would be bound to.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use complink::config::{self, RuntimeConfig};
use complink::graph::ComponentDeclaration;
use complink::runtime::declared_registry;

use super::load_declarations;

/// List symbols exported in more than one version
#[derive(Args, Debug)]
pub struct ConflictsArgs {
    /// Directory containing component manifests (*.json).
    #[arg(short, long, value_name = "DIR", default_value = "components")]
    pub manifests: PathBuf,

    /// Component whose point of view is used to show the selected version.
    #[arg(long, value_name = "ID")]
    pub component: Option<String>,

    /// Runtime configuration file (YAML).
    #[arg(long, value_name = "FILE", env = "COMPLINK_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Execute the `conflicts` command.
pub fn execute(args: ConflictsArgs) -> Result<()> {
    let runtime_config = match &args.config {
        Some(path) => config::from_file(path).map_err(|e| {
            anyhow::anyhow!("Failed to load config from {}: {}", path.display(), e)
        })?,
        None => RuntimeConfig::default(),
    };
    let declarations = load_declarations(&args.manifests)?;

    for line in render(&declarations, &runtime_config, args.component.as_deref())? {
        println!("{}", line);
    }
    Ok(())
}

fn render(
    declarations: &[ComponentDeclaration],
    runtime_config: &RuntimeConfig,
    component: Option<&str>,
) -> Result<Vec<String>> {
    let registry = declared_registry(declarations, runtime_config)?;
    let reports = registry.detect_conflicts(component.unwrap_or_default());

    if reports.is_empty() {
        return Ok(vec!["No version conflicts".to_string()]);
    }

    let mut lines = Vec::new();
    for report in reports {
        lines.push(report.name.clone());
        for (version, owner) in &report.providers {
            lines.push(format!("  {} from {}", version, owner));
        }
        if let (Some(id), Some((version, owner))) = (component, &report.selected) {
            lines.push(format!("  selected for {}: {} from {}", id, version, owner));
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures;

    fn diamond() -> Vec<ComponentDeclaration> {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write(dir.path(), fixtures::DIAMOND);
        load_declarations(dir.path()).unwrap()
    }

    #[test]
    fn test_render_lists_providers() {
        let lines = render(&diamond(), &RuntimeConfig::default(), None).unwrap();
        assert_eq!(
            lines,
            vec![
                "log_base10",
                "  1.0.0 from LibCore",
                "  2.0.0 from LibCore"
            ]
        );
    }

    #[test]
    fn test_render_selection_follows_edge_constraint() {
        let config = RuntimeConfig::default();
        let math = render(&diamond(), &config, Some("LibMath1")).unwrap();
        assert_eq!(math[3], "  selected for LibMath1: 1.0.0 from LibCore");
        let stats = render(&diamond(), &config, Some("LibStats")).unwrap();
        assert_eq!(stats[3], "  selected for LibStats: 2.0.0 from LibCore");
    }

    #[test]
    fn test_render_no_conflicts() {
        let lines = render(&[], &RuntimeConfig::default(), None).unwrap();
        assert_eq!(lines, vec!["No version conflicts"]);
    }

    #[test]
    fn test_execute_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        fixtures::write(dir.path(), fixtures::DIAMOND);
        let config_path = dir.path().join("complink.yaml");
        std::fs::write(&config_path, "no_such_key: 1\n").unwrap();

        let err = execute(ConflictsArgs {
            manifests: dir.path().to_path_buf(),
            component: None,
            config: Some(config_path),
        })
        .unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
