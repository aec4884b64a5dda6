//! # Tree Command Implementation
//!
//! Displays the component dependency tree in a hierarchical format, one
//! tree per root component (a component nothing else depends on).
//!
//! - **Depth Control**: `--depth` limits how far below the roots to descend.
//! - **Annotations**: edges show their version requirement; missing
//!   dependencies and back edges of a cycle are marked instead of expanded.
//! - **DOT Output**: `--format dot` prints the whole edge set as a Graphviz
//!   digraph instead.

use anyhow::Result;
use clap::{Args, ValueEnum};
use ptree::{print_tree, TreeItem};
use std::path::PathBuf;

use complink::graph::{DependencyGraph, DependencySpec};

use super::load_declarations;

/// Display the component dependency tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Directory containing component manifests (*.json).
    #[arg(short, long, value_name = "DIR", default_value = "components")]
    pub manifests: PathBuf,

    /// Maximum depth to display in the tree.
    ///
    /// If not specified, displays the full tree.
    /// Use 0 to show only the roots, 1 to show their direct dependencies, etc.
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: TreeFormat,
}

/// How the tree is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum TreeFormat {
    /// Indented tree per root component
    #[default]
    Text,
    /// Graphviz DOT digraph of every dependency edge
    Dot,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs) -> Result<()> {
    let declarations = load_declarations(&args.manifests)?;
    let graph = DependencyGraph::build(&declarations)?;
    if args.format == TreeFormat::Dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }
    println!("Component dependency tree for: {}", args.manifests.display());

    for root in build_forest(&graph, args.depth.unwrap_or(usize::MAX)) {
        print_tree(&root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    }
    Ok(())
}

fn build_forest(graph: &DependencyGraph, max_depth: usize) -> Vec<TreeNode> {
    let mut roots: Vec<&str> = graph.roots().iter().map(|d| d.id.as_str()).collect();
    if roots.is_empty() {
        // Every component is depended on, so the whole set is cyclic.
        roots = graph.nodes().iter().map(|d| d.id.as_str()).collect();
    }
    roots
        .into_iter()
        .map(|id| build_tree_node(graph, id, None, max_depth, &mut Vec::new()))
        .collect()
}

/// Build a tree node for `id`; `path` holds the ids above it.
fn build_tree_node(
    graph: &DependencyGraph,
    id: &str,
    edge: Option<&DependencySpec>,
    max_depth: usize,
    path: &mut Vec<String>,
) -> TreeNode {
    let requirement = edge
        .and_then(|e| e.constraint.as_ref())
        .map(|c| format!(" [{}]", c))
        .unwrap_or_default();
    let optional = if edge.is_some_and(|e| e.optional) {
        " (optional)"
    } else {
        ""
    };

    let Some(declaration) = graph.get(id) else {
        return TreeNode::leaf(format!("{}{}{} (missing)", id, requirement, optional));
    };
    let label = format!("{} {}{}{}", declaration.id, declaration.version, requirement, optional);

    if path.iter().any(|p| p == id) {
        return TreeNode::leaf(format!("{} (cycle)", label));
    }
    if path.len() >= max_depth || declaration.dependencies.is_empty() {
        return TreeNode::leaf(label);
    }

    path.push(id.to_string());
    let children = declaration
        .dependencies
        .iter()
        .map(|dep| build_tree_node(graph, &dep.id, Some(dep), max_depth, path))
        .collect();
    path.pop();
    TreeNode { label, children }
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: String) -> Self {
        Self {
            label,
            children: vec![],
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(
        &self,
        f: &mut W,
        _style: &ptree::Style,
    ) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> std::borrow::Cow<'_, [Self::Child]> {
        std::borrow::Cow::Borrowed(&self.children)
    }
}
