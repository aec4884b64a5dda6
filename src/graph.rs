//! # Dependency Graph and Load Ordering
//!
//! Builds a node/edge graph from component declarations and derives a load
//! order in which every component comes after the components it depends on.
//!
//! ## Process
//!
//! 1.  **Build**: one node per declared component, in declaration order.
//!     Each declared dependency becomes an edge carrying its optional version
//!     constraint and optional flag. Edges may point at ids that are not
//!     declared; those are reported by `check_missing_dependencies` and
//!     skipped by traversal.
//!
//! 2.  **Cycle Detection**: depth-first traversal with three marks
//!     (unvisited, in progress, done). Re-entering an in-progress node means
//!     the edge just followed closes a cycle, and that edge is reported.
//!
//! 3.  **Ordering**: the same traversal collects nodes in post-order.
//!     Following dependency edges, a node is emitted only after all of its
//!     dependencies, so the collected order can be loaded front to back.
//!     Roots are visited in declaration order, which makes the result
//!     deterministic.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, error};

use crate::error::{Error, Result};
use crate::symbols::SymbolKind;
use crate::version::{SemanticVersion, VersionConstraint};

/// One declared dependency of a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub id: String,
    pub constraint: Option<VersionConstraint>,
    pub optional: bool,
}

impl DependencySpec {
    pub fn required(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            constraint: None,
            optional: false,
        }
    }

    pub fn optional(id: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::required(id)
        }
    }

    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = if constraint.is_any() {
            None
        } else {
            Some(constraint)
        };
        self
    }
}

/// A symbol a component declares it exports or imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolDeclaration {
    pub name: String,
    pub version: SemanticVersion,
    pub kind: SymbolKind,
}

impl SymbolDeclaration {
    pub fn new(name: impl Into<String>, version: SemanticVersion, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            version,
            kind,
        }
    }
}

/// Everything the graph and the runtime need to know about a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDeclaration {
    pub id: String,
    pub version: SemanticVersion,
    /// Shared library backing the component, if it has one.
    pub library: Option<PathBuf>,
    pub dependencies: Vec<DependencySpec>,
    pub exports: Vec<SymbolDeclaration>,
    pub imports: Vec<SymbolDeclaration>,
}

impl ComponentDeclaration {
    pub fn new(id: impl Into<String>, version: SemanticVersion) -> Self {
        Self {
            id: id.into(),
            version,
            library: None,
            dependencies: Vec::new(),
            exports: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    pub fn depends_on(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn exports(mut self, symbol: SymbolDeclaration) -> Self {
        self.exports.push(symbol);
        self
    }
}

/// A declared dependency whose target is not in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub component_id: String,
    pub missing_id: String,
    pub constraint: Option<VersionConstraint>,
    pub optional: bool,
}

/// A declared dependency that is present but at an unacceptable version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub component_id: String,
    pub dependency_id: String,
    pub constraint: VersionConstraint,
    pub found: SemanticVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Component dependency graph in declaration order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ComponentDeclaration>,
    index: HashMap<String, usize>,
}

/// Build a graph from declarations. See [`DependencyGraph::build`].
pub fn build_graph(declarations: &[ComponentDeclaration]) -> Result<DependencyGraph> {
    DependencyGraph::build(declarations)
}

impl DependencyGraph {
    /// One node per declaration. A repeated id fails with `AlreadyLoaded`.
    pub fn build(declarations: &[ComponentDeclaration]) -> Result<Self> {
        let mut nodes = Vec::new();
        nodes.try_reserve(declarations.len())?;
        let mut index = HashMap::new();
        index.try_reserve(declarations.len())?;

        for declaration in declarations {
            if index.contains_key(&declaration.id) {
                return Err(Error::AlreadyLoaded {
                    what: format!("component '{}'", declaration.id),
                });
            }
            index.insert(declaration.id.clone(), nodes.len());
            nodes.push(declaration.clone());
        }

        let edges: usize = nodes.iter().map(|n| n.dependencies.len()).sum();
        debug!(
            "Built dependency graph with {} components and {} edges",
            nodes.len(),
            edges
        );
        Ok(Self { nodes, index })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ComponentDeclaration> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Declarations in declaration order.
    pub fn nodes(&self) -> &[ComponentDeclaration] {
        &self.nodes
    }

    /// Components with no declared dependents, in declaration order.
    pub fn roots(&self) -> Vec<&ComponentDeclaration> {
        self.nodes
            .iter()
            .filter(|node| {
                !self
                    .nodes
                    .iter()
                    .any(|other| other.dependencies.iter().any(|d| d.id == node.id))
            })
            .collect()
    }

    /// Remove the edge `from -> to`. Returns whether an edge was removed.
    pub fn drop_dependency(&mut self, from: &str, to: &str) -> bool {
        let Some(&i) = self.index.get(from) else {
            return false;
        };
        let deps = &mut self.nodes[i].dependencies;
        let before = deps.len();
        deps.retain(|d| d.id != to);
        deps.len() != before
    }

    /// Fail with `DependencyCycle` naming an edge on the first cycle found.
    pub fn detect_cycles(&self) -> Result<()> {
        self.traverse().map(|_| ())
    }

    /// Order in which components can be loaded, dependencies first.
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let order = self.traverse()?;
        debug!("Load order: {}", order.join(" -> "));
        Ok(order)
    }

    /// Every declared dependency whose target is not a node.
    ///
    /// Never fails; callers treat required entries as fatal and optional
    /// ones as warnings.
    pub fn check_missing_dependencies(&self) -> Vec<MissingDependency> {
        let mut missing = Vec::new();
        for node in &self.nodes {
            for dep in &node.dependencies {
                if !self.contains(&dep.id) {
                    missing.push(MissingDependency {
                        component_id: node.id.clone(),
                        missing_id: dep.id.clone(),
                        constraint: dep.constraint.clone(),
                        optional: dep.optional,
                    });
                }
            }
        }
        missing
    }

    /// Present dependencies whose declared version fails the edge constraint.
    pub fn check_version_requirements(&self) -> Vec<VersionMismatch> {
        let mut mismatches = Vec::new();
        for node in &self.nodes {
            for dep in &node.dependencies {
                let (Some(constraint), Some(target)) = (&dep.constraint, self.get(&dep.id)) else {
                    continue;
                };
                if !constraint.matches(&target.version) {
                    mismatches.push(VersionMismatch {
                        component_id: node.id.clone(),
                        dependency_id: dep.id.clone(),
                        constraint: constraint.clone(),
                        found: target.version.clone(),
                    });
                }
            }
        }
        mismatches
    }

    /// Render the graph in Graphviz DOT.
    ///
    /// Edges carry their version constraint as a label; optional edges are
    /// dashed. Undeclared targets are drawn as red "(missing)" nodes.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph components {\n");
        for node in &self.nodes {
            dot.push_str(&format!(
                "    {} [label={}];\n",
                quote(&node.id),
                quote(&format!("{} {}", node.id, node.version))
            ));
        }

        let mut missing: Vec<&str> = Vec::new();
        for node in &self.nodes {
            for dep in &node.dependencies {
                let mut attrs = Vec::new();
                if let Some(constraint) = &dep.constraint {
                    attrs.push(format!("label={}", quote(&constraint.to_string())));
                }
                if dep.optional {
                    attrs.push("style=dashed".to_string());
                }
                let attrs = if attrs.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", attrs.join(", "))
                };
                dot.push_str(&format!(
                    "    {} -> {}{};\n",
                    quote(&node.id),
                    quote(&dep.id),
                    attrs
                ));
                if !self.contains(&dep.id) && !missing.contains(&dep.id.as_str()) {
                    missing.push(&dep.id);
                }
            }
        }

        for id in missing {
            dot.push_str(&format!(
                "    {} [label={}, color=red];\n",
                quote(id),
                quote(&format!("{} (missing)", id))
            ));
        }
        dot.push_str("}\n");
        dot
    }

    fn traverse(&self) -> Result<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::new();
        order.try_reserve(self.nodes.len())?;

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut order)?;
            }
        }
        Ok(order)
    }

    /// Depth-first walk from `start` on an explicit stack of
    /// `(node, next dependency index)` frames.
    fn visit(&self, start: usize, marks: &mut [Mark], order: &mut Vec<String>) -> Result<()> {
        let mut stack = vec![(start, 0usize)];
        marks[start] = Mark::InProgress;

        while let Some(frame) = stack.last_mut() {
            let (node, next_dep) = *frame;
            let Some(dep) = self.nodes[node].dependencies.get(next_dep) else {
                stack.pop();
                marks[node] = Mark::Done;
                order.push(self.nodes[node].id.clone());
                continue;
            };
            frame.1 += 1;

            let Some(&next) = self.index.get(&dep.id) else {
                continue;
            };
            match marks[next] {
                Mark::Done => {}
                Mark::InProgress => {
                    let from = self.nodes[node].id.clone();
                    let to = self.nodes[next].id.clone();
                    error!("Dependency cycle detected: {} -> {}", from, to);
                    return Err(Error::DependencyCycle { from, to });
                }
                Mark::Unvisited => {
                    marks[next] = Mark::InProgress;
                    stack.try_reserve(1)?;
                    stack.push((next, 0));
                }
            }
        }
        Ok(())
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(id: &str, deps: &[&str]) -> ComponentDeclaration {
        let mut d = ComponentDeclaration::new(id, SemanticVersion::new(1, 0, 0));
        for dep in deps {
            d = d.depends_on(DependencySpec::required(*dep));
        }
        d
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_topological_sort_dependencies_first() {
        let graph = DependencyGraph::build(&[
            decl("App", &["Math", "Stats"]),
            decl("Math", &["Core"]),
            decl("Stats", &["Core"]),
            decl("Core", &[]),
        ])
        .unwrap();

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["Core", "Math", "Stats", "App"]);
        for node in graph.nodes() {
            for dep in &node.dependencies {
                assert!(position(&order, &dep.id) < position(&order, &node.id));
            }
        }
    }

    #[test]
    fn test_topological_sort_independent_in_declaration_order() {
        let graph =
            DependencyGraph::build(&[decl("Z", &[]), decl("A", &[]), decl("M", &[])]).unwrap();
        assert_eq!(graph.topological_sort().unwrap(), vec!["Z", "A", "M"]);
    }

    #[test]
    fn test_cycle_names_edge_on_cycle() {
        let graph =
            DependencyGraph::build(&[decl("A", &["B"]), decl("B", &["C"]), decl("C", &["A"])])
                .unwrap();

        let on_cycle = [("A", "B"), ("B", "C"), ("C", "A")];
        for result in [graph.detect_cycles(), graph.topological_sort().map(|_| ())] {
            match result {
                Err(Error::DependencyCycle { from, to }) => {
                    assert!(on_cycle.contains(&(from.as_str(), to.as_str())));
                }
                other => panic!("expected cycle, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_deep_chain_does_not_exhaust_stack() {
        let len = 100_000;
        let chain: Vec<ComponentDeclaration> = (0..len)
            .map(|i| {
                let id = format!("c{}", i);
                if i + 1 < len {
                    decl(&id, &[format!("c{}", i + 1).as_str()])
                } else {
                    decl(&id, &[])
                }
            })
            .collect();
        let graph = DependencyGraph::build(&chain).unwrap();

        let order = graph.topological_sort().unwrap();
        assert_eq!(order.len(), len);
        assert_eq!(order[0], format!("c{}", len - 1));
        assert_eq!(order[len - 1], "c0");
        assert!(graph.detect_cycles().is_ok());
    }

    #[test]
    fn test_deep_cycle_names_closing_edge() {
        let len = 100_000;
        let ring: Vec<ComponentDeclaration> = (0..len)
            .map(|i| decl(&format!("c{}", i), &[format!("c{}", (i + 1) % len).as_str()]))
            .collect();
        let graph = DependencyGraph::build(&ring).unwrap();

        match graph.topological_sort() {
            Err(Error::DependencyCycle { from, to }) => {
                assert_eq!(from, format!("c{}", len - 1));
                assert_eq!(to, "c0");
            }
            other => panic!("expected cycle, got {:?}", other.map(|o| o.len())),
        }
    }

    #[test]
    fn test_to_dot_lists_nodes_and_edges() {
        let graph = DependencyGraph::build(&[
            decl("App", &["Math"]),
            ComponentDeclaration::new("Math", SemanticVersion::new(1, 2, 0))
                .depends_on(
                    DependencySpec::required("Core")
                        .with_constraint(VersionConstraint::parse("^2.0.0").unwrap()),
                )
                .depends_on(DependencySpec::optional("Plugin")),
            decl("Core", &[]),
        ])
        .unwrap();

        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph components {\n"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("    \"Math\" [label=\"Math 1.2.0\"];\n"));
        assert!(dot.contains("    \"App\" -> \"Math\";\n"));
        assert!(dot.contains("    \"Math\" -> \"Core\" [label=\"^2.0.0\"];\n"));
        assert!(dot.contains("    \"Math\" -> \"Plugin\" [style=dashed];\n"));
        assert!(dot.contains("    \"Plugin\" [label=\"Plugin (missing)\", color=red];\n"));
    }

    #[test]
    fn test_to_dot_escapes_quotes() {
        let graph = DependencyGraph::build(&[decl("say \"hi\"", &[])]).unwrap();
        assert!(graph.to_dot().contains(r#""say \"hi\"""#));
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = DependencyGraph::build(&[decl("A", &["A"])]).unwrap();
        assert!(matches!(
            graph.detect_cycles(),
            Err(Error::DependencyCycle { from, to }) if from == "A" && to == "A"
        ));
    }

    #[test]
    fn test_cycle_is_logged() {
        testing_logger::setup();
        let graph = DependencyGraph::build(&[decl("A", &["B"]), decl("B", &["A"])]).unwrap();
        assert!(graph.detect_cycles().is_err());
        testing_logger::validate(|logs| {
            assert!(logs
                .iter()
                .any(|l| l.level == log::Level::Error && l.body.contains("cycle")));
        });
    }

    #[test]
    fn test_check_missing_dependencies() {
        let graph = DependencyGraph::build(&[decl("D", &["Z"]), decl("E", &[])]).unwrap();
        let missing = graph.check_missing_dependencies();
        assert_eq!(
            missing,
            vec![MissingDependency {
                component_id: "D".to_string(),
                missing_id: "Z".to_string(),
                constraint: None,
                optional: false,
            }]
        );
        // Missing targets do not block ordering.
        assert_eq!(graph.topological_sort().unwrap(), vec!["D", "E"]);
    }

    #[test]
    fn test_optional_missing_is_flagged() {
        let d = ComponentDeclaration::new("D", SemanticVersion::new(1, 0, 0)).depends_on(
            DependencySpec::optional("Plugin")
                .with_constraint(VersionConstraint::parse("^2.0.0").unwrap()),
        );
        let mut graph = DependencyGraph::build(&[d]).unwrap();
        let missing = graph.check_missing_dependencies();
        assert_eq!(missing.len(), 1);
        assert!(missing[0].optional);
        assert_eq!(missing[0].constraint.as_ref().unwrap().to_string(), "^2.0.0");

        assert!(graph.drop_dependency("D", "Plugin"));
        assert!(graph.check_missing_dependencies().is_empty());
        assert!(!graph.drop_dependency("D", "Plugin"));
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let err = DependencyGraph::build(&[decl("A", &[]), decl("A", &[])]).unwrap_err();
        assert!(matches!(err, Error::AlreadyLoaded { .. }));
    }

    #[test]
    fn test_version_requirements() {
        let core = ComponentDeclaration::new("Core", SemanticVersion::new(2, 1, 0));
        let old = ComponentDeclaration::new("Old", SemanticVersion::new(1, 0, 0)).depends_on(
            DependencySpec::required("Core")
                .with_constraint(VersionConstraint::parse("^1.0.0").unwrap()),
        );
        let new = ComponentDeclaration::new("New", SemanticVersion::new(1, 0, 0)).depends_on(
            DependencySpec::required("Core")
                .with_constraint(VersionConstraint::parse("^2.0.0").unwrap()),
        );
        let graph = DependencyGraph::build(&[core, old, new]).unwrap();
        let mismatches = graph.check_version_requirements();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].component_id, "Old");
        assert_eq!(mismatches[0].found, SemanticVersion::new(2, 1, 0));
    }

    #[test]
    fn test_roots() {
        let graph =
            DependencyGraph::build(&[decl("Core", &[]), decl("App", &["Core"]), decl("Tool", &[])])
                .unwrap();
        let roots: Vec<&str> = graph.roots().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(roots, vec!["App", "Tool"]);
    }
}
