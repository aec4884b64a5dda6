//! # Linkage Runtime
//!
//! `Runtime` ties the pieces together. It owns one `SymbolRegistry` and
//! one `ComponentLoader` and turns a set of component declarations into
//! loaded, resolvable components.
//!
//! ## Linking
//!
//! 1.  **Graph**: build the dependency graph from the declarations.
//! 2.  **Missing Dependencies**: a missing required dependency aborts the
//!     link; a missing optional one is reported as a warning and its edge is
//!     dropped.
//! 3.  **Version Requirements**: a present dependency whose declared version
//!     fails the edge constraint is reported as a warning. Symbol-level
//!     resolution still honours the constraint.
//! 4.  **Order**: topological sort; a cycle aborts the link.
//! 5.  **Load**: components with a library are loaded in order and their
//!     declared exports are looked up in the library and registered.
//! 6.  **Edges**: every remaining dependency edge is registered so
//!     resolution can apply the direct-dependency boost.
//!
//! A failure while loading unwinds the components loaded by the same call.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, error, info, warn};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::graph::{ComponentDeclaration, DependencyGraph, MissingDependency};
use crate::lifecycle::{Component, ComponentHooks, ComponentLoader, SweepReport};
use crate::registry::{ConflictReport, DependencyEdge, SymbolRegistry};
use crate::symbols::{Symbol, SymbolAddress, SymbolKind};
use crate::version::VersionConstraint;

/// Outcome of a successful [`Runtime::link`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Topological load order of every declared component.
    pub order: Vec<String>,
    /// Components loaded by this call, in load order.
    pub loaded: Vec<String>,
    /// Non-fatal problems found while linking.
    pub warnings: Vec<String>,
}

/// Registry, loader and the components linked through them.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    registry: SymbolRegistry,
    loader: ComponentLoader,
    components: BTreeMap<String, Component>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, loader: ComponentLoader) -> Self {
        let registry = SymbolRegistry::with_boost(config.direct_dependency_boost);
        Self {
            config,
            registry,
            loader,
            components: BTreeMap::new(),
        }
    }

    /// Runtime using the platform's dynamic loader.
    pub fn native(config: RuntimeConfig) -> Self {
        Self::new(config, ComponentLoader::native())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SymbolRegistry {
        &mut self.registry
    }

    pub fn loader(&self) -> &ComponentLoader {
        &self.loader
    }

    /// Registry and loader together, for callers that need both at once.
    pub fn parts_mut(&mut self) -> (&mut SymbolRegistry, &ComponentLoader) {
        (&mut self.registry, &self.loader)
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    /// Ids of the components currently held by the runtime.
    pub fn component_ids(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    /// Link `declarations` into the runtime. See the module docs.
    pub fn link(&mut self, declarations: &[ComponentDeclaration]) -> Result<LinkReport> {
        let mut report = LinkReport::default();
        let mut graph = DependencyGraph::build(declarations)?;

        for missing in graph.check_missing_dependencies() {
            if !missing.optional {
                error!(
                    "Component '{}' requires missing dependency '{}'",
                    missing.component_id,
                    missing.missing_id
                );
                return Err(Error::MissingDependency {
                    component: missing.component_id,
                    dependency: missing.missing_id,
                });
            }
            let message = describe_missing(&missing);
            warn!("{}", message);
            graph.drop_dependency(&missing.component_id, &missing.missing_id);
            report.warnings.push(message);
        }

        for mismatch in graph.check_version_requirements() {
            let message = format!(
                "Component '{}' requires '{}' {} but {} is declared",
                mismatch.component_id, mismatch.dependency_id, mismatch.constraint, mismatch.found
            );
            warn!("{}", message);
            report.warnings.push(message);
        }

        let order = graph.topological_sort()?;
        info!("Linking {} component(s): {}", order.len(), order.join(", "));

        for id in &order {
            let Some(declaration) = graph.get(id) else {
                continue;
            };
            match self.link_one(declaration, &mut report) {
                Ok(true) => report.loaded.push(id.clone()),
                Ok(false) => {}
                Err(e) => {
                    self.unwind(&report.loaded);
                    return Err(e);
                }
            }
        }

        for declaration in graph.nodes() {
            for dep in &declaration.dependencies {
                let mut edge =
                    DependencyEdge::new(declaration.id.as_str(), dep.id.as_str()).optional(dep.optional);
                edge.constraint = dep.constraint.clone();
                self.registry.add_dependency(edge)?;
            }
        }

        report.order = order;
        Ok(report)
    }

    /// Load one component and register its exports. Ok(false) if there was
    /// nothing to load.
    fn link_one(
        &mut self,
        declaration: &ComponentDeclaration,
        report: &mut LinkReport,
    ) -> Result<bool> {
        if self.components.contains_key(&declaration.id) {
            debug!("Component '{}' is already linked", declaration.id);
            return Ok(false);
        }
        let Some(library) = &declaration.library else {
            if !declaration.exports.is_empty() {
                let message = format!(
                    "Component '{}' declares exports but no library",
                    declaration.id
                );
                warn!("{}", message);
                report.warnings.push(message);
            }
            return Ok(false);
        };

        let path = self.config.locate_library(library);
        let component = self.loader.load(&path, &declaration.id)?;

        for export in &declaration.exports {
            let address = match self.loader.lookup(&component, &export.name) {
                Ok(Some(address)) => address,
                Ok(None) => {
                    let message = format!(
                        "Symbol '{}' declared by '{}' is not in {}",
                        export.name,
                        declaration.id,
                        path.display()
                    );
                    warn!("{}", message);
                    report.warnings.push(message);
                    continue;
                }
                Err(e) => {
                    self.abandon(component);
                    return Err(e);
                }
            };
            let symbol = Symbol::new(
                export.name.as_str(),
                export.version.clone(),
                address,
                export.kind,
                declaration.id.as_str(),
                self.config.default_priority,
            );
            match self.registry.export(symbol) {
                Ok(()) => {}
                // Still registered from an earlier load of the same library.
                Err(Error::AlreadyLoaded { .. }) => {
                    debug!("'{}' from '{}' is already registered", export.name, declaration.id);
                }
                Err(e) => {
                    self.abandon(component);
                    return Err(e);
                }
            }
        }

        self.components.insert(declaration.id.clone(), component);
        Ok(true)
    }

    fn abandon(&mut self, component: Component) {
        let owner = [component.id().to_string()];
        self.registry.purge_owners(&owner);
        if let Err(e) = self.loader.unload(component) {
            warn!("Failed to unload during rollback: {}", e);
        }
    }

    fn unwind(&mut self, loaded: &[String]) {
        for id in loaded.iter().rev() {
            if let Some(component) = self.components.remove(id) {
                self.abandon(component);
            }
        }
    }

    /// Load a single component outside of `link`.
    pub fn load_component(
        &mut self,
        path: impl AsRef<Path>,
        id: &str,
        hooks: Option<Box<dyn ComponentHooks>>,
    ) -> Result<()> {
        if self.components.contains_key(id) {
            return Err(Error::AlreadyLoaded {
                what: format!("component '{}'", id),
            });
        }
        let path = self.config.locate_library(path.as_ref());
        let component = self.loader.load_with_hooks(&path, id, hooks)?;
        self.components.insert(id.to_string(), component);
        Ok(())
    }

    /// Drop the component's bindings and its reference to its handle.
    ///
    /// Its exported symbols stay registered until a sweep closes the
    /// library.
    pub fn unload_component(&mut self, id: &str) -> Result<bool> {
        let Some(component) = self.components.remove(id) else {
            return Ok(false);
        };
        let released = self.registry.release_context(id);
        debug!("Released {} binding(s) held by '{}'", released, id);
        self.loader.unload(component)?;
        Ok(true)
    }

    /// Run the sweep if `auto_unload` is enabled.
    pub fn maintain(&mut self) -> Result<SweepReport> {
        if !self.config.auto_unload {
            return Ok(SweepReport::default());
        }
        self.sweep()
    }

    /// Run the sweep with the configured idle threshold.
    pub fn sweep(&mut self) -> Result<SweepReport> {
        let idle = self.config.idle_threshold();
        self.loader.unused_sweep(&mut self.registry, idle)
    }

    pub fn resolve(
        &mut self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        requesting: &str,
    ) -> Result<SymbolAddress> {
        self.registry.resolve(name, constraint, requesting)
    }

    pub fn resolve_typed(
        &mut self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        expected: SymbolKind,
        requesting: &str,
    ) -> Result<SymbolAddress> {
        self.registry
            .resolve_typed(name, constraint, expected, requesting)
    }

    pub fn detect_conflicts(&self, component: &str) -> Vec<ConflictReport> {
        self.registry.detect_conflicts(component)
    }
}

/// Missing dependencies of `declarations` without loading anything.
pub fn check_dependencies(declarations: &[ComponentDeclaration]) -> Result<Vec<MissingDependency>> {
    Ok(DependencyGraph::build(declarations)?.check_missing_dependencies())
}

/// A registry populated from declarations alone, for diagnostics.
///
/// Exports are registered at a null address and dependency edges as
/// declared; nothing is loaded.
pub fn declared_registry(
    declarations: &[ComponentDeclaration],
    config: &RuntimeConfig,
) -> Result<SymbolRegistry> {
    let mut registry = SymbolRegistry::with_boost(config.direct_dependency_boost);
    for declaration in declarations {
        for export in &declaration.exports {
            registry.export(Symbol::new(
                export.name.as_str(),
                export.version.clone(),
                SymbolAddress::new(0),
                export.kind,
                declaration.id.as_str(),
                config.default_priority,
            ))?;
        }
        for dep in &declaration.dependencies {
            let mut edge =
                DependencyEdge::new(declaration.id.as_str(), dep.id.as_str()).optional(dep.optional);
            edge.constraint = dep.constraint.clone();
            registry.add_dependency(edge)?;
        }
    }
    Ok(registry)
}

fn describe_missing(missing: &MissingDependency) -> String {
    match &missing.constraint {
        Some(constraint) => format!(
            "Optional dependency '{}' {} of '{}' is missing",
            missing.missing_id, constraint, missing.component_id
        ),
        None => format!(
            "Optional dependency '{}' of '{}' is missing",
            missing.missing_id, missing.component_id
        ),
    }
}
