//! # Context-Aware Symbol Registry
//!
//! The `SymbolRegistry` owns the three symbol tiers and the component
//! dependency edges, and answers the question "which `calc` does component
//! `AppX` get?" even when several versions of `calc` are live at once.
//!
//! ## Tiers
//!
//! - **Exported**: symbols published by loaded components. The
//!   `(name, version, owner)` triple is unique within this tier.
//! - **Global**: unowned, process-wide symbols consulted as a fallback.
//! - **Imported**: memoized bindings, keyed by requesting component, symbol
//!   name and constraint, so a repeated lookup skips candidate selection.
//!
//! ## Resolution
//!
//! 1. Collect exported symbols with the requested name.
//! 2. Drop candidates that fail the caller's constraint.
//! 3. If the requester has a dependency edge to the candidate's owner, that
//!    edge's own constraint must also hold, and the candidate's priority is
//!    raised by the direct-dependency boost.
//! 4. The highest effective priority wins; ties go to the highest version,
//!    then to the earliest registration.
//! 5. With no exported candidate, the global tier is searched the same way
//!    without edge handling.
//!
//! A successful resolution increments the chosen symbol's reference count
//! and stamps its last-used time.
//!
//! ## Concurrency
//!
//! The registry is not internally synchronized. Callers that share one
//! registry across threads must serialize access themselves.

use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolAddress, SymbolKind, SymbolTable};
use crate::version::{SemanticVersion, VersionConstraint};

/// Default priority boost for a candidate owned by a direct dependency.
pub const DEFAULT_DIRECT_DEPENDENCY_BOOST: i32 = 1000;

/// "Component `from` depends on component `to`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    /// Versions of `to` acceptable to `from`; `None` accepts any.
    pub constraint: Option<VersionConstraint>,
    pub optional: bool,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            constraint: None,
            optional: false,
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

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// Which tier a resolution came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Global,
    Imported,
    Exported,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Global => "global",
            Tier::Imported => "imported",
            Tier::Exported => "exported",
        };
        f.write_str(name)
    }
}

/// The symbol a request was bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: String,
    pub address: SymbolAddress,
    pub version: SemanticVersion,
    /// Providing component; empty for global symbols.
    pub owner: String,
    pub kind: SymbolKind,
    /// Priority after the direct-dependency boost.
    pub priority: i32,
    /// Tier the symbol record lives in (exported or global).
    pub tier: Tier,
}

impl Resolution {
    /// Fail with `SymbolTypeMismatch` unless the symbol has `expected` kind.
    pub fn expect_kind(&self, expected: SymbolKind) -> Result<&Self> {
        if self.kind == expected {
            Ok(self)
        } else {
            Err(Error::SymbolTypeMismatch {
                name: self.name.clone(),
                expected: expected.to_string(),
                found: self.kind.to_string(),
            })
        }
    }
}

/// A symbol name that more than one version of is exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub name: String,
    /// Every `(version, owner)` pair exporting the name, in registration order.
    pub providers: Vec<(SemanticVersion, String)>,
    /// What resolution would currently pick for the inspected component.
    pub selected: Option<(SemanticVersion, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ImportKey {
    context: String,
    name: String,
    constraint: Option<VersionConstraint>,
}

#[derive(Debug, Clone)]
struct ImportBinding {
    resolution: Resolution,
    uses: u32,
}

/// Owner of the global, exported and imported tiers plus dependency edges.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    global: SymbolTable,
    exported: SymbolTable,
    imported: HashMap<ImportKey, ImportBinding>,
    edges: Vec<DependencyEdge>,
    direct_dependency_boost: i32,
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::with_boost(DEFAULT_DIRECT_DEPENDENCY_BOOST)
    }

    /// Create a registry with a custom direct-dependency boost.
    pub fn with_boost(direct_dependency_boost: i32) -> Self {
        Self {
            global: SymbolTable::with_capacity(64),
            exported: SymbolTable::with_capacity(128),
            imported: HashMap::with_capacity(128),
            edges: Vec::new(),
            direct_dependency_boost,
        }
    }

    pub fn direct_dependency_boost(&self) -> i32 {
        self.direct_dependency_boost
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Publish a component's symbol into the exported tier.
    ///
    /// Fails with `AlreadyLoaded` if the same `(name, version, owner)` is
    /// already exported.
    pub fn export(&mut self, symbol: Symbol) -> Result<()> {
        if self
            .exported
            .contains_exact(&symbol.name, &symbol.version, &symbol.owner)
        {
            return Err(Error::AlreadyLoaded {
                what: format!(
                    "symbol '{}' {} from '{}'",
                    symbol.name, symbol.version, symbol.owner
                ),
            });
        }
        self.exported.add(symbol)
    }

    /// Add an unowned symbol to the global tier.
    pub fn add_global(&mut self, symbol: Symbol) -> Result<()> {
        self.global.add(symbol)
    }

    /// Record that `edge.from` depends on `edge.to`.
    ///
    /// Re-adding an existing `(from, to)` pair replaces its constraint and
    /// optional flag. A new or changed edge drops every binding held by
    /// `edge.from`, so its next lookups see the edge.
    pub fn add_dependency(&mut self, edge: DependencyEdge) -> Result<()> {
        match self
            .edges
            .iter()
            .position(|e| e.from == edge.from && e.to == edge.to)
        {
            Some(i) if self.edges[i] == edge => return Ok(()),
            Some(i) => self.edges[i] = edge.clone(),
            None => {
                self.edges.try_reserve(1)?;
                self.edges.push(edge.clone());
            }
        }

        let dropped = self.release_context(&edge.from);
        if dropped > 0 {
            debug!(
                "Dropped {} binding(s) of '{}' after edge to '{}' changed",
                dropped, edge.from, edge.to
            );
        }
        Ok(())
    }

    /// Edges leaving `component`, in insertion order.
    pub fn dependencies_of(&self, component: &str) -> Vec<&DependencyEdge> {
        self.edges.iter().filter(|e| e.from == component).collect()
    }

    pub fn is_direct_dependency(&self, component: &str, dependency: &str) -> bool {
        self.edge(component, dependency).is_some()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&DependencyEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn exported(&self) -> &SymbolTable {
        &self.exported
    }

    /// Direct access to the exported tier, e.g. for targeted removal.
    pub fn exported_mut(&mut self) -> &mut SymbolTable {
        &mut self.exported
    }

    pub fn global(&self) -> &SymbolTable {
        &self.global
    }

    pub fn global_mut(&mut self) -> &mut SymbolTable {
        &mut self.global
    }

    /// Number of memoized bindings across all contexts.
    pub fn imported_len(&self) -> usize {
        self.imported.len()
    }

    /// Memoized bindings held by `context`.
    pub fn imports_of(&self, context: &str) -> Vec<&Resolution> {
        let mut bindings: Vec<&Resolution> = self
            .imported
            .iter()
            .filter(|(key, _)| key.context == context)
            .map(|(_, binding)| &binding.resolution)
            .collect();
        bindings.sort_by(|a, b| a.name.cmp(&b.name));
        bindings
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve `name` for `context` and return its address.
    pub fn resolve(
        &mut self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        context: &str,
    ) -> Result<SymbolAddress> {
        self.resolve_detailed(name, constraint, context)
            .map(|r| r.address)
    }

    /// Resolve and additionally require the symbol to be of `expected` kind.
    ///
    /// A kind mismatch fails closed with `NotFound` and leaves reference
    /// counts untouched. The check also covers a stale binding being
    /// re-resolved to a different symbol.
    pub fn resolve_typed(
        &mut self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        expected: SymbolKind,
        context: &str,
    ) -> Result<SymbolAddress> {
        let key = import_key(name, constraint, context);
        let peek = match self.imported.get(&key) {
            Some(binding) => Some(binding.resolution.clone()),
            None => self.select(name, constraint, context),
        };
        if let Some(found) = peek {
            if found.kind != expected {
                warn!(
                    "Type mismatch resolving '{}' for '{}': expected {}, found {}",
                    name, context, expected, found.kind
                );
                return Err(not_found(name, constraint, context));
            }
        }

        let resolution = self.resolve_detailed(name, constraint, context)?;
        if resolution.kind != expected {
            warn!(
                "Type mismatch resolving '{}' for '{}': expected {}, found {}",
                name, context, expected, resolution.kind
            );
            self.undo_acquire(&key, &resolution);
            return Err(not_found(name, constraint, context));
        }
        Ok(resolution.address)
    }

    /// Resolve `name` for `context`, returning the full binding record.
    pub fn resolve_detailed(
        &mut self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        context: &str,
    ) -> Result<Resolution> {
        let now = Instant::now();
        let key = import_key(name, constraint, context);

        if let Some(binding) = self.imported.get(&key) {
            let resolution = binding.resolution.clone();
            if self.acquire(&resolution, now) {
                if let Some(binding) = self.imported.get_mut(&key) {
                    binding.uses = binding.uses.saturating_add(1);
                }
                return Ok(resolution);
            }
            // The bound symbol was removed behind our back; resolve afresh.
            self.imported.remove(&key);
        }

        let Some(resolution) = self.select(name, constraint, context) else {
            warn!(
                "Failed to resolve symbol '{}' with constraint '{}' for component '{}'",
                name,
                constraint.map_or_else(|| "any".to_string(), |c| c.to_string()),
                context
            );
            return Err(not_found(name, constraint, context));
        };

        self.imported.try_reserve(1)?;
        self.acquire(&resolution, now);
        debug!(
            "Resolved '{}' version '{}' from {} '{}' for '{}' (priority: {})",
            name, resolution.version, resolution.tier, resolution.owner, context, resolution.priority
        );
        self.imported.insert(
            key,
            ImportBinding {
                resolution: resolution.clone(),
                uses: 1,
            },
        );
        Ok(resolution)
    }

    /// Pick the best candidate without side effects.
    pub fn select(
        &self,
        name: &str,
        constraint: Option<&VersionConstraint>,
        context: &str,
    ) -> Option<Resolution> {
        self.best_in(Tier::Exported, name, constraint, context)
            .or_else(|| self.best_in(Tier::Global, name, constraint, context))
    }

    /// Stamp the symbol behind `resolution` as used now, without taking a
    /// reference. False if the symbol is gone.
    pub fn touch(&mut self, resolution: &Resolution) -> bool {
        match self.table_mut(resolution.tier).find_exact_mut(
            &resolution.name,
            &resolution.version,
            &resolution.owner,
        ) {
            Some(symbol) => {
                symbol.last_used = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    /// Drop `context`'s bindings for `name` and release their references.
    ///
    /// Returns the number of bindings dropped.
    pub fn release(&mut self, name: &str, context: &str) -> usize {
        self.release_where(|key| key.context == context && key.name == name)
    }

    /// Drop every binding held by `context`.
    pub fn release_context(&mut self, context: &str) -> usize {
        self.release_where(|key| key.context == context)
    }

    /// Remove every exported symbol owned by one of `owners`.
    ///
    /// Bindings to purged symbols are dropped too. Returns the number of
    /// symbols removed.
    pub fn purge_owners(&mut self, owners: &[String]) -> usize {
        if owners.is_empty() {
            return 0;
        }
        self.imported.retain(|_, binding| {
            binding.resolution.tier != Tier::Exported
                || !owners.contains(&binding.resolution.owner)
        });
        self.exported.retain(|symbol| !owners.contains(&symbol.owner))
    }

    /// Report every exported name with two or more distinct versions.
    ///
    /// Diagnostic only; resolution is never blocked by a conflict.
    pub fn detect_conflicts(&self, component: &str) -> Vec<ConflictReport> {
        let mut names = self.exported.names();
        names.sort_unstable();

        let mut reports = Vec::new();
        for name in names {
            let providers: Vec<(SemanticVersion, String)> = self
                .exported
                .find_all(name)
                .into_iter()
                .map(|s| (s.version.clone(), s.owner.clone()))
                .collect();

            let mut distinct: Vec<&SemanticVersion> = Vec::new();
            for (version, _) in &providers {
                if !distinct.iter().any(|v| v.compare(version).is_eq()) {
                    distinct.push(version);
                }
            }
            if distinct.len() < 2 {
                continue;
            }

            let selected = self
                .select(name, None, component)
                .map(|r| (r.version, r.owner));
            warn!(
                "Version conflict for '{}': {} versions exported",
                name,
                distinct.len()
            );
            reports.push(ConflictReport {
                name: name.to_string(),
                providers,
                selected,
            });
        }
        reports
    }

    fn table(&self, tier: Tier) -> &SymbolTable {
        match tier {
            Tier::Global => &self.global,
            _ => &self.exported,
        }
    }

    fn table_mut(&mut self, tier: Tier) -> &mut SymbolTable {
        match tier {
            Tier::Global => &mut self.global,
            _ => &mut self.exported,
        }
    }

    fn best_in(
        &self,
        tier: Tier,
        name: &str,
        constraint: Option<&VersionConstraint>,
        context: &str,
    ) -> Option<Resolution> {
        let table = self.table(tier);
        let mut best: Option<(&Symbol, i32)> = None;

        for &index in table.indices_of(name) {
            let Some(symbol) = table.get(index) else {
                continue;
            };
            if let Some(c) = constraint {
                if !c.matches(&symbol.version) {
                    continue;
                }
            }

            let mut effective = symbol.priority;
            if tier == Tier::Exported {
                if let Some(edge) = self.edge(context, &symbol.owner) {
                    if let Some(specific) = &edge.constraint {
                        if !specific.matches(&symbol.version) {
                            continue;
                        }
                    }
                    effective = effective.saturating_add(self.direct_dependency_boost);
                }
            }

            let better = match best {
                None => true,
                Some((current, current_priority)) => {
                    effective > current_priority
                        || (effective == current_priority
                            && symbol.version.compare(&current.version).is_gt())
                }
            };
            if better {
                best = Some((symbol, effective));
            }
        }

        best.map(|(symbol, priority)| Resolution {
            name: symbol.name.clone(),
            address: symbol.address,
            version: symbol.version.clone(),
            owner: symbol.owner.clone(),
            kind: symbol.kind,
            priority,
            tier,
        })
    }

    /// Bump the record behind `resolution`. False if it no longer exists.
    fn acquire(&mut self, resolution: &Resolution, now: Instant) -> bool {
        match self.table_mut(resolution.tier).find_exact_mut(
            &resolution.name,
            &resolution.version,
            &resolution.owner,
        ) {
            Some(symbol) => {
                symbol.acquire(now);
                true
            }
            None => false,
        }
    }

    /// Take back the single reference the last resolution under `key`
    /// handed out.
    fn undo_acquire(&mut self, key: &ImportKey, resolution: &Resolution) {
        let drop_binding = match self.imported.get_mut(key) {
            Some(binding) => {
                binding.uses = binding.uses.saturating_sub(1);
                binding.uses == 0
            }
            None => false,
        };
        if drop_binding {
            self.imported.remove(key);
        }
        if let Some(symbol) = self.table_mut(resolution.tier).find_exact_mut(
            &resolution.name,
            &resolution.version,
            &resolution.owner,
        ) {
            symbol.release(1);
        }
    }

    fn release_where<F>(&mut self, mut matches: F) -> usize
    where
        F: FnMut(&ImportKey) -> bool,
    {
        let keys: Vec<ImportKey> = self
            .imported
            .keys()
            .filter(|key| matches(key))
            .cloned()
            .collect();

        for key in &keys {
            if let Some(binding) = self.imported.remove(key) {
                let r = &binding.resolution;
                if let Some(symbol) =
                    self.table_mut(r.tier)
                        .find_exact_mut(&r.name, &r.version, &r.owner)
                {
                    symbol.release(binding.uses);
                }
            }
        }
        keys.len()
    }
}

fn import_key(name: &str, constraint: Option<&VersionConstraint>, context: &str) -> ImportKey {
    ImportKey {
        context: context.to_string(),
        name: name.to_string(),
        constraint: constraint.filter(|c| !c.is_any()).cloned(),
    }
}

fn not_found(name: &str, constraint: Option<&VersionConstraint>, context: &str) -> Error {
    Error::NotFound {
        name: name.to_string(),
        constraint: constraint.map_or_else(|| "any".to_string(), |c| c.to_string()),
        context: context.to_string(),
    }
}
