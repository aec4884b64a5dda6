//! # complink
//!
//! A runtime for linking independently compiled, independently versioned
//! shared-library components. It loads components on demand and resolves
//! named symbols across them, including the "diamond" case where two
//! dependencies of one consumer need incompatible versions of a common
//! component.
//!
//! ## Quick Example
//!
//! ```
//! use complink::registry::{DependencyEdge, SymbolRegistry};
//! use complink::symbols::{Symbol, SymbolAddress, SymbolKind};
//! use complink::version::{SemanticVersion, VersionConstraint};
//!
//! let mut registry = SymbolRegistry::new();
//! for (version, owner, addr, priority) in [("1.0.0", "A", 0xA0, 10), ("2.0.0", "B", 0xB0, 20)] {
//!     registry
//!         .export(Symbol::new(
//!             "calc",
//!             SemanticVersion::parse(version).unwrap(),
//!             SymbolAddress::new(addr),
//!             SymbolKind::Function,
//!             owner,
//!             priority,
//!         ))
//!         .unwrap();
//! }
//! let caret_one = VersionConstraint::parse("^1.0.0").unwrap();
//! registry
//!     .add_dependency(DependencyEdge::new("AppX", "A").with_constraint(caret_one))
//!     .unwrap();
//!
//! // AppX depends on A, so it gets A's calc despite B's higher priority.
//! assert_eq!(registry.resolve("calc", None, "AppX").unwrap(), SymbolAddress::new(0xA0));
//! assert_eq!(registry.resolve("calc", None, "Other").unwrap(), SymbolAddress::new(0xB0));
//! ```
//!
//! ## Core Concepts
//!
//! - **Versions (`version`)**: SemVer parsing, precedence and constraint
//!   satisfaction (`^`, `~`, comparisons, wildcards).
//! - **Symbols (`symbols`, `registry`)**: symbol records in global,
//!   exported and imported tiers; context-aware resolution that prefers a
//!   requester's direct dependencies.
//! - **Dependency Graph (`graph`)**: cycle detection, topological load order
//!   and missing-dependency checks over component declarations.
//! - **Lifecycle (`loader`, `lifecycle`, `lazy`)**: reference-counted
//!   loading of shared libraries, lifecycle hooks, an explicit idle sweep
//!   and lazily bound symbols.
//! - **Runtime (`runtime`, `manifest`, `config`)**: linking a set of
//!   declared components end to end, reading declarations from JSON
//!   manifests and tunables from YAML.
//!
//! ## Concurrency
//!
//! Only the handle arena inside `ComponentLoader` is locked. A
//! `SymbolRegistry` is a plain value; callers sharing one between threads
//! must serialize access.

pub mod config;
pub mod error;
pub mod graph;
pub mod lazy;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod runtime;
pub mod symbols;
pub mod version;

#[cfg(test)]
mod version_proptest;
