//! # Error Handling
//!
//! This module defines the centralized error type for `complink`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! the linkage runtime can report across its public boundary.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failure modes. Variants carry the context a
//!   caller needs to act on the failure (symbol name, component id, library
//!   path, the edge that closes a cycle).
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! `NotFound` is a normal outcome of resolution rather than an exceptional
//! one; callers decide whether it is fatal. `DependencyCycle` always names an
//! edge that lies on the cycle. `OutOfMemory` is only produced before any
//! structure has been modified, so a failed call leaves the registry in its
//! pre-call state.

use thiserror::Error;

/// Main error type for complink operations
#[derive(Error, Debug)]
pub enum Error {
    /// No symbol satisfied the request.
    #[error("Symbol not found: '{name}' (constraint: {constraint}, context: {context})")]
    NotFound {
        name: String,
        constraint: String,
        context: String,
    },

    /// Boundary code for callers that treat an unsatisfiable version
    /// requirement as a conflict. Resolution itself reports `NotFound`.
    #[error("Version conflict for '{name}': {message}")]
    VersionConflict { name: String, message: String },

    /// The dependency graph contains a cycle; `from -> to` is an edge on it.
    #[error("Dependency cycle detected: {from} -> {to}")]
    DependencyCycle { from: String, to: String },

    /// A symbol resolved but its declared kind is not the one requested.
    #[error("Symbol type mismatch for '{name}': expected {expected}, found {found}")]
    SymbolTypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Allocation failed before any state was modified.
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] std::collections::TryReserveError),

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entity is already registered.
    #[error("Already loaded: {what}")]
    AlreadyLoaded { what: String },

    /// A version, constraint or other input string was malformed.
    #[error("Invalid input '{input}': {message}")]
    InvalidInput { input: String, message: String },

    /// The OS dynamic loader refused to open a library.
    #[error("Failed to load library {path}: {message}")]
    LoadFailed { path: String, message: String },

    /// A component's init hook reported failure.
    #[error("Initialization failed for component '{component}': {message}")]
    InitFailed { component: String, message: String },

    /// A required dependency is not part of the component set.
    #[error("Component '{component}' requires missing dependency '{dependency}'")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// A component manifest could not be parsed.
    #[error("Manifest error in {path}: {message}")]
    Manifest { path: String, message: String },

    /// A runtime configuration error, wrapped from `serde_yaml::Error`.
    #[error("Configuration parsing error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for building an `InvalidInput` error.
    pub fn invalid_input(input: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            input: input.into(),
            message: message.into(),
        }
    }

    /// True for the non-exceptional "nothing matched" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
