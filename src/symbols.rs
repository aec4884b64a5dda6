//! # Versioned Symbol Tables
//!
//! A `SymbolTable` is a growable collection of `Symbol` records. Several
//! records may share a name; they differ by version or owner, and that
//! plurality is what lets two consumers bind to different versions of the
//! same symbol.
//!
//! Tables keep a name index so `find_all` only visits matching records. The
//! index is rebuilt whenever records are removed, because removal compacts
//! the backing vector in place.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::version::SemanticVersion;

/// Opaque address of a symbol inside a loaded component.
///
/// The registry never dereferences it; it is only handed back to callers.
/// The memory it points into is owned by the library mapping, not by the
/// symbol record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *const T {
        self.0 as *const T
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Declared kind of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolKind {
    #[default]
    Function,
    Variable,
    Type,
    Constant,
}

impl SymbolKind {
    /// Map the numeric codes used in component metadata.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SymbolKind::Function),
            1 => Some(SymbolKind::Variable),
            2 => Some(SymbolKind::Type),
            3 => Some(SymbolKind::Constant),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
            SymbolKind::Constant => "constant",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "function" | "fn" => Ok(SymbolKind::Function),
            "variable" | "var" => Ok(SymbolKind::Variable),
            "type" => Ok(SymbolKind::Type),
            "constant" | "const" => Ok(SymbolKind::Constant),
            _ => Err(Error::invalid_input(s, "unknown symbol type")),
        }
    }
}

/// A named, typed, versioned entity published by a component.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub version: SemanticVersion,
    pub address: SymbolAddress,
    pub kind: SymbolKind,
    /// Providing component; empty for global symbols.
    pub owner: String,
    /// Resolution priority, higher wins.
    pub priority: i32,
    /// Live references handed out by resolution.
    pub ref_count: u32,
    /// Time of the last successful resolution, if any.
    pub last_used: Option<Instant>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        version: SemanticVersion,
        address: SymbolAddress,
        kind: SymbolKind,
        owner: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            address,
            kind,
            owner: owner.into(),
            priority,
            ref_count: 0,
            last_used: None,
        }
    }

    /// An unowned symbol for the global tier.
    pub fn global(
        name: impl Into<String>,
        version: SemanticVersion,
        address: SymbolAddress,
        kind: SymbolKind,
        priority: i32,
    ) -> Self {
        Self::new(name, version, address, kind, String::new(), priority)
    }

    pub fn is_global(&self) -> bool {
        self.owner.is_empty()
    }

    /// True when `other` has the same `(name, version, owner)` identity.
    pub fn same_identity(&self, name: &str, version: &SemanticVersion, owner: &str) -> bool {
        self.name == name && self.version == *version && self.owner == owner
    }

    /// Record a successful resolution.
    pub(crate) fn acquire(&mut self, now: Instant) {
        self.ref_count = self.ref_count.saturating_add(1);
        self.last_used = Some(now);
    }

    /// Drop `count` references, never going below zero.
    pub(crate) fn release(&mut self, count: u32) {
        self.ref_count = self.ref_count.saturating_sub(count);
    }
}

/// Growable table of symbol records with a name index.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, Vec<usize>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(capacity),
            by_name: HashMap::with_capacity(capacity),
        }
    }

    /// Append a symbol. Duplicate names are expected.
    ///
    /// Capacity is reserved up front, so an allocation failure returns
    /// `OutOfMemory` with the table untouched.
    pub fn add(&mut self, symbol: Symbol) -> Result<()> {
        self.symbols.try_reserve(1)?;
        let index = self.symbols.len();
        match self.by_name.get_mut(&symbol.name) {
            Some(slots) => {
                slots.try_reserve(1)?;
                slots.push(index);
            }
            None => {
                self.by_name.try_reserve(1)?;
                let mut slots = Vec::new();
                slots.try_reserve(1)?;
                slots.push(index);
                self.by_name.insert(symbol.name.clone(), slots);
            }
        }
        self.symbols.push(symbol);
        Ok(())
    }

    /// Every record with `name`, in insertion order.
    pub fn find_all(&self, name: &str) -> Vec<&Symbol> {
        self.indices_of(name).iter().map(|&i| &self.symbols[i]).collect()
    }

    /// Mutable access to the record with the given identity.
    pub fn find_exact_mut(
        &mut self,
        name: &str,
        version: &SemanticVersion,
        owner: &str,
    ) -> Option<&mut Symbol> {
        let index = self
            .indices_of(name)
            .iter()
            .copied()
            .find(|&i| self.symbols[i].same_identity(name, version, owner))?;
        self.symbols.get_mut(index)
    }

    pub fn contains_exact(&self, name: &str, version: &SemanticVersion, owner: &str) -> bool {
        self.indices_of(name)
            .iter()
            .any(|&i| self.symbols[i].same_identity(name, version, owner))
    }

    /// Remove the first record named `name`.
    ///
    /// Ambiguous when several versions are present; prefer
    /// [`SymbolTable::remove_exact`] when the caller knows the identity.
    pub fn remove(&mut self, name: &str) -> Option<Symbol> {
        let index = *self.indices_of(name).first()?;
        Some(self.remove_at(index))
    }

    /// Remove the record with the given `(name, version, owner)` identity.
    pub fn remove_exact(
        &mut self,
        name: &str,
        version: &SemanticVersion,
        owner: &str,
    ) -> Option<Symbol> {
        let index = self
            .indices_of(name)
            .iter()
            .copied()
            .find(|&i| self.symbols[i].same_identity(name, version, owner))?;
        Some(self.remove_at(index))
    }

    /// Keep only records for which `keep` returns true, compacting in place.
    ///
    /// Returns the number of records removed.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&Symbol) -> bool,
    {
        let before = self.symbols.len();
        self.symbols.retain(keep);
        let removed = before - self.symbols.len();
        if removed > 0 {
            self.rebuild_index();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.symbols.iter_mut()
    }

    /// Distinct symbol names, in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for symbol in &self.symbols {
            if !seen.contains(&symbol.name.as_str()) {
                seen.push(symbol.name.as_str());
            }
        }
        seen
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub(crate) fn indices_of(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(index)
    }

    fn remove_at(&mut self, index: usize) -> Symbol {
        let symbol = self.symbols.remove(index);
        self.rebuild_index();
        symbol
    }

    fn rebuild_index(&mut self) {
        self.by_name.clear();
        for (index, symbol) in self.symbols.iter().enumerate() {
            self.by_name.entry(symbol.name.clone()).or_default().push(index);
        }
    }
}
