//! # Component Manifests
//!
//! A manifest is a JSON document describing one component: its id and
//! version, the library backing it, its dependencies, and the symbols it
//! exports and imports.
//!
//! ```json
//! {
//!   "id": "LibMath",
//!   "version": "1.2.0",
//!   "library": "libmath.so",
//!   "dependencies": [
//!     { "id": "LibCore", "version_req": "^1.0.0" },
//!     { "id": "LibTrace", "optional": true }
//!   ],
//!   "exported_symbols": [
//!     "add",
//!     { "name": "pi", "version": "1.2.0", "type": "constant" }
//!   ]
//! }
//! ```
//!
//! - `version` defaults to `1.0.0`.
//! - A dependency's requirement may be spelled `version_req` or `version`.
//! - A symbol is either a bare name (version `1.0.0`, a function) or an
//!   object whose `type` is a kind name or its numeric code.
//!
//! Versions and requirements are validated when a manifest is turned into a
//! `ComponentDeclaration`, so a malformed string is reported with the
//! component it came from.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{ComponentDeclaration, DependencySpec, SymbolDeclaration};
use crate::symbols::SymbolKind;
use crate::version::{SemanticVersion, VersionConstraint};

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Deserialized manifest, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentManifest {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
    #[serde(default)]
    pub exported_symbols: Vec<SymbolEntry>,
    #[serde(default)]
    pub imported_symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub id: String,
    #[serde(default, alias = "version", skip_serializing_if = "Option::is_none")]
    pub version_req: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

/// A symbol as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SymbolEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default = "default_version")]
        version: String,
        #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
        kind: Option<KindEntry>,
    },
}

/// A symbol kind given by name or numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KindEntry {
    Code(u64),
    Name(String),
}

impl KindEntry {
    fn to_kind(&self, component: &str) -> Result<SymbolKind> {
        match self {
            KindEntry::Code(code) => SymbolKind::from_code(*code).ok_or_else(|| {
                Error::invalid_input(code.to_string(), format!("unknown symbol type in '{}'", component))
            }),
            KindEntry::Name(name) => name.parse().map_err(|_| {
                Error::invalid_input(name.as_str(), format!("unknown symbol type in '{}'", component))
            }),
        }
    }
}

impl SymbolEntry {
    pub fn name(&self) -> &str {
        match self {
            SymbolEntry::Name(name) => name,
            SymbolEntry::Detailed { name, .. } => name,
        }
    }

    fn to_declaration(&self, component: &str) -> Result<SymbolDeclaration> {
        match self {
            SymbolEntry::Name(name) => Ok(SymbolDeclaration::new(
                name.as_str(),
                SemanticVersion::new(1, 0, 0),
                SymbolKind::Function,
            )),
            SymbolEntry::Detailed {
                name,
                version,
                kind,
            } => {
                let version = parse_version(version, component)?;
                let kind = match kind {
                    Some(k) => k.to_kind(component)?,
                    None => SymbolKind::Function,
                };
                Ok(SymbolDeclaration::new(name.as_str(), version, kind))
            }
        }
    }
}

impl ComponentManifest {
    /// Validate and convert into a graph declaration.
    pub fn to_declaration(&self) -> Result<ComponentDeclaration> {
        let version = parse_version(&self.version, &self.id)?;
        let mut declaration = ComponentDeclaration::new(self.id.as_str(), version);
        declaration.library = self.library.clone();

        for dep in &self.dependencies {
            let mut spec = if dep.optional {
                DependencySpec::optional(dep.id.as_str())
            } else {
                DependencySpec::required(dep.id.as_str())
            };
            if let Some(req) = &dep.version_req {
                let constraint = VersionConstraint::parse(req).map_err(|_| {
                    Error::invalid_input(
                        req.as_str(),
                        format!("bad version requirement for '{}' in '{}'", dep.id, self.id),
                    )
                })?;
                spec = spec.with_constraint(constraint);
            }
            declaration.dependencies.push(spec);
        }

        for symbol in &self.exported_symbols {
            declaration.exports.push(symbol.to_declaration(&self.id)?);
        }
        for symbol in &self.imported_symbols {
            declaration.imports.push(symbol.to_declaration(&self.id)?);
        }
        Ok(declaration)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Manifest {
            path: self.id.clone(),
            message: e.to_string(),
        })
    }
}

fn parse_version(version: &str, component: &str) -> Result<SemanticVersion> {
    SemanticVersion::parse(version)
        .map_err(|_| Error::invalid_input(version, format!("bad version in '{}'", component)))
}

/// Parse manifest JSON. `origin` names the source in error messages.
pub fn parse(json: &str, origin: &str) -> Result<ComponentManifest> {
    serde_json::from_str(json).map_err(|e| Error::Manifest {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ComponentManifest> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    parse(&content, &path.display().to_string())
}

/// Load every `*.json` manifest in `dir`, ordered by path.
pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<ComponentManifest>> {
    let dir = dir.as_ref();
    let pattern = format!(
        "{}/*.json",
        glob::Pattern::escape(&dir.display().to_string())
    );

    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        paths.push(entry.map_err(|e| Error::Io(e.into()))?);
    }
    paths.sort();

    let mut manifests = Vec::new();
    manifests.try_reserve(paths.len())?;
    for path in &paths {
        manifests.push(from_file(path)?);
    }
    log::debug!(
        "Discovered {} manifest(s) in {}",
        manifests.len(),
        dir.display()
    );
    Ok(manifests)
}

/// Convert manifests to declarations, failing on the first invalid one.
pub fn declarations(manifests: &[ComponentManifest]) -> Result<Vec<ComponentDeclaration>> {
    manifests.iter().map(ComponentManifest::to_declaration).collect()
}
