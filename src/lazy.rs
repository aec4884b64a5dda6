//! # Lazy Symbol Binding
//!
//! `LazySymbol<T>` defers loading a component until one of its symbols is
//! first needed. The first `get` loads the library through the runtime's
//! shared handle cache, resolves the symbol, and converts the address into
//! a `T` with a caller-supplied binder. Later calls return the cached value.
//!
//! Resolution goes through the registry first, so versioning and
//! dependency context apply. If the registry has no candidate, the symbol
//! is looked up directly in the component's library.
//!
//! ```no_run
//! use complink::config::RuntimeConfig;
//! use complink::lazy::LazySymbol;
//! use complink::runtime::Runtime;
//! use std::os::raw::c_char;
//!
//! type Strlen = unsafe extern "C" fn(*const c_char) -> usize;
//!
//! let mut runtime = Runtime::native(RuntimeConfig::default());
//! let mut strlen: LazySymbol<Strlen> =
//!     LazySymbol::new("libc.so.6", "libc", "strlen", "app", |addr| {
//!         // SAFETY: libc's strlen has this signature.
//!         unsafe { std::mem::transmute::<*const (), Strlen>(addr.as_ptr()) }
//!     });
//! let f = strlen.get(&mut runtime).unwrap();
//! assert_eq!(unsafe { f(c"hello".as_ptr()) }, 5);
//! ```

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;
use crate::lifecycle::Component;
use crate::registry::Resolution;
use crate::runtime::Runtime;
use crate::symbols::SymbolAddress;
use crate::version::VersionConstraint;

struct Bound<T> {
    value: T,
    component: Component,
    /// Set when the address came from the registry.
    resolution: Option<Resolution>,
}

/// A symbol bound on first use.
pub struct LazySymbol<T> {
    library: PathBuf,
    component_id: String,
    name: String,
    constraint: Option<VersionConstraint>,
    context: String,
    binder: fn(SymbolAddress) -> T,
    bound: Option<Bound<T>>,
}

impl<T: Copy> LazySymbol<T> {
    /// `context` is the requesting component used for resolution.
    pub fn new(
        library: impl Into<PathBuf>,
        component_id: impl Into<String>,
        name: impl Into<String>,
        context: impl Into<String>,
        binder: fn(SymbolAddress) -> T,
    ) -> Self {
        Self {
            library: library.into(),
            component_id: component_id.into(),
            name: name.into(),
            constraint: None,
            context: context.into(),
            binder,
            bound: None,
        }
    }

    pub fn with_constraint(mut self, constraint: VersionConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// The bound value, loading and resolving on first use.
    pub fn get(&mut self, runtime: &mut Runtime) -> Result<T> {
        if let Some(bound) = &self.bound {
            if let Some(resolution) = &bound.resolution {
                runtime.registry_mut().touch(resolution);
            }
            return Ok(bound.value);
        }

        let path = runtime.config().locate_library(&self.library);
        let (registry, loader) = runtime.parts_mut();
        let component = loader.load(&path, &self.component_id)?;

        let resolved = match registry.resolve_detailed(&self.name, self.constraint.as_ref(), &self.context) {
            Ok(resolution) => Ok((resolution.address, Some(resolution))),
            Err(e) if e.is_not_found() => match loader.lookup(&component, &self.name) {
                Ok(Some(address)) => Ok((address, None)),
                Ok(None) => Err(e),
                Err(lookup_err) => Err(lookup_err),
            },
            Err(e) => Err(e),
        };

        let (address, resolution) = match resolved {
            Ok(found) => found,
            Err(e) => {
                loader.unload(component)?;
                return Err(e);
            }
        };

        debug!(
            "Bound '{}' for '{}' at {} ({})",
            self.name,
            self.context,
            address,
            if resolution.is_some() {
                "registry"
            } else {
                "direct lookup"
            }
        );
        let value = (self.binder)(address);
        self.bound = Some(Bound {
            value,
            component,
            resolution,
        });
        Ok(value)
    }

    /// Drop the cached binding, its registry reference and its component
    /// reference. The next `get` binds afresh.
    ///
    /// The registry binding is released by `(context, name)`, so other
    /// bindings of the same name held by the same context are released too.
    pub fn reset(&mut self, runtime: &mut Runtime) -> Result<()> {
        let Some(bound) = self.bound.take() else {
            return Ok(());
        };
        let (registry, loader) = runtime.parts_mut();
        if bound.resolution.is_some() {
            registry.release(&self.name, &self.context);
        }
        loader.unload(bound.component)
    }
}
