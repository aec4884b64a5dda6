//! # OS Dynamic Loader Seam
//!
//! Abstracts the three primitives the lifecycle needs from the platform:
//! open a shared library, look up a symbol in it, close it.
//!
//! `DynamicLoader` and `LoadedLibrary` are the mocking seam: the lifecycle
//! only talks to these traits, so tests can substitute an in-memory loader
//! and count opens and closes. `NativeLoader` is the production
//! implementation backed by `libloading`.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;
use log::debug;

use crate::error::{Error, Result};
use crate::symbols::SymbolAddress;

/// An open shared library.
pub trait LoadedLibrary: Send {
    /// Address of the exported symbol `name`, or `None` if absent.
    fn lookup(&self, name: &str) -> Option<SymbolAddress>;

    /// Unmap the library. Addresses obtained from it become dangling.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Opens shared libraries.
pub trait DynamicLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>>;
}

/// `DynamicLoader` backed by the platform loader (`dlopen`/`LoadLibrary`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

struct NativeLibrary {
    path: PathBuf,
    library: Library,
}

impl DynamicLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
        // SAFETY: loading a library runs its initialisers. Components are
        // trusted code chosen by the caller; that is the contract of this
        // loader.
        let library = unsafe { Library::new(path) }.map_err(|e| Error::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Opened shared library {}", path.display());
        Ok(Box::new(NativeLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

impl LoadedLibrary for NativeLibrary {
    fn lookup(&self, name: &str) -> Option<SymbolAddress> {
        // SAFETY: the symbol is read as an opaque pointer and never called
        // here. Callers that bind it to a concrete type own that contract.
        let symbol = unsafe { self.library.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let raw: *const c_void = *symbol;
        Some(SymbolAddress::from_ptr(raw))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let path = self.path;
        self.library.close().map_err(|e| Error::LoadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!("Closed shared library {}", path.display());
        Ok(())
    }
}

/// In-memory loader for tests that need to observe opens and closes.
#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use super::{DynamicLoader, LoadedLibrary};
    use crate::error::{Error, Result};
    use crate::symbols::SymbolAddress;

    #[derive(Debug, Default)]
    pub struct MockState {
        pub opened: Vec<PathBuf>,
        pub closed: Vec<PathBuf>,
        pub failing: HashSet<PathBuf>,
    }

    /// Every library "exports" any name not starting with `missing`; the
    /// address is derived from the path and name so distinct libraries
    /// hand out distinct addresses.
    #[derive(Debug, Clone, Default)]
    pub struct MockLoader {
        pub state: Arc<Mutex<MockState>>,
    }

    impl MockLoader {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_on(&self, path: impl Into<PathBuf>) {
            self.state.lock().unwrap().failing.insert(path.into());
        }

        pub fn opened(&self) -> usize {
            self.state.lock().unwrap().opened.len()
        }

        pub fn closed(&self) -> usize {
            self.state.lock().unwrap().closed.len()
        }
    }

    pub fn address_of(path: &Path, name: &str) -> SymbolAddress {
        let seed = path
            .as_os_str()
            .to_string_lossy()
            .bytes()
            .chain(name.bytes())
            .fold(0x1000usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        SymbolAddress::new(seed | 1)
    }

    struct MockLibrary {
        path: PathBuf,
        state: Arc<Mutex<MockState>>,
    }

    impl DynamicLoader for MockLoader {
        fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>> {
            let mut state = self.state.lock().unwrap();
            if state.failing.contains(path) {
                return Err(Error::LoadFailed {
                    path: path.display().to_string(),
                    message: "mock refused to open".to_string(),
                });
            }
            state.opened.push(path.to_path_buf());
            Ok(Box::new(MockLibrary {
                path: path.to_path_buf(),
                state: Arc::clone(&self.state),
            }))
        }
    }

    impl LoadedLibrary for MockLibrary {
        fn lookup(&self, name: &str) -> Option<SymbolAddress> {
            if name.starts_with("missing") {
                None
            } else {
                Some(address_of(&self.path, name))
            }
        }

        fn close(self: Box<Self>) -> Result<()> {
            self.state.lock().unwrap().closed.push(self.path.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_loader_counts() {
        let loader = mock::MockLoader::new();
        let lib = loader.open(Path::new("/libs/a.so")).unwrap();
        assert_eq!(
            lib.lookup("calc"),
            Some(mock::address_of(Path::new("/libs/a.so"), "calc"))
        );
        assert!(lib.lookup("missing_fn").is_none());
        lib.close().unwrap();
        assert_eq!(loader.opened(), 1);
        assert_eq!(loader.closed(), 1);

        loader.fail_on("/libs/bad.so");
        assert!(loader.open(Path::new("/libs/bad.so")).is_err());
    }

    #[test]
    fn test_open_missing_library_fails() {
        let loader = NativeLoader::new();
        let result = loader.open(Path::new("/nonexistent/libcomplink_missing.so"));
        match result {
            Err(Error::LoadFailed { path, .. }) => {
                assert!(path.contains("libcomplink_missing"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opening a missing library must fail"),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_open_and_lookup_libc() {
        let loader = NativeLoader::new();
        let library = loader.open(Path::new("libc.so.6")).unwrap();
        let strlen = library.lookup("strlen").expect("libc exports strlen");
        assert_ne!(strlen.get(), 0);
        assert!(library.lookup("complink_no_such_symbol").is_none());
        library.close().unwrap();
    }
}
