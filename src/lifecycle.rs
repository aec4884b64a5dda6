//! # Component Load Lifecycle
//!
//! Loads components from shared libraries, shares one OS mapping between
//! every component loaded from the same path, and closes mappings only when
//! an explicit sweep finds them idle.
//!
//! ## Handle Arena
//!
//! The `ComponentLoader` owns every open library in an arena keyed by
//! `HandleId`, a stable integer that is never reused. A `Component` holds
//! only its handle id, so it cannot keep a closed library alive or dangle:
//! operations on a component whose handle has been swept are no-ops or
//! report the handle as gone.
//!
//! The arena sits behind a `Mutex`, so `unused_sweep` may run on one thread
//! while others load and unload.
//!
//! ## Reference Counting
//!
//! - `load` of a path that already has a handle increments the handle's
//!   reference count instead of opening the library again.
//! - `unload` decrements it. Reaching zero runs the `terminate` hook but
//!   leaves the library mapped.
//! - `unused_sweep` closes a handle when nothing references it, none of its
//!   exported symbols is referenced, and it has been idle for longer than
//!   the threshold. Its symbols are purged from the registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::loader::{DynamicLoader, LoadedLibrary, NativeLoader};
use crate::registry::SymbolRegistry;
use crate::symbols::SymbolAddress;

/// Per-component callbacks run at lifecycle transitions.
///
/// Every method has a no-op default, so a component implements only what
/// it needs.
pub trait ComponentHooks: Send {
    /// Runs after the library is mapped and before the component is handed
    /// out. An error aborts the load.
    fn init(&mut self, _component: &str) -> Result<()> {
        Ok(())
    }

    /// Component-specific work on demand.
    fn process(&mut self, _component: &str, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    /// Runs when the last reference to the handle is dropped.
    fn terminate(&mut self, _component: &str) {}

    /// Runs when `init` fails.
    fn abort(&mut self, _component: &str) {}
}

/// Stable identifier of an arena entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A loaded component. Give it back with [`ComponentLoader::unload`].
#[derive(Debug)]
pub struct Component {
    id: String,
    handle: HandleId,
    path: PathBuf,
}

impl Component {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Snapshot of the arena for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderStats {
    /// Open OS handles, referenced or not.
    pub handles: usize,
    /// Sum of handle reference counts.
    pub live_components: u32,
}

/// What one sweep did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub closed: Vec<PathBuf>,
    pub purged_symbols: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty()
    }
}

struct HandleEntry {
    path: PathBuf,
    library: Box<dyn LoadedLibrary>,
    ref_count: u32,
    /// Component ids that have been loaded against this handle.
    owners: Vec<String>,
    hooks: Option<Box<dyn ComponentHooks>>,
    last_activity: Instant,
}

#[derive(Default)]
struct HandleArena {
    next_id: u64,
    handles: BTreeMap<HandleId, HandleEntry>,
    by_path: HashMap<PathBuf, HandleId>,
}

/// Owner of every open component library.
pub struct ComponentLoader {
    loader: Box<dyn DynamicLoader>,
    arena: Mutex<HandleArena>,
}

impl fmt::Debug for ComponentLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLoader").finish_non_exhaustive()
    }
}

impl Default for ComponentLoader {
    fn default() -> Self {
        Self::native()
    }
}

impl ComponentLoader {
    pub fn new(loader: impl DynamicLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            arena: Mutex::new(HandleArena::default()),
        }
    }

    /// Loader backed by the platform's dynamic loader.
    pub fn native() -> Self {
        Self::new(NativeLoader::new())
    }

    fn arena(&self) -> Result<MutexGuard<'_, HandleArena>> {
        self.arena.lock().map_err(|_| Error::LockPoisoned {
            context: "component handle arena".to_string(),
        })
    }

    /// Load `path` as component `id` without hooks.
    pub fn load(&self, path: impl AsRef<Path>, id: &str) -> Result<Component> {
        self.load_with_hooks(path, id, None)
    }

    /// Load `path` as component `id`, running `hooks.init`.
    ///
    /// A path with an existing handle reuses it. Hooks passed while the
    /// handle is still referenced are ignored; passed to a handle whose
    /// count dropped to zero they replace the stored ones and `init` runs
    /// again.
    pub fn load_with_hooks(
        &self,
        path: impl AsRef<Path>,
        id: &str,
        hooks: Option<Box<dyn ComponentHooks>>,
    ) -> Result<Component> {
        let path = path.as_ref();
        let now = Instant::now();
        let mut arena = self.arena()?;

        if let Some(&handle) = arena.by_path.get(path) {
            if let Some(entry) = arena.handles.get_mut(&handle) {
                if entry.ref_count == 0 {
                    if hooks.is_some() {
                        entry.hooks = hooks;
                    }
                    if let Some(hooks) = entry.hooks.as_mut() {
                        run_init(&mut **hooks, id)?;
                    }
                } else if hooks.is_some() {
                    debug!(
                        "Ignoring hooks for '{}': handle {} is already live",
                        id, handle
                    );
                }
                if !entry.owners.iter().any(|o| o == id) {
                    entry.owners.try_reserve(1)?;
                    entry.owners.push(id.to_string());
                }
                entry.ref_count = entry.ref_count.saturating_add(1);
                entry.last_activity = now;
                debug!(
                    "Reusing handle {} for '{}' ({} references)",
                    handle, id, entry.ref_count
                );
                return Ok(Component {
                    id: id.to_string(),
                    handle,
                    path: path.to_path_buf(),
                });
            }
            arena.by_path.remove(path);
        }

        arena.by_path.try_reserve(1)?;
        let mut owners = Vec::new();
        owners.try_reserve(1)?;
        owners.push(id.to_string());

        let library = self.loader.open(path)?;
        let mut hooks = hooks;
        if let Some(h) = hooks.as_mut() {
            if let Err(e) = run_init(&mut **h, id) {
                if let Err(close_err) = library.close() {
                    warn!(
                        "Failed to close {} after init failure: {}",
                        path.display(),
                        close_err
                    );
                }
                return Err(e);
            }
        }

        let handle = HandleId(arena.next_id);
        arena.next_id += 1;
        arena.handles.insert(
            handle,
            HandleEntry {
                path: path.to_path_buf(),
                library,
                ref_count: 1,
                owners,
                hooks,
                last_activity: now,
            },
        );
        arena.by_path.insert(path.to_path_buf(), handle);
        debug!("Loaded '{}' from {} as handle {}", id, path.display(), handle);

        Ok(Component {
            id: id.to_string(),
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Drop one reference to the component's handle.
    ///
    /// The library stays mapped until a sweep closes it. Unloading a
    /// component whose handle was already swept logs a warning and does
    /// nothing else.
    pub fn unload(&self, component: Component) -> Result<()> {
        let mut arena = self.arena()?;
        let Some(entry) = arena.handles.get_mut(&component.handle) else {
            warn!(
                "Unload of '{}' ignored: handle {} no longer exists",
                component.id, component.handle
            );
            return Ok(());
        };

        entry.ref_count = entry.ref_count.saturating_sub(1);
        entry.last_activity = Instant::now();
        if entry.ref_count == 0 {
            if let Some(hooks) = entry.hooks.as_mut() {
                hooks.terminate(&component.id);
            }
            debug!(
                "Handle {} for {} is unreferenced",
                component.handle,
                entry.path.display()
            );
        }
        Ok(())
    }

    /// Close idle handles. See [`ComponentLoader::unused_sweep_at`].
    pub fn unused_sweep(
        &self,
        registry: &mut SymbolRegistry,
        idle_threshold: Duration,
    ) -> Result<SweepReport> {
        self.unused_sweep_at(registry, idle_threshold, Instant::now())
    }

    /// Close every handle that is unreferenced, whose exported symbols are
    /// all unreferenced, and whose last activity is more than
    /// `idle_threshold` before `now`.
    ///
    /// A handle's last activity is the latest of its load/unload time and
    /// its symbols' last resolution. Closed handles have their symbols
    /// purged from `registry`.
    pub fn unused_sweep_at(
        &self,
        registry: &mut SymbolRegistry,
        idle_threshold: Duration,
        now: Instant,
    ) -> Result<SweepReport> {
        let mut arena = self.arena()?;

        let mut stale = Vec::new();
        stale.try_reserve(arena.handles.len())?;
        for (&handle, entry) in &arena.handles {
            if entry.ref_count > 0 {
                continue;
            }

            let mut last_activity = entry.last_activity;
            let mut referenced = false;
            for symbol in registry
                .exported()
                .iter()
                .filter(|s| entry.owners.contains(&s.owner))
            {
                if symbol.ref_count > 0 {
                    referenced = true;
                    break;
                }
                if let Some(used) = symbol.last_used {
                    last_activity = last_activity.max(used);
                }
            }
            if referenced {
                continue;
            }

            if now.saturating_duration_since(last_activity) > idle_threshold {
                stale.push(handle);
            }
        }

        let mut report = SweepReport::default();
        for handle in stale {
            let Some(entry) = arena.handles.remove(&handle) else {
                continue;
            };
            arena.by_path.remove(&entry.path);
            if let Err(e) = entry.library.close() {
                warn!("Failed to close {}: {}", entry.path.display(), e);
            }
            report.purged_symbols += registry.purge_owners(&entry.owners);
            report.closed.push(entry.path);
        }

        if !report.is_empty() {
            info!(
                "Sweep closed {} handle(s) and purged {} symbol(s)",
                report.closed.len(),
                report.purged_symbols
            );
        }
        Ok(report)
    }

    /// Look up `name` directly in the component's library.
    ///
    /// `Ok(None)` if the library lacks the symbol or the handle is gone.
    pub fn lookup(&self, component: &Component, name: &str) -> Result<Option<SymbolAddress>> {
        let arena = self.arena()?;
        Ok(arena
            .handles
            .get(&component.handle)
            .and_then(|entry| entry.library.lookup(name)))
    }

    /// Run the component's `process` hook. Without hooks the input is
    /// echoed back.
    pub fn process(&self, component: &Component, input: &[u8]) -> Result<Vec<u8>> {
        let mut arena = self.arena()?;
        let entry = arena
            .handles
            .get_mut(&component.handle)
            .ok_or_else(|| Error::NotFound {
                name: component.path.display().to_string(),
                constraint: "any".to_string(),
                context: component.id.clone(),
            })?;
        entry.last_activity = Instant::now();
        match entry.hooks.as_mut() {
            Some(hooks) => hooks.process(&component.id, input),
            None => Ok(input.to_vec()),
        }
    }

    pub fn stats(&self) -> Result<LoaderStats> {
        let arena = self.arena()?;
        Ok(LoaderStats {
            handles: arena.handles.len(),
            live_components: arena
                .handles
                .values()
                .fold(0u32, |acc, e| acc.saturating_add(e.ref_count)),
        })
    }

    /// Reference count of the handle backing `path`, if one is open.
    pub fn ref_count_of(&self, path: impl AsRef<Path>) -> Result<Option<u32>> {
        let arena = self.arena()?;
        Ok(arena
            .by_path
            .get(path.as_ref())
            .and_then(|h| arena.handles.get(h))
            .map(|e| e.ref_count))
    }

    pub fn is_loaded(&self, path: impl AsRef<Path>) -> Result<bool> {
        Ok(self.arena()?.by_path.contains_key(path.as_ref()))
    }
}

fn run_init(hooks: &mut dyn ComponentHooks, id: &str) -> Result<()> {
    if let Err(e) = hooks.init(id) {
        hooks.abort(id);
        warn!("Init hook failed for '{}': {}", id, e);
        return Err(Error::InitFailed {
            component: id.to_string(),
            message: e.to_string(),
        });
    }
    Ok(())
}
