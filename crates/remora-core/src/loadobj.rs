//! # Load Objects
//!
//! Tracks the modules (executables and shared libraries) mapped into the
//! target and resolves symbols inside them.
//!
//! ## Resolution order
//!
//! 1. If native lookup is enabled, ask the engine.
//! 2. Otherwise, or when the engine has no answer, consult the module's own
//!    parsed symbol table.
//!
//! "No such symbol" and "no such module" are ordinary `Ok(None)` results.
//!
//! ## Short names
//!
//! Modules are indexed by the last component of their path (`libc.so.6`).
//! Registering a second module with the same short name replaces the first
//! one's entry. That matches how the engine reports modules and is kept as
//! is; a warning is logged when it happens.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::DebugEngine;
use crate::error::Result;
use crate::symbols::demangle::make_symbol_name;
use crate::symbols::{ModuleSymbols, SymbolLoader};
use crate::types::{Address, ClosestSymbol};

/// A module mapped into the target
pub struct LoadObject
{
    short_name: String,
    path: PathBuf,
    base: Address,
    size: u64,
    symbols: Box<dyn ModuleSymbols>,
    supports_native_closest_symbol: bool,
}

impl LoadObject
{
    /// Last path component, the key the registry indexes by
    pub fn short_name(&self) -> &str
    {
        &self.short_name
    }

    /// Fully resolved path of the module image on the local filesystem
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    pub fn base(&self) -> Address
    {
        self.base
    }

    pub fn size(&self) -> u64
    {
        self.size
    }

    /// Whether `address` falls inside `[base, base + size)`
    pub fn contains(&self, address: Address) -> bool
    {
        address.offset_from(self.base).is_some_and(|offset| offset < self.size)
    }

    /// Whether closest-symbol queries for this module go to the engine first
    pub fn supports_native_closest_symbol(&self) -> bool
    {
        self.supports_native_closest_symbol
    }

    /// Look `name` up in the module's own table
    pub fn lookup_symbol(&self, name: &str) -> Option<Address>
    {
        self.symbols.lookup(name).and_then(|offset| self.base.checked_add(offset))
    }

    fn local_closest_symbol(&self, address: Address) -> Option<ClosestSymbol>
    {
        let offset = address.offset_from(self.base)?;
        self.symbols.closest(offset).map(|(name, delta)| ClosestSymbol {
            name: make_symbol_name(name),
            offset: delta,
        })
    }

    fn close(&mut self)
    {
        debug!(module = %self.short_name, "closing load object");
        self.symbols.close();
    }

    fn info(&self) -> LoadObjectInfo
    {
        LoadObjectInfo {
            short_name: self.short_name.clone(),
            path: self.path.clone(),
            base: self.base,
            size: self.size,
        }
    }
}

/// Owned snapshot of a [`LoadObject`]'s identity, handed out past the session
/// lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadObjectInfo
{
    pub short_name: String,
    pub path: PathBuf,
    pub base: Address,
    pub size: u64,
}

/// The set of modules currently tracked for one session
pub struct LoadObjectRegistry
{
    objects: HashMap<String, LoadObject>,
    search_path: Vec<PathBuf>,
    loader: Arc<dyn SymbolLoader>,
    use_native_lookup: bool,
}

impl LoadObjectRegistry
{
    pub fn new(search_path: Vec<PathBuf>, loader: Arc<dyn SymbolLoader>, use_native_lookup: bool) -> Self
    {
        Self {
            objects: HashMap::new(),
            search_path,
            loader,
            use_native_lookup,
        }
    }

    pub fn len(&self) -> usize
    {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.objects.is_empty()
    }

    pub fn get(&self, short_name: &str) -> Option<&LoadObject>
    {
        self.objects.get(short_name)
    }

    /// Snapshot of every tracked module, ordered by base address
    pub fn infos(&self) -> Vec<LoadObjectInfo>
    {
        let mut infos: Vec<_> = self.objects.values().map(LoadObject::info).collect();
        infos.sort_by_key(|info| info.base);
        infos
    }

    /// The module whose range contains `address`
    pub fn owner_of(&self, address: Address) -> Option<&LoadObject>
    {
        self.objects.values().find(|object| object.contains(address))
    }

    /// Resolve `file_name` to an existing local file
    ///
    /// Accepted as-is if it names a regular file; otherwise its last component
    /// is tried in each search directory in order. Directories never match.
    pub fn resolve_path(&self, file_name: &str) -> Option<PathBuf>
    {
        let as_given = Path::new(file_name);
        if as_given.is_file() {
            return Some(as_given.to_path_buf());
        }

        let short = as_given.file_name()?;
        self.search_path
            .iter()
            .map(|dir| dir.join(short))
            .find(|candidate| candidate.is_file())
    }

    /// Start tracking a module
    ///
    /// Returns `Ok(false)` without registering anything when `file_name`
    /// cannot be resolved to a local file: such a module is never resolvable
    /// through local tables (the engine may still know it).
    ///
    /// ## Errors
    ///
    /// Whatever the symbol loader reports for a file it cannot read.
    pub fn register(&mut self, file_name: &str, size: u64, base: Address) -> Result<bool>
    {
        let Some(path) = self.resolve_path(file_name) else {
            warn!(file = file_name, "load object not found on search path; not tracked");
            return Ok(false);
        };

        let short_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string());

        let symbols = self.loader.open(&path)?;
        let object = LoadObject {
            short_name: short_name.clone(),
            path,
            base,
            size,
            symbols,
            supports_native_closest_symbol: self.use_native_lookup,
        };

        debug!(module = %short_name, base = %base, size, "registered load object");
        if let Some(mut replaced) = self.objects.insert(short_name, object) {
            warn!(
                module = %replaced.short_name,
                old_base = %replaced.base,
                new_base = %base,
                "load object re-registered under the same short name; keeping the newest"
            );
            replaced.close();
        }
        Ok(true)
    }

    /// Address of `symbol` in the module named `module`
    ///
    /// ## Errors
    ///
    /// Only engine infrastructure failures; misses are `Ok(None)`.
    pub fn lookup_symbol_address(
        &self,
        engine: &mut dyn DebugEngine,
        module: &str,
        symbol: &str,
    ) -> Result<Option<Address>>
    {
        if self.use_native_lookup {
            if let Some(address) = engine.lookup_symbol(module, symbol)? {
                return Ok(Some(address));
            }
        }

        Ok(self.objects.get(module).and_then(|object| object.lookup_symbol(symbol)))
    }

    /// Nearest symbol at or before `address`, for diagnostics
    ///
    /// The engine answers first when the owning module supports native
    /// closest-symbol queries (or, for addresses outside every tracked module,
    /// when native lookup is enabled); the owning module's own table is the
    /// fallback.
    pub fn closest_symbol(&self, engine: &mut dyn DebugEngine, address: Address) -> Result<Option<ClosestSymbol>>
    {
        let owner = self.owner_of(address);
        let native_first = owner.map_or(self.use_native_lookup, LoadObject::supports_native_closest_symbol);

        if native_first {
            if let Some((name, offset)) = engine.closest_symbol(address)? {
                return Ok(Some(ClosestSymbol {
                    name: make_symbol_name(name),
                    offset,
                }));
            }
        }

        Ok(owner.and_then(|object| object.local_closest_symbol(address)))
    }

    /// Close every module and forget them all
    pub fn close(&mut self)
    {
        for (_, mut object) in self.objects.drain() {
            object.close();
        }
    }
}

impl Drop for LoadObjectRegistry
{
    fn drop(&mut self)
    {
        self.close();
    }
}
