//! # Module Symbol Tables
//!
//! The self-parsed side of symbol resolution. Each registered load object
//! owns a [`ModuleSymbols`] table produced by a [`SymbolLoader`]; the engine's
//! native lookup, when enabled, is consulted before these tables.
//!
//! Offsets in a table are relative to the module's load base, so the same
//! table serves any address the module is mapped at.
//!
//! The default loader, [`ObjectSymbolLoader`], reads ELF, Mach-O, and PE
//! images with the `object` crate. Anything else (a cached index, a test
//! fixture) plugs in through the traits.

pub(crate) mod demangle;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use object::{Object, ObjectSegment, ObjectSymbol, SymbolKind};
use tracing::debug;

use crate::error::{RemoraError, Result};

/// Symbol table of one module
pub trait ModuleSymbols: Send
{
    /// Offset of `name` from the module base, `None` if the module does not
    /// define it
    fn lookup(&self, name: &str) -> Option<u64>;

    /// Nearest symbol at or before `offset`: `(raw name, offset - symbol)`
    fn closest(&self, offset: u64) -> Option<(String, u64)>;

    /// Release whatever the table holds (file handles, mapped images)
    fn close(&mut self) {}
}

/// Opens module images and produces their symbol tables
pub trait SymbolLoader: Send + Sync
{
    /// ## Errors
    ///
    /// Any failure to open or parse `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleSymbols>>;
}

impl<F> SymbolLoader for F
where
    F: Fn(&Path) -> Result<Box<dyn ModuleSymbols>> + Send + Sync,
{
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleSymbols>>
    {
        self(path)
    }
}

/// In-memory symbol table: name to offset, plus an offset-sorted index for
/// closest-symbol queries
#[derive(Debug, Default, Clone)]
pub struct SymbolTable
{
    by_name: HashMap<String, u64>,
    by_offset: Vec<(u64, String)>,
}

impl SymbolTable
{
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn len(&self) -> usize
    {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.by_name.is_empty()
    }
}

/// Builds both indexes in one pass; a later definition of the same name wins
impl<S: Into<String>> FromIterator<(S, u64)> for SymbolTable
{
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self
    {
        let mut by_name = HashMap::new();
        for (name, offset) in iter {
            by_name.insert(name.into(), offset);
        }

        let mut by_offset: Vec<(u64, String)> =
            by_name.iter().map(|(name, offset)| (*offset, name.clone())).collect();
        by_offset.sort_unstable();

        Self { by_name, by_offset }
    }
}

impl ModuleSymbols for SymbolTable
{
    fn lookup(&self, name: &str) -> Option<u64>
    {
        self.by_name.get(name).copied()
    }

    fn closest(&self, offset: u64) -> Option<(String, u64)>
    {
        let after = self.by_offset.partition_point(|(o, _)| *o <= offset);
        let (start, name) = self.by_offset.get(after.checked_sub(1)?)?;
        Some((name.clone(), offset - start))
    }

    fn close(&mut self)
    {
        self.by_name.clear();
        self.by_offset.clear();
    }
}

/// Loader reading symbol tables out of object files with `object`
///
/// Keeps defined text and data symbols from both the static and dynamic
/// tables. Offsets are measured from the image's lowest segment address,
/// which is where the module's first mapping lands at runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectSymbolLoader;

impl SymbolLoader for ObjectSymbolLoader
{
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleSymbols>>
    {
        let bytes = fs::read(path)?;
        let file = object::File::parse(&*bytes)
            .map_err(|err| RemoraError::InvalidArgument(format!("failed to parse {}: {err}", path.display())))?;

        let image_base = file.segments().map(|segment| segment.address()).min().unwrap_or(0);

        let table: SymbolTable = file
            .symbols()
            .chain(file.dynamic_symbols())
            .filter(|symbol| symbol.is_definition() && matches!(symbol.kind(), SymbolKind::Text | SymbolKind::Data))
            .filter(|symbol| symbol.address() >= image_base)
            .filter_map(|symbol| {
                let name = symbol.name().ok().filter(|name| !name.is_empty())?;
                Some((name, symbol.address() - image_base))
            })
            .collect();

        debug!(path = %path.display(), symbols = table.len(), "parsed module symbols");
        Ok(Box::new(table))
    }
}
