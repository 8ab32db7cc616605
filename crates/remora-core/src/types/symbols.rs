//! Symbol name and closest-symbol result types.

use std::fmt;

/// Mangling scheme a raw symbol name appears to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mangling
{
    /// Rust legacy (`_ZN...E` with hash) or v0 (`_R...`)
    Rust,
    /// Itanium C++ ABI (`_Z...`)
    Itanium,
    /// Plain linkage name
    None,
}

/// A symbol's linkage name plus its demangled form, when one exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    mangling: Mangling,
}

impl SymbolName
{
    pub fn new(raw: String, demangled: Option<String>, mangling: Mangling) -> Self
    {
        Self {
            raw,
            demangled,
            mangling,
        }
    }

    /// Linkage name exactly as it appears in the symbol table.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Demangled name if available, raw name otherwise.
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    pub fn mangling(&self) -> Mangling
    {
        self.mangling
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.display_name())
    }
}

/// The nearest known symbol at or before an address
///
/// `offset` is the distance in bytes from the symbol's start to the queried
/// address, so `symbol + offset` reproduces the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosestSymbol
{
    pub name: SymbolName,
    pub offset: u64,
}

impl fmt::Display for ClosestSymbol
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.offset == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}+0x{:x}", self.name, self.offset)
        }
    }
}
