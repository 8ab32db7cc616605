//! Symbol demangling utilities.
//!
//! Closest-symbol answers come back from either the engine or a module's own
//! symbol table as raw linkage names. This module turns them into
//! [`SymbolName`] values carrying a readable form where one can be derived.
//!
//! - **Rust**: legacy (`_ZN...17h<hash>E`) and v0 (`_R...`) via `rustc-demangle`
//! - **C++**: recognised (`_Z...`) but left mangled
//! - **C**: passed through unchanged

use rustc_demangle::try_demangle;

use crate::types::{Mangling, SymbolName};

/// Build a [`SymbolName`] from a raw linkage name.
pub(crate) fn make_symbol_name(raw: impl Into<String>) -> SymbolName
{
    let raw = raw.into();
    let demangled = try_demangle(&raw).ok().map(|d| format!("{d:#}"));
    let mangling = if demangled.is_some() {
        Mangling::Rust
    } else if raw.starts_with("_Z") {
        Mangling::Itanium
    } else {
        Mangling::None
    };

    SymbolName::new(raw, demangled, mangling)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn plain_c_name_passes_through()
    {
        let name = make_symbol_name("malloc");
        assert_eq!(name.mangling(), Mangling::None);
        assert_eq!(name.display_name(), "malloc");
        assert!(name.demangled().is_none());
    }

    #[test]
    fn rust_legacy_name_is_demangled_without_hash()
    {
        let name = make_symbol_name("_ZN4core3ptr13drop_in_place17h0123456789abcdefE");
        assert_eq!(name.mangling(), Mangling::Rust);
        assert_eq!(name.display_name(), "core::ptr::drop_in_place");
    }

    #[test]
    fn itanium_name_is_classified()
    {
        let name = make_symbol_name("_Z3fooi");
        assert_eq!(name.mangling(), Mangling::Itanium);
        assert_eq!(name.display_name(), "_Z3fooi");
    }
}
