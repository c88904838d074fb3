use std::fmt;
use std::path::{Path, PathBuf};

use rtjit_symbols::SymbolEntry;

use crate::compiler::object::{DefinedSymbol, defined_symbols};
use crate::error::{JitError, Result};

/// Where the object image of a unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOrigin {
    Compiled,
    Cache,
}

impl fmt::Display for UnitOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitOrigin::Compiled => f.write_str("compiled"),
            UnitOrigin::Cache => f.write_str("cache"),
        }
    }
}

/// One translation unit lowered to a relocatable object, ready to be linked
/// into an execution context.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    source: PathBuf,
    object: Vec<u8>,
    symbols: Vec<SymbolEntry>,
    definitions: Vec<DefinedSymbol>,
    origin: UnitOrigin,
}

impl CompiledUnit {
    /// Wrap a freshly produced object image. Fails when the image cannot be
    /// read or defines no function.
    pub fn from_object(source: impl Into<PathBuf>, object: Vec<u8>) -> Result<Self> {
        let source = source.into();
        let definitions = defined_symbols(&object).map_err(|err| JitError::Frontend {
            path: source.clone(),
            diagnostics: format!("compiler produced an unreadable object: {err}"),
        })?;
        let symbols: Vec<SymbolEntry> = definitions
            .iter()
            .filter(|def| def.is_function())
            .map(|def| SymbolEntry::from_linkable(def.name.clone()))
            .collect();
        if symbols.is_empty() {
            return Err(JitError::EmptyUnit { path: source });
        }

        Ok(Self {
            source,
            object,
            symbols,
            definitions,
            origin: UnitOrigin::Compiled,
        })
    }

    /// Rebuild a unit from a cached object and its sidecar. The sidecar is
    /// authoritative for the function list; the image is still scanned for
    /// duplicate detection.
    pub fn from_cache(source: impl Into<PathBuf>, object: Vec<u8>, symbols: Vec<SymbolEntry>) -> Self {
        let definitions = defined_symbols(&object).unwrap_or_default();
        Self {
            source: source.into(),
            object,
            symbols,
            definitions,
            origin: UnitOrigin::Cache,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn object(&self) -> &[u8] {
        &self.object
    }

    /// Functions defined by this unit, demangled and linkable.
    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.symbols
    }

    /// All global definitions, functions and data alike.
    pub fn definitions(&self) -> &[DefinedSymbol] {
        &self.definitions
    }

    pub fn origin(&self) -> UnitOrigin {
        self.origin
    }
}
