use std::ffi::c_void;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use ahash::AHashMap;
use libloading::os::unix::{Library, RTLD_LOCAL, RTLD_NOW};
use rtjit_symbols::SymbolTable;
use tempfile::TempDir;
use tracing::debug;

use crate::compiler::CompiledUnit;
use crate::config::JitOptions;
use crate::error::{JitError, LinkFailure, Result};
use crate::jit::generators::{HostProcessGenerator, RuntimeLibraryGenerator, SymbolGenerator};
use crate::jit::linker::Linker;

/// Address of a symbol inside an [`ExecutionContext`]. Only meaningful while
/// that context is alive.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(usize);

impl SymbolAddress {
    pub fn from_ptr<T>(pointer: *const T) -> Option<Self> {
        (!pointer.is_null()).then_some(Self(pointer as usize))
    }

    pub fn as_usize(self) -> usize {
        self.0
    }

    pub fn as_ptr(self) -> *const c_void {
        self.0 as *const c_void
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:#x})", self.0)
    }
}

struct LoadedUnit {
    source: PathBuf,
    shared_object: PathBuf,
    library: Library,
}

/// Symbol owner for one generation of compiled code.
///
/// Units are linked into shared objects under a private scratch directory
/// and loaded with local visibility, so code loaded here can never satisfy a
/// reference made by another context. Dropping the context unloads every
/// unit.
pub struct ExecutionContext {
    // Field order is drop order: libraries go before the files backing them.
    units: Vec<LoadedUnit>,
    symbols: SymbolTable,
    strong_definitions: AHashMap<String, PathBuf>,
    injected: Vec<(String, SymbolAddress)>,
    generators: Vec<Box<dyn SymbolGenerator>>,
    linker: Linker,
    next_unit: usize,
    workdir: TempDir,
}

impl ExecutionContext {
    /// A context with the default generators: the host process image and
    /// the C++ runtime library.
    pub fn new(options: &JitOptions) -> Result<Self> {
        let mut context = Self::empty(options)?;
        context.add_generator(Box::new(HostProcessGenerator::new()));
        context.add_generator(Box::new(RuntimeLibraryGenerator::load()));
        Ok(context)
    }

    /// A context without generators.
    pub fn empty(options: &JitOptions) -> Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("rtjit-ctx")
            .tempdir()
            .map_err(|err| JitError::io("failed to create execution context directory", err))?;
        Ok(Self {
            units: Vec::new(),
            symbols: SymbolTable::new(),
            strong_definitions: AHashMap::new(),
            injected: Vec::new(),
            generators: Vec::new(),
            linker: Linker::new(&options.linker),
            next_unit: 0,
            workdir,
        })
    }

    pub fn add_generator(&mut self, generator: Box<dyn SymbolGenerator>) {
        debug!(generator = generator.name(), "registered symbol generator");
        self.generators.push(generator);
    }

    /// Make `address` available to compiled code under `name`. Applies to
    /// units added afterwards. Redefining a name replaces its address.
    pub fn define_external_symbol(&mut self, name: &str, address: SymbolAddress) -> Result<()> {
        if let Some(previous) = self.strong_definitions.get(name) {
            return Err(JitError::link(
                previous.clone(),
                LinkFailure::DuplicateSymbol {
                    symbol: name.to_string(),
                    previous: previous.clone(),
                },
            ));
        }
        match self.injected.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = address,
            None => self.injected.push((name.to_string(), address)),
        }
        Ok(())
    }

    /// Link and load one unit. On failure the context is unchanged.
    pub fn add_unit(&mut self, unit: &CompiledUnit) -> Result<()> {
        let source = unit.source().to_path_buf();
        self.check_duplicates(unit)?;

        let id = self.next_unit;
        self.next_unit += 1;
        let object_path = self.workdir.path().join(format!("unit{id}.o"));
        let shared_object = self.workdir.path().join(format!("unit{id}.so"));
        fs::write(&object_path, unit.object())
            .map_err(|err| JitError::io("failed to write unit object", err))?;

        let dependencies: Vec<PathBuf> = self
            .units
            .iter()
            .map(|loaded| loaded.shared_object.clone())
            .collect();
        self.linker
            .link_shared(&object_path, &shared_object, &dependencies, &self.injected)
            .map_err(|failure| JitError::link(&source, failure))?;

        // SAFETY: the object was produced by the C++ frontend for this
        // process; running its static initialisers is the point of loading.
        let library = unsafe { Library::open(Some(&shared_object), RTLD_NOW | RTLD_LOCAL) }
            .map_err(|err| JitError::link(&source, classify_load_error(err.to_string())))?;

        for definition in unit.definitions().iter().filter(|def| !def.weak) {
            self.strong_definitions
                .insert(definition.name.clone(), source.clone());
        }
        self.symbols.extend(unit.symbols().iter().cloned());
        self.units.push(LoadedUnit {
            source,
            shared_object,
            library,
        });
        debug!(
            unit = id,
            origin = %unit.origin(),
            functions = unit.symbols().len(),
            "unit loaded"
        );
        Ok(())
    }

    fn check_duplicates(&self, unit: &CompiledUnit) -> Result<()> {
        for definition in unit.definitions().iter().filter(|def| !def.weak) {
            let previous = self
                .strong_definitions
                .get(&definition.name)
                .cloned()
                .or_else(|| {
                    self.injected
                        .iter()
                        .any(|(name, _)| *name == definition.name)
                        .then(|| PathBuf::from("<injected symbol>"))
                });
            if let Some(previous) = previous {
                return Err(JitError::link(
                    unit.source(),
                    LinkFailure::DuplicateSymbol {
                        symbol: rtjit_symbols::demangle(&definition.name),
                        previous,
                    },
                ));
            }
        }
        Ok(())
    }

    /// Every function defined by the loaded units, in load order.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Source paths of the loaded units, in load order.
    pub fn sources(&self) -> impl Iterator<Item = &std::path::Path> {
        self.units.iter().map(|unit| unit.source.as_path())
    }

    /// Find a linkable name: units newest-first, then injected symbols, then
    /// generators.
    pub fn lookup(&self, linkable: &str) -> Option<SymbolAddress> {
        for unit in self.units.iter().rev() {
            // SAFETY: read as an address only.
            let found = unsafe { unit.library.get::<*mut c_void>(linkable.as_bytes()) };
            if let Some(address) = found.ok().and_then(|symbol| SymbolAddress::from_ptr(*symbol)) {
                return Some(address);
            }
        }

        if let Some((_, address)) = self.injected.iter().find(|(name, _)| name == linkable) {
            return Some(*address);
        }

        self.generators
            .iter()
            .find_map(|generator| generator.lookup(linkable))
    }

    /// Resolve a logical function name through the symbol table, falling
    /// back to using `name` as the linkable name.
    pub fn lookup_function(&self, name: &str) -> Result<SymbolAddress> {
        let linkable = self.symbols.resolve(name)?.unwrap_or(name);
        self.lookup(linkable).ok_or_else(|| JitError::SymbolNotFound {
            name: name.to_string(),
        })
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("units", &self.units.len())
            .field("functions", &self.symbols.len())
            .field("injected", &self.injected.len())
            .field("workdir", &self.workdir.path())
            .finish()
    }
}

fn classify_load_error(detail: String) -> LinkFailure {
    if detail.contains("undefined symbol") {
        LinkFailure::Unresolved { detail }
    } else {
        LinkFailure::Loader { detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_messages_are_classified() {
        assert!(matches!(
            classify_load_error("unit0.so: undefined symbol: _Z3fooi".into()),
            LinkFailure::Unresolved { .. }
        ));
        assert!(matches!(
            classify_load_error("unit0.so: invalid ELF header".into()),
            LinkFailure::Loader { .. }
        ));
    }

    #[test]
    fn injected_symbols_are_found_and_replaced() {
        let mut context = ExecutionContext::empty(&JitOptions::default()).unwrap();
        let first = SymbolAddress::from_ptr(0x1000 as *const u8).unwrap();
        let second = SymbolAddress::from_ptr(0x2000 as *const u8).unwrap();

        context.define_external_symbol("g_params", first).unwrap();
        assert_eq!(context.lookup("g_params"), Some(first));
        context.define_external_symbol("g_params", second).unwrap();
        assert_eq!(context.lookup("g_params"), Some(second));
        assert_eq!(context.lookup("missing"), None);
    }

    #[test]
    fn generators_back_up_empty_context() {
        let context = ExecutionContext::new(&JitOptions::default()).unwrap();
        assert!(context.lookup_function("malloc").is_ok());
        assert!(matches!(
            context.lookup_function("rtjit_no_such_symbol"),
            Err(JitError::SymbolNotFound { .. })
        ));
    }
}
