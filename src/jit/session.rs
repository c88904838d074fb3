use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rtjit_symbols::SymbolTable;
use tracing::{debug, warn};

use crate::cache::ObjectCache;
use crate::compiler::{CompilationRequest, CompiledUnit, CompilerDriver, UnitOrigin};
use crate::config::JitOptions;
use crate::error::{JitError, LinkFailure, Result};
use crate::jit::context::{ExecutionContext, SymbolAddress};

/// One compile-and-link session: a compiler driver, an optional object
/// cache and the execution context the compiled units end up in.
#[derive(Debug)]
pub struct JitSession {
    options: JitOptions,
    driver: OnceCell<CompilerDriver>,
    cache: Option<Arc<ObjectCache>>,
    context: ExecutionContext,
}

impl JitSession {
    /// Opens the cache named by `options.cache_dir`. A cache that cannot be
    /// opened is logged and the session runs uncached.
    pub fn new(options: JitOptions) -> Result<Self> {
        let cache = match &options.cache_dir {
            Some(dir) => match ObjectCache::new(dir) {
                Ok(cache) => Some(Arc::new(cache)),
                Err(err) => {
                    warn!(%err, "object cache unavailable; compiling without it");
                    None
                }
            },
            None => None,
        };
        Self::with_cache(options, cache)
    }

    /// Share an already opened cache between sessions.
    pub fn with_cache(options: JitOptions, cache: Option<Arc<ObjectCache>>) -> Result<Self> {
        let context = ExecutionContext::new(&options)?;
        Ok(Self {
            options,
            driver: OnceCell::new(),
            cache,
            context,
        })
    }

    pub fn options(&self) -> &JitOptions {
        &self.options
    }

    pub fn cache(&self) -> Option<&Arc<ObjectCache>> {
        self.cache.as_ref()
    }

    fn driver(&self) -> &CompilerDriver {
        self.driver.get_or_init(|| CompilerDriver::new(&self.options))
    }

    /// Produce a unit for `source`, from the cache when valid.
    pub fn compile(&self, source: &Path) -> Result<CompiledUnit> {
        if let Some(unit) = self.cache.as_ref().and_then(|cache| cache.try_load(source)) {
            return Ok(unit);
        }

        let request = CompilationRequest::new(source, &self.options);
        let unit = self.driver().compile(&request)?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(&unit) {
                warn!(source = %source.display(), %err, "failed to cache compiled object");
            }
        }
        Ok(unit)
    }

    /// Compile (or load) one source file and add it to the context.
    pub fn add_module(&mut self, source: impl AsRef<Path>) -> Result<UnitOrigin> {
        let source = source.as_ref();
        let unit = self.compile(source)?;
        self.context.add_unit(&unit)?;
        debug!(source = %source.display(), origin = %unit.origin(), "module added");
        Ok(unit.origin())
    }

    /// Add several modules. Compilation runs in parallel; units are added in
    /// the given order and the first failure is returned.
    pub fn add_modules<P>(&mut self, sources: &[P]) -> Result<Vec<UnitOrigin>>
    where
        P: AsRef<Path> + Sync,
    {
        let units: Vec<Result<CompiledUnit>> = sources
            .par_iter()
            .map(|source| self.compile(source.as_ref()))
            .collect();

        let mut origins = Vec::with_capacity(units.len());
        for unit in units {
            let unit = unit?;
            self.context.add_unit(&unit)?;
            origins.push(unit.origin());
        }
        Ok(origins)
    }

    pub fn define_symbol<T>(&mut self, name: &str, address: *const T) -> Result<()> {
        let address = SymbolAddress::from_ptr(address).ok_or_else(|| {
            JitError::link(
                name,
                LinkFailure::Loader {
                    detail: format!("null address for injected symbol `{name}`"),
                },
            )
        })?;
        self.context.define_external_symbol(name, address)
    }

    pub fn symbols(&self) -> &SymbolTable {
        self.context.symbols()
    }

    /// Resolve a logical name (`add`, `process`) to an address. Names the
    /// symbol table does not know are tried as linkable names.
    pub fn find_symbol(&self, name: &str) -> Result<SymbolAddress> {
        self.context.lookup_function(name)
    }

    /// Like [`find_symbol`](Self::find_symbol) but `None` on any failure.
    pub fn lookup_function(&self, name: &str) -> Option<SymbolAddress> {
        self.find_symbol(name).ok()
    }

    /// Raw lookup of a linkable name.
    pub fn lookup(&self, linkable: &str) -> Option<SymbolAddress> {
        self.context.lookup(linkable)
    }

    /// Resolve `name` and reinterpret its address as a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the compiled
    /// definition, and must not be called after the context is dropped.
    pub unsafe fn lookup_fn<F: Copy>(&self, name: &str) -> Result<F> {
        debug_assert_eq!(
            std::mem::size_of::<F>(),
            std::mem::size_of::<usize>(),
            "lookup_fn needs a function pointer type"
        );
        let address = self.find_symbol(name)?.as_ptr();
        // SAFETY: the caller guarantees `F` is a pointer-sized fn type.
        Ok(unsafe { std::mem::transmute_copy::<*const std::ffi::c_void, F>(&address) })
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn into_context(self) -> ExecutionContext {
        self.context
    }
}
