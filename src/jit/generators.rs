//! Fallback symbol sources consulted after the context's own units.

use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};
use tracing::debug;

use crate::jit::context::SymbolAddress;

/// C++ runtimes tried in order; the first one that loads wins.
const CXX_RUNTIMES: &[&str] = &["libstdc++.so.6", "libstdc++.so", "libc++.so.1"];

pub trait SymbolGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress>;
}

fn dlsym(library: &Library, symbol: &str) -> Option<SymbolAddress> {
    // SAFETY: the value is only read as an address, never called here.
    let pointer = unsafe { library.get::<*mut std::ffi::c_void>(symbol.as_bytes()) }.ok()?;
    SymbolAddress::from_ptr(*pointer)
}

/// Symbols already present in the running process (libc, libm, the host
/// binary's own exports).
pub struct HostProcessGenerator {
    process: Library,
}

impl HostProcessGenerator {
    pub fn new() -> Self {
        Self {
            process: Library::this(),
        }
    }
}

impl Default for HostProcessGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolGenerator for HostProcessGenerator {
    fn name(&self) -> &str {
        "host process"
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        dlsym(&self.process, symbol)
    }
}

/// The C++ standard library, loaded into the global namespace so that units
/// referencing `operator new`, iostreams and friends resolve at load time.
pub struct RuntimeLibraryGenerator {
    name: String,
    library: Option<Library>,
}

impl RuntimeLibraryGenerator {
    pub fn load() -> Self {
        for candidate in CXX_RUNTIMES {
            // SAFETY: the C++ runtime's initialisers are safe to run in-process.
            match unsafe { Library::open(Some(*candidate), RTLD_NOW | RTLD_GLOBAL) } {
                Ok(library) => {
                    debug!(runtime = candidate, "loaded C++ runtime library");
                    return Self {
                        name: (*candidate).to_string(),
                        library: Some(library),
                    };
                }
                Err(err) => debug!(runtime = candidate, %err, "C++ runtime not available"),
            }
        }
        debug!("no C++ runtime library found; relying on the host process");
        Self {
            name: "C++ runtime (missing)".to_string(),
            library: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }
}

impl SymbolGenerator for RuntimeLibraryGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookup(&self, symbol: &str) -> Option<SymbolAddress> {
        self.library.as_ref().and_then(|library| dlsym(library, symbol))
    }
}
