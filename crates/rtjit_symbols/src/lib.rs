//! Symbol bookkeeping for runtime-compiled units.
//!
//! Every function a compiled unit defines is recorded twice: once in the
//! linkable form the loader understands and once demangled for humans. The
//! [`SymbolTable`] maps logical function names (`"process"`, `"add_cxx"`) to
//! the linkable name that has to be looked up.

pub mod demangle;
pub mod sidecar;
pub mod table;

pub use demangle::demangle;
pub use sidecar::{parse_sidecar, write_sidecar};
pub use table::{SymbolEntry, SymbolError, SymbolTable};
