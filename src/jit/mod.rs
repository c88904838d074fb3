pub mod context;
pub mod generators;
pub mod linker;
pub mod session;

pub use context::{ExecutionContext, SymbolAddress};
pub use generators::{HostProcessGenerator, RuntimeLibraryGenerator, SymbolGenerator};
pub use session::JitSession;
