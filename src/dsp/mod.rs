//! Audio-callback contract for compiled units: typed entry points, the
//! parameter block shared with compiled code, and the loader that turns a
//! source file into a [`Binding`].

pub mod binding;
pub mod entry;
pub mod loader;
pub mod params;

pub use binding::{Binding, EntryPoints, StreamConfig};
pub use entry::{EntryKind, EntryPoint};
pub use loader::{CompiledDsp, PARAMS_SYMBOL, compile_dsp, entry_report, lib_sources};
pub use params::{MAX_PARAMS, ParamBlock, ParamInfo};
