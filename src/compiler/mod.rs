//! Compilation driver: turns one C++ source file into an in-memory object
//! image plus the list of functions it defines.

pub mod driver;
pub mod includes;
pub mod object;
pub mod target;
pub mod unit;

pub use driver::{CompilationRequest, CompilerDriver, CompilerFlavor, Toolchain};
pub use target::TargetSpec;
pub use unit::{CompiledUnit, UnitOrigin};
