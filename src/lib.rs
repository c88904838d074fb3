pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod dsp;
pub mod error;
pub mod host;
pub mod hotswap;
pub mod jit;
pub mod version;
pub mod watch;

pub use config::{HostConfig, JitOptions, LangStandard, OptLevel};
pub use error::{ErrorKind, JitError, LinkFailure};
pub use host::{CompileReport, CompileStatus, DspHost};
pub use hotswap::{Processor, Publisher, SwapState};
pub use jit::{ExecutionContext, JitSession, SymbolAddress};
