//! Shared utilities: logging setup, the compile log sink and name suggestions.

pub mod compile_log;
pub mod logger;
pub mod suggest;

pub use compile_log::CompileLog;
pub use suggest::closest_name;
