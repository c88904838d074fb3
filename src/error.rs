use std::fmt;
use std::io;
use std::path::PathBuf;

use rtjit_symbols::SymbolError;
use thiserror::Error;

/// Coarse classification of a [`JitError`], stable for callers that only
/// need to branch on the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TargetCreationFailed,
    CompilationFailed,
    ModuleGenerationFailed,
    LinkFailed,
    RequiredSymbolNotFound,
    SymbolNotFound,
    AmbiguousSymbol,
    SignatureMismatch,
    CacheIo,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::TargetCreationFailed => "failed to create target",
            ErrorKind::CompilationFailed => "compilation failed",
            ErrorKind::ModuleGenerationFailed => "failed to generate module",
            ErrorKind::LinkFailed => "link failed",
            ErrorKind::RequiredSymbolNotFound => "required symbol not found",
            ErrorKind::SymbolNotFound => "symbol not found",
            ErrorKind::AmbiguousSymbol => "ambiguous symbol",
            ErrorKind::SignatureMismatch => "signature mismatch",
            ErrorKind::CacheIo => "cache I/O failed",
            ErrorKind::Io => "I/O error",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum LinkFailure {
    #[error("duplicate definition of `{symbol}` (already defined by {})", .previous.display())]
    DuplicateSymbol { symbol: String, previous: PathBuf },
    #[error("unresolved reference: {detail}")]
    Unresolved { detail: String },
    #[error("linker failed: {output}")]
    Linker { output: String },
    #[error("loader failed: {detail}")]
    Loader { detail: String },
}

#[derive(Debug, Error)]
pub enum JitError {
    #[error("failed to create target: {message}")]
    Target { message: String },

    #[error("compilation failed: {diagnostics} [file: {}]", .path.display())]
    Frontend { path: PathBuf, diagnostics: String },

    #[error("no module generated after compilation [file: {}]", .path.display())]
    EmptyUnit { path: PathBuf },

    #[error("{failure} [file: {}]", .path.display())]
    Link {
        path: PathBuf,
        #[source]
        failure: LinkFailure,
    },

    #[error("required symbol `{name}` not found{}", suggestion_suffix(.suggestion))]
    RequiredSymbolNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("symbol `{name}` not found")]
    SymbolNotFound { name: String },

    #[error(transparent)]
    AmbiguousSymbol(#[from] SymbolError),

    #[error("`{name}` has parameters ({found}), expected ({expected})")]
    SignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("cache I/O failed for {}: {source}", .path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl JitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JitError::Target { .. } => ErrorKind::TargetCreationFailed,
            JitError::Frontend { .. } => ErrorKind::CompilationFailed,
            JitError::EmptyUnit { .. } => ErrorKind::ModuleGenerationFailed,
            JitError::Link { .. } => ErrorKind::LinkFailed,
            JitError::RequiredSymbolNotFound { .. } => ErrorKind::RequiredSymbolNotFound,
            JitError::SymbolNotFound { .. } => ErrorKind::SymbolNotFound,
            JitError::AmbiguousSymbol(_) => ErrorKind::AmbiguousSymbol,
            JitError::SignatureMismatch { .. } => ErrorKind::SignatureMismatch,
            JitError::CacheIo { .. } => ErrorKind::CacheIo,
            JitError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        JitError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn link(path: impl Into<PathBuf>, failure: LinkFailure) -> Self {
        JitError::Link {
            path: path.into(),
            failure,
        }
    }
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|name| format!(" (did you mean `{name}`?)"))
        .unwrap_or_default()
}

pub type Result<T, E = JitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_error_carries_file_and_diagnostics() {
        let err = JitError::Frontend {
            path: PathBuf::from("/tmp/dsp.cc"),
            diagnostics: "error: expected ';'".into(),
        };
        let text = err.to_string();
        assert!(text.contains("expected ';'"));
        assert!(text.contains("[file: /tmp/dsp.cc]"));
        assert_eq!(err.kind(), ErrorKind::CompilationFailed);
    }

    #[test]
    fn missing_entry_point_mentions_suggestion() {
        let err = JitError::RequiredSymbolNotFound {
            name: "process".into(),
            suggestion: Some("proces".into()),
        };
        assert_eq!(
            err.to_string(),
            "required symbol `process` not found (did you mean `proces`?)"
        );
    }

    #[test]
    fn symbol_failures_have_distinct_kinds() {
        let required = JitError::RequiredSymbolNotFound {
            name: "process".into(),
            suggestion: None,
        };
        let optional = JitError::SymbolNotFound {
            name: "init".into(),
        };
        let ambiguous = JitError::from(SymbolError::Ambiguous {
            name: "scale".into(),
            candidates: vec!["scale(float)".into(), "scale(double)".into()],
        });
        assert_eq!(required.kind(), ErrorKind::RequiredSymbolNotFound);
        assert_eq!(optional.kind(), ErrorKind::SymbolNotFound);
        assert_eq!(ambiguous.kind(), ErrorKind::AmbiguousSymbol);
    }

    #[test]
    fn link_error_names_previous_definition() {
        let err = JitError::link(
            "/dsp/b.cc",
            LinkFailure::DuplicateSymbol {
                symbol: "_Z6squarei".into(),
                previous: PathBuf::from("/dsp/a.cc"),
            },
        );
        assert!(err.to_string().contains("already defined by /dsp/a.cc"));
        assert_eq!(err.kind(), ErrorKind::LinkFailed);
    }
}
