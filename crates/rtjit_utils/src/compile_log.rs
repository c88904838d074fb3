use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Append-only, line oriented log of compile and lifecycle events.
///
/// Writing is best effort: a missing directory or a read-only file never
/// turns into an error for the caller.
#[derive(Debug)]
pub struct CompileLog {
    path: Option<PathBuf>,
    // Serialises appends from concurrent control threads so lines never interleave.
    guard: Mutex<()>,
}

impl CompileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            guard: Mutex::new(()),
        }
    }

    /// A log that only forwards to `tracing`.
    pub fn disabled() -> Self {
        Self {
            path: None,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: "rtjit::compile", "{message}");

        let Some(path) = &self.path else {
            return;
        };

        let _lock = self.guard.lock();
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let line = format!("[{}] {message}\n", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = written {
            debug!(path = %path.display(), %err, "compile log append failed");
        }
    }
}

impl Default for CompileLog {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("compile.log");
        let log = CompileLog::new(&path);

        log.append("Compiling: gain.cc");
        log.append("Compile success!");

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Compiling: gain.cc"));
        assert!(lines[1].ends_with("Compile success!"));
    }

    #[test]
    fn disabled_log_is_silent() {
        let log = CompileLog::disabled();
        log.append("nothing happens");
        assert!(log.path().is_none());
    }
}
