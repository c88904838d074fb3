//! Change notification for DSP sources.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use ahash::AHashSet;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Watches the directory of the selected source and the shared `lib/`
/// folder for edits to `.cc` and header files.
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
    watched_dirs: AHashSet<PathBuf>,
}

impl SourceWatcher {
    pub fn new() -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            rx,
            watched_dirs: AHashSet::new(),
        })
    }

    /// Watch the directory containing `source`, plus `lib_dir` when it
    /// exists. Directory level watching survives editors that save by
    /// renaming a temporary file.
    pub fn watch_source(&mut self, source: &Path, lib_dir: &Path) {
        if let Some(dir) = source.parent() {
            self.watch_dir(dir);
        }
        if lib_dir.is_dir() {
            self.watch_dir(lib_dir);
        }
    }

    fn watch_dir(&mut self, dir: &Path) {
        if self.watched_dirs.contains(dir) {
            return;
        }
        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = %dir.display(), "watching for changes");
                self.watched_dirs.insert(dir.to_path_buf());
            }
            Err(err) => warn!(dir = %dir.display(), %err, "failed to watch directory"),
        }
    }

    /// Non-blocking poll; `None` when nothing relevant changed.
    pub fn poll_changes(&mut self) -> Option<Vec<PathBuf>> {
        let mut changed = AHashSet::new();
        while let Ok(event) = self.rx.try_recv() {
            collect_event(event, &mut changed);
        }
        finish(changed)
    }

    /// Block up to `timeout` for the first change, then gather whatever else
    /// arrives within `settle` so one save triggers one recompile.
    pub fn wait_for_changes(&mut self, timeout: Duration, settle: Duration) -> Option<Vec<PathBuf>> {
        let mut changed = AHashSet::new();
        let first = self.rx.recv_timeout(timeout).ok()?;
        collect_event(first, &mut changed);

        let deadline = Instant::now() + settle;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.rx.recv_timeout(left) {
                Ok(event) => collect_event(event, &mut changed),
                Err(_) => break,
            }
        }
        finish(changed)
    }
}

fn collect_event(event: notify::Result<Event>, changed: &mut AHashSet<PathBuf>) {
    let Ok(event) = event else {
        return;
    };
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    for path in event.paths {
        if is_source(&path) {
            let canonical = path.canonicalize().unwrap_or(path);
            changed.insert(canonical);
        }
    }
}

fn finish(changed: AHashSet<PathBuf>) -> Option<Vec<PathBuf>> {
    if changed.is_empty() {
        return None;
    }
    let mut paths: Vec<_> = changed.into_iter().collect();
    paths.sort();
    Some(paths)
}

fn is_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(OsStr::to_str),
        Some("cc" | "cpp" | "cxx" | "h" | "hpp")
    )
}
