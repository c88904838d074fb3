//! The owned host context: configuration, parameter block, publisher and
//! compile status for one DSP slot.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rtjit_utils::CompileLog;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::ObjectCache;
use crate::compiler::UnitOrigin;
use crate::config::HostConfig;
use crate::dsp::{ParamBlock, ParamInfo, compile_dsp};
use crate::error::Result;
use crate::hotswap::{self, CompileTicket, Processor, Publisher, StageOutcome, SwapState};

/// Source selected when the DSP directory offers nothing better.
pub const FALLBACK_SOURCE: &str = "dsp.cc";
/// Preferred source when present.
pub const PREFERRED_SOURCE: &str = "local/gain.cc";

/// Outcome of the most recent compile attempt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileStatus {
    pub success: bool,
    pub last_error: Option<String>,
    /// Generation of the newest successfully compiled binding.
    pub generation: u64,
    #[serde(skip)]
    pub origins: Vec<(PathBuf, UnitOrigin)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompileReport {
    /// The new binding is pending and becomes active at the next block.
    Staged { generation: u64, params_changed: bool },
    /// A newer compile finished first; this result was discarded.
    Superseded { generation: u64 },
    /// Compilation failed; the active binding keeps running.
    Failed { generation: u64, error: String },
}

impl CompileReport {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileReport::Staged { .. })
    }
}

pub struct DspHost {
    config: HostConfig,
    params: Arc<ParamBlock>,
    publisher: Publisher,
    cache: Option<Arc<ObjectCache>>,
    log: CompileLog,
    selected: RwLock<PathBuf>,
    status: RwLock<CompileStatus>,
    param_info: RwLock<Vec<ParamInfo>>,
}

impl DspHost {
    /// Compile `source` and build the host plus the processor that runs the
    /// result. Any compile failure, including a missing `process`, is fatal
    /// here.
    pub fn start(config: HostConfig, source: &Path) -> Result<(Self, Processor)> {
        let log = match &config.log_file {
            Some(path) => CompileLog::new(path),
            None => CompileLog::disabled(),
        };
        log.append("=== start ===");
        log.append(format!(
            "Found {} DSP files",
            available_sources(&config.dsp_dir).len()
        ));

        let cache = open_cache(&config);
        let params = Arc::new(ParamBlock::new());
        let selected = config.source_path(source);

        let compiled = compile_dsp(&config, &params, &selected, 1, cache.clone(), &log)
            .inspect_err(|err| log.append(format!("Init failed: {err}")))?;
        params.apply_defaults(&compiled.params);
        let status = CompileStatus {
            success: true,
            last_error: None,
            generation: compiled.binding.generation(),
            origins: compiled.origins,
        };

        let (publisher, processor) = hotswap::channel(compiled.binding);
        log.append("Init success!");
        info!(source = %selected.display(), "DSP host started");

        let host = Self {
            config,
            params,
            publisher,
            cache,
            log,
            selected: RwLock::new(selected),
            status: RwLock::new(status),
            param_info: RwLock::new(compiled.params),
        };
        Ok((host, processor))
    }

    /// Recompile the selected source and stage the result. Never disturbs
    /// the running binding on failure. Safe to call from several threads;
    /// the newest compile wins.
    pub fn recompile(&self) -> CompileReport {
        let ticket = self.publisher.begin();
        let generation = ticket.generation();
        let source = self.selected.read().clone();

        let compiled = match compile_dsp(
            &self.config,
            &self.params,
            &source,
            generation,
            self.cache.clone(),
            &self.log,
        ) {
            Ok(compiled) => compiled,
            Err(err) => {
                warn!(source = %source.display(), "recompile failed: {err}");
                return self.record_failure(ticket, err.to_string());
            }
        };

        // Held across the stage so metadata always follows staging order.
        let mut param_info = self.param_info.write();
        match self.publisher.stage(ticket, compiled.binding) {
            StageOutcome::Staged => {
                let params_changed = *param_info != compiled.params;
                *param_info = compiled.params;
                self.params.apply_defaults(&param_info);
                *self.status.write() = CompileStatus {
                    success: true,
                    last_error: None,
                    generation,
                    origins: compiled.origins,
                };
                CompileReport::Staged {
                    generation,
                    params_changed,
                }
            }
            StageOutcome::Superseded => CompileReport::Superseded { generation },
        }
    }

    /// Report a failed attempt. A failure older than the newest staged
    /// binding is stale and leaves the status alone.
    fn record_failure(&self, ticket: CompileTicket, error: String) -> CompileReport {
        let generation = ticket.generation();
        self.publisher.abandon(ticket);

        // Same lock as the staging path, so status writes stay ordered.
        let _param_info = self.param_info.write();
        if self.publisher.latest_staged_generation() > generation {
            debug!(generation, "discarding stale compile failure");
            return CompileReport::Superseded { generation };
        }
        let mut status = self.status.write();
        status.success = false;
        status.last_error = Some(error.clone());
        CompileReport::Failed { generation, error }
    }

    /// Select another source, relative to the DSP directory unless absolute.
    /// Takes effect at the next [`recompile`](Self::recompile).
    pub fn select(&self, source: &Path) {
        let path = self.config.source_path(source);
        self.log.append(format!("Selected: {}", path.display()));
        *self.selected.write() = path;
    }

    pub fn selected(&self) -> PathBuf {
        self.selected.read().clone()
    }

    pub fn status(&self) -> CompileStatus {
        self.status.read().clone()
    }

    pub fn param_info(&self) -> Vec<ParamInfo> {
        self.param_info.read().clone()
    }

    pub fn param(&self, index: usize) -> Option<f32> {
        if index >= self.param_info.read().len() {
            return None;
        }
        self.params.get(index)
    }

    /// Write a parameter the current unit declares. Returns `false` for an
    /// undeclared index.
    pub fn set_param(&self, index: usize, value: f32) -> bool {
        if index >= self.param_info.read().len() {
            return false;
        }
        self.params.set(index, value)
    }

    pub fn param_block(&self) -> &Arc<ParamBlock> {
        &self.params
    }

    pub fn swap_state(&self) -> SwapState {
        self.publisher.state()
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<ObjectCache>> {
        self.cache.as_ref()
    }

    pub fn compile_log(&self) -> &CompileLog {
        &self.log
    }

    /// Unload bindings the real-time path has retired.
    pub fn collect_retired(&self) -> usize {
        self.publisher.collect_retired()
    }
}

impl std::fmt::Debug for DspHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DspHost")
            .field("dsp_dir", &self.config.dsp_dir)
            .field("selected", &*self.selected.read())
            .field("status", &*self.status.read())
            .field("publisher", &self.publisher)
            .finish()
    }
}

fn open_cache(config: &HostConfig) -> Option<Arc<ObjectCache>> {
    let dir = config.jit.cache_dir.as_ref()?;
    match ObjectCache::new(dir) {
        Ok(cache) => Some(Arc::new(cache)),
        Err(err) => {
            warn!(%err, "object cache unavailable; compiling without it");
            None
        }
    }
}

/// Selectable sources: `*.cc` files at the top of `dsp_dir` and one level
/// below it (excluding `lib/`), as sorted `/`-separated relative paths.
pub fn available_sources(dsp_dir: &Path) -> Vec<String> {
    let mut sources = Vec::new();
    let Ok(entries) = fs::read_dir(dsp_dir) else {
        return sources;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if path.is_dir() {
            if name == "lib" {
                continue;
            }
            let Ok(children) = fs::read_dir(&path) else {
                continue;
            };
            for child in children.flatten() {
                let child = child.path();
                if is_cc(&child) {
                    if let Some(file) = child.file_name().and_then(|file| file.to_str()) {
                        sources.push(format!("{name}/{file}"));
                    }
                }
            }
        } else if is_cc(&path) {
            sources.push(name.to_string());
        }
    }
    sources.sort();
    sources
}

/// [`PREFERRED_SOURCE`] when available, else the first available source,
/// else [`FALLBACK_SOURCE`].
pub fn default_source(dsp_dir: &Path) -> PathBuf {
    let sources = available_sources(dsp_dir);
    let chosen = sources
        .iter()
        .find(|source| source.as_str() == PREFERRED_SOURCE)
        .or_else(|| sources.first())
        .map(String::as_str)
        .unwrap_or(FALLBACK_SOURCE);
    PathBuf::from(chosen)
}

fn is_cc(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "cc")
}
