use std::path::{Path, PathBuf};
use std::sync::Arc;

use rtjit_utils::{CompileLog, closest_name};
use tracing::debug;

use crate::cache::ObjectCache;
use crate::compiler::UnitOrigin;
use crate::config::HostConfig;
use crate::dsp::binding::{Binding, EntryPoints};
use crate::dsp::entry::{EntryKind, EntryPoint};
use crate::dsp::params::{ParamBlock, ParamInfo, ParamQueries};
use crate::error::{JitError, Result};
use crate::jit::JitSession;

/// Symbol injected into every compiled unit, backed by the host's
/// [`ParamBlock`].
pub const PARAMS_SYMBOL: &str = "g_params";

/// Output of [`compile_dsp`].
#[derive(Debug)]
pub struct CompiledDsp {
    pub binding: Binding,
    pub params: Vec<ParamInfo>,
    /// Where each unit's object came from, libraries first.
    pub origins: Vec<(PathBuf, UnitOrigin)>,
}

/// Shared sources: every `*.cc` directly inside `lib_dir`, sorted. A missing
/// directory yields nothing.
pub fn lib_sources(lib_dir: &Path) -> Vec<PathBuf> {
    let pattern = lib_dir.join("*.cc");
    let Some(pattern) = pattern.to_str() else {
        return Vec::new();
    };
    let mut sources: Vec<PathBuf> = match glob::glob(pattern) {
        Ok(paths) => paths.filter_map(|path| path.ok()).collect(),
        Err(_) => Vec::new(),
    };
    sources.sort();
    sources
}

/// Compile `dsp_path` together with the shared library folder into a fresh
/// execution context and resolve its entry points.
///
/// Every step is written to `log`; the first failing step aborts the attempt
/// and nothing outside the new context is touched.
pub fn compile_dsp(
    config: &HostConfig,
    params: &Arc<ParamBlock>,
    dsp_path: &Path,
    generation: u64,
    cache: Option<Arc<ObjectCache>>,
    log: &CompileLog,
) -> Result<CompiledDsp> {
    log.append(format!("Compiling: {}", dsp_path.display()));

    let lib_dir = config.lib_dir();
    let mut options = config.jit.clone();
    if lib_dir.is_dir() {
        options = options.with_include_path(&lib_dir);
    }

    let mut session = JitSession::with_cache(options, cache)
        .inspect_err(|err| log.append(format!("JIT create error: {err}")))?;
    session
        .define_symbol(PARAMS_SYMBOL, params.as_ptr())
        .inspect_err(|err| log.append(format!("Symbol define error: {err}")))?;

    let libs = lib_sources(&lib_dir);
    for lib in &libs {
        log.append(format!("Compiling lib: {}", lib.display()));
    }
    let lib_origins = session
        .add_modules(&libs)
        .inspect_err(|err| log.append(format!("Lib compile error: {err}")))?;
    let main_origin = session
        .add_module(dsp_path)
        .inspect_err(|err| log.append(format!("Compile error: {err}")))?;

    let mut origins: Vec<(PathBuf, UnitOrigin)> = libs.into_iter().zip(lib_origins).collect();
    origins.push((dsp_path.to_path_buf(), main_origin));

    let process = match resolve_entry(&session, EntryKind::Process) {
        Ok(Some(EntryPoint::Process(process))) => process,
        Ok(_) => {
            let err = missing_process(&session);
            log.append(format!("Lookup error: {err}"));
            return Err(err);
        }
        Err(err) => {
            log.append(format!("Lookup error: {err}"));
            return Err(err);
        }
    };

    let mut entries = EntryPoints {
        process,
        setup: None,
        teardown: None,
    };
    let mut queries = ParamQueries::default();
    for kind in EntryKind::ALL.into_iter().filter(|kind| !kind.is_required()) {
        let entry = resolve_entry(&session, kind)
            .inspect_err(|err| log.append(format!("Lookup error: {err}")))?;
        let Some(entry) = entry else {
            continue;
        };
        match entry {
            EntryPoint::Setup(setup) => entries.setup = Some(setup),
            EntryPoint::Teardown(teardown) => entries.teardown = Some(teardown),
            EntryPoint::ParamCount(count) => queries.count = Some(count),
            EntryPoint::ParamName(name) => queries.name = Some(name),
            EntryPoint::ParamMin(min) => queries.min = Some(min),
            EntryPoint::ParamMax(max) => queries.max = Some(max),
            EntryPoint::ParamDefault(default) => queries.default = Some(default),
            EntryPoint::Process(_) => {}
        }
        if matches!(kind, EntryKind::Setup | EntryKind::Teardown | EntryKind::ParamCount) {
            log.append(format!("Found {kind}"));
        }
    }

    // SAFETY: each query passed its signature check and lives in `session`.
    let param_info = unsafe { queries.query() };
    if queries.count.is_none() {
        log.append("No param_count() - using 0 parameters");
    } else {
        log.append(format!("DSP defines {} parameters", param_info.len()));
        for (index, info) in param_info.iter().enumerate() {
            log.append(format!(
                "  [{index}] {} ({} - {}, default {})",
                info.name, info.min, info.max, info.default
            ));
        }
    }

    debug!(
        source = %dsp_path.display(),
        generation,
        setup = entries.setup.is_some(),
        teardown = entries.teardown.is_some(),
        "resolved entry points"
    );

    let context = session.into_context();
    // SAFETY: the entry points were resolved from `context`, which the
    // binding owns from here on.
    let binding = unsafe { Binding::new(entries, generation) }
        .with_params(param_info.clone(), Arc::clone(params))
        .with_context(context);

    log.append("Compile success!");
    Ok(CompiledDsp {
        binding,
        params: param_info,
        origins,
    })
}

/// Presence of every entry point in `session`: `Ok(true)` when defined
/// with an acceptable signature, `Ok(false)` when absent.
pub fn entry_report(session: &JitSession) -> Vec<(EntryKind, Result<bool>)> {
    EntryKind::ALL
        .into_iter()
        .map(|kind| (kind, resolve_entry(session, kind).map(|entry| entry.is_some())))
        .collect()
}

/// Resolve one entry point among the units of `session`. Host and runtime
/// symbols are never considered, so an optional hook that the unit does not
/// define is `None` even if some library exports the same name.
fn resolve_entry(session: &JitSession, kind: EntryKind) -> Result<Option<EntryPoint>> {
    let name = kind.export_name();
    let symbols = session.symbols();
    let Some(linkable) = symbols.resolve(name)? else {
        return Ok(None);
    };
    if let Some(entry) = symbols.entry_for_linkable(linkable) {
        kind.check_signature(entry)?;
    }

    let address = session
        .lookup(linkable)
        .ok_or_else(|| JitError::SymbolNotFound {
            name: name.to_string(),
        })?;
    // SAFETY: the signature check above accepted the definition for `kind`.
    Ok(Some(unsafe { EntryPoint::from_address(kind, address) }))
}

fn missing_process(session: &JitSession) -> JitError {
    let candidates = session
        .symbols()
        .entries()
        .iter()
        .map(|entry| {
            entry
                .demangled
                .split('(')
                .next()
                .unwrap_or(&entry.demangled)
                .to_string()
        })
        .collect::<Vec<_>>();
    JitError::RequiredSymbolNotFound {
        name: EntryKind::Process.export_name().to_string(),
        suggestion: closest_name(EntryKind::Process.export_name(), candidates),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn lib_sources_are_sorted_cc_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.cc", "a.cc", "notes.txt", "utils.h"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.cc"), "").unwrap();

        let sources = lib_sources(dir.path());
        assert_eq!(sources, vec![dir.path().join("a.cc"), dir.path().join("b.cc")]);
    }

    #[test]
    fn missing_lib_dir_is_empty() {
        assert!(lib_sources(Path::new("/definitely/not/a/lib/dir")).is_empty());
    }
}
