use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::compiler::includes::system_include_dirs;
use crate::compiler::target::TargetSpec;
use crate::compiler::unit::CompiledUnit;
use crate::config::{CXX_ENV, JitOptions, LangStandard, OptLevel};
use crate::error::{JitError, Result};

/// Drivers tried in order when no compiler is configured.
const DRIVER_CANDIDATES: &[&str] = &["clang++", "c++", "g++"];

/// Everything the frontend needs to lower one source file.
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    pub source: PathBuf,
    pub lang_standard: LangStandard,
    pub include_paths: Vec<PathBuf>,
    pub target_triple: Option<String>,
}

impl CompilationRequest {
    pub fn new(source: impl Into<PathBuf>, options: &JitOptions) -> Self {
        Self {
            source: source.into(),
            lang_standard: options.lang_standard,
            include_paths: options.include_paths.clone(),
            target_triple: options.target_triple.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFlavor {
    Clang,
    Gcc,
    Unknown,
}

impl CompilerFlavor {
    fn from_driver(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if name.contains("clang") {
            CompilerFlavor::Clang
        } else if name.contains("g++") || name.contains("gcc") {
            CompilerFlavor::Gcc
        } else {
            CompilerFlavor::Unknown
        }
    }
}

/// A located C++ compiler driver.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub cxx: PathBuf,
    pub flavor: CompilerFlavor,
}

impl Toolchain {
    /// Use `explicit` when given, otherwise search `PATH`.
    pub fn discover(explicit: Option<&Path>) -> Option<Self> {
        if let Some(path) = explicit {
            let cxx = which::which(path).unwrap_or_else(|_| path.to_path_buf());
            return Some(Self::from_path(cxx));
        }

        DRIVER_CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .map(Self::from_path)
    }

    fn from_path(cxx: PathBuf) -> Self {
        // `c++` is usually a symlink; the resolved name tells the flavor.
        let resolved = fs::canonicalize(&cxx).unwrap_or_else(|_| cxx.clone());
        let mut flavor = CompilerFlavor::from_driver(&cxx);
        if flavor == CompilerFlavor::Unknown {
            flavor = CompilerFlavor::from_driver(&resolved);
        }
        Self { cxx, flavor }
    }
}

/// Runs the system C++ driver and reads the produced object back into memory.
#[derive(Debug, Clone)]
pub struct CompilerDriver {
    toolchain: Option<Toolchain>,
    opt_level: OptLevel,
}

impl CompilerDriver {
    pub fn new(options: &JitOptions) -> Self {
        let toolchain = Toolchain::discover(options.compiler.as_deref());
        match &toolchain {
            Some(toolchain) => debug!(
                compiler = %toolchain.cxx.display(),
                flavor = ?toolchain.flavor,
                "using C++ driver"
            ),
            None => warn!("no C++ compiler found on PATH"),
        }
        Self {
            toolchain,
            opt_level: options.opt_level,
        }
    }

    pub fn toolchain(&self) -> Option<&Toolchain> {
        self.toolchain.as_ref()
    }

    /// Compile one translation unit.
    ///
    /// Diagnostics from a failed run are returned verbatim inside
    /// [`JitError::Frontend`]; warnings from a successful run are logged.
    pub fn compile(&self, request: &CompilationRequest) -> Result<CompiledUnit> {
        let target = TargetSpec::parse(request.target_triple.as_deref())?;
        let toolchain = self.toolchain.as_ref().ok_or_else(|| JitError::Frontend {
            path: request.source.clone(),
            diagnostics: format!("no C++ compiler found; install clang++ or set {CXX_ENV}"),
        })?;

        let workdir = tempfile::Builder::new()
            .prefix("rtjit-cc")
            .tempdir()
            .map_err(|err| JitError::io("failed to create compiler scratch directory", err))?;
        let object_path = workdir.path().join("unit.o");
        let args = self.arguments(toolchain, request, &target, &object_path);

        debug!(
            compiler = %toolchain.cxx.display(),
            source = %request.source.display(),
            "invoking frontend"
        );
        let output = duct::cmd(toolchain.cxx.as_path(), &args)
            .env("LC_ALL", "C")
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()
            .map_err(|err| JitError::Frontend {
                path: request.source.clone(),
                diagnostics: format!("failed to run {}: {err}", toolchain.cxx.display()),
            })?;

        let diagnostics = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if !output.status.success() {
            let diagnostics = if diagnostics.is_empty() {
                format!("{} exited with {}", toolchain.cxx.display(), output.status)
            } else {
                diagnostics
            };
            return Err(JitError::Frontend {
                path: request.source.clone(),
                diagnostics,
            });
        }
        if !diagnostics.is_empty() {
            warn!(source = %request.source.display(), "{diagnostics}");
        }

        let object = read_object(&request.source, &object_path)?;
        CompiledUnit::from_object(request.source.clone(), object)
    }

    fn arguments(
        &self,
        toolchain: &Toolchain,
        request: &CompilationRequest,
        target: &TargetSpec,
        output: &Path,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            request.lang_standard.flag().into(),
            "-fPIC".into(),
        ];
        // GNU unique symbols are shared process-wide and pin the library,
        // which would leak inline statics between contexts.
        if toolchain.flavor == CompilerFlavor::Gcc {
            args.push("-fno-gnu-unique".into());
        }
        args.push(self.opt_level.flag().into());
        args.push("-fdiagnostics-color=never".into());
        if toolchain.flavor == CompilerFlavor::Clang {
            if let Some(flag) = target.driver_flag() {
                args.push(flag.into());
            }
        }
        for dir in &request.include_paths {
            args.push("-I".into());
            args.push(dir.clone().into_os_string());
        }
        for dir in system_include_dirs(toolchain.flavor) {
            args.push("-idirafter".into());
            args.push(dir.into_os_string());
        }
        args.push("-c".into());
        args.push(request.source.clone().into_os_string());
        args.push("-o".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

fn read_object(source: &Path, object_path: &Path) -> Result<Vec<u8>> {
    fs::read(object_path).map_err(|err| {
        JitError::io(
            format!(
                "failed to read object {} emitted for {}",
                object_path.display(),
                source.display()
            ),
            err,
        )
    })
}
