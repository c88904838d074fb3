use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use crate::cache::path::cache_root;

/// Overrides the directory holding DSP sources (default: platform data dir).
pub const DSP_DIR_ENV: &str = "RTJIT_DSP_DIR";
/// Overrides the C++ compiler driver used by the frontend.
pub const CXX_ENV: &str = "RTJIT_CXX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LangStandard {
    #[serde(rename = "c++14")]
    Cxx14,
    #[serde(rename = "c++17")]
    Cxx17,
    #[default]
    #[serde(rename = "c++20")]
    Cxx20,
}

impl LangStandard {
    pub fn flag(self) -> &'static str {
        match self {
            LangStandard::Cxx14 => "-std=c++14",
            LangStandard::Cxx17 => "-std=c++17",
            LangStandard::Cxx20 => "-std=c++20",
        }
    }
}

impl fmt::Display for LangStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LangStandard::Cxx14 => "c++14",
            LangStandard::Cxx17 => "c++17",
            LangStandard::Cxx20 => "c++20",
        };
        f.write_str(name)
    }
}

impl FromStr for LangStandard {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().trim_start_matches("-std=") {
            "c++14" | "cxx14" | "14" => Ok(LangStandard::Cxx14),
            "c++17" | "cxx17" | "17" => Ok(LangStandard::Cxx17),
            "c++20" | "cxx20" | "20" => Ok(LangStandard::Cxx20),
            other => Err(format!(
                "unsupported language standard `{other}` (expected c++14, c++17 or c++20)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    None,
    #[default]
    Default,
    Aggressive,
}

impl OptLevel {
    pub fn flag(self) -> &'static str {
        match self {
            OptLevel::None => "-O0",
            OptLevel::Default => "-O2",
            OptLevel::Aggressive => "-O3",
        }
    }
}

/// Options shared by every compilation performed by one JIT session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JitOptions {
    pub lang_standard: LangStandard,
    /// Empty means the host triple.
    pub target_triple: Option<String>,
    pub include_paths: Vec<PathBuf>,
    /// Object cache directory; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// C++ compiler driver; discovered on `PATH` when unset.
    pub compiler: Option<PathBuf>,
    /// Driver used to link units into loadable shared objects.
    pub linker: PathBuf,
    pub opt_level: OptLevel,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            lang_standard: LangStandard::default(),
            target_triple: None,
            include_paths: Vec::new(),
            cache_dir: None,
            compiler: None,
            linker: PathBuf::from("cc"),
            opt_level: OptLevel::default(),
        }
    }
}

impl JitOptions {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_paths.push(dir.into());
        self
    }

    pub fn with_lang_standard(mut self, standard: LangStandard) -> Self {
        self.lang_standard = standard;
        self
    }

    /// Fill unset fields from the environment.
    pub fn apply_env(mut self) -> Self {
        if self.compiler.is_none() {
            if let Some(cxx) = env::var_os(CXX_ENV).filter(|value| !value.is_empty()) {
                self.compiler = Some(PathBuf::from(cxx));
            }
        }
        self
    }
}

/// Configuration of a [`DspHost`](crate::host::DspHost).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory with the DSP sources; `lib/` below it is the shared library folder.
    pub dsp_dir: PathBuf,
    /// Append-only compile log; `None` keeps events in `tracing` only.
    pub log_file: Option<PathBuf>,
    pub jit: JitOptions,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            dsp_dir: PathBuf::from("."),
            log_file: None,
            jit: JitOptions::default(),
        }
    }
}

impl HostConfig {
    pub fn new(dsp_dir: impl Into<PathBuf>) -> Self {
        Self {
            dsp_dir: dsp_dir.into(),
            ..Self::default()
        }
    }

    /// Platform defaults with environment overrides: sources under the user
    /// data directory, objects under the user cache directory.
    pub fn from_env() -> Result<Self> {
        let dsp_dir = match env::var_os(DSP_DIR_ENV) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => {
                let base_dirs =
                    BaseDirs::new().context("failed to determine user directories")?;
                base_dirs.data_dir().join("rtjit")
            }
        };

        let jit = JitOptions {
            cache_dir: Some(cache_root()?),
            ..JitOptions::default()
        }
        .apply_env();

        Ok(Self {
            log_file: Some(dsp_dir.join("compile.log")),
            dsp_dir,
            jit,
        })
    }

    /// Load a TOML file; missing keys keep their defaults.
    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(Self {
            jit: config.jit.apply_env(),
            ..config
        })
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.dsp_dir.join("lib")
    }

    pub fn source_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.dsp_dir.join(file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lang_standard_parses_common_spellings() {
        assert_eq!("c++17".parse::<LangStandard>(), Ok(LangStandard::Cxx17));
        assert_eq!("-std=c++14".parse::<LangStandard>(), Ok(LangStandard::Cxx14));
        assert_eq!("20".parse::<LangStandard>(), Ok(LangStandard::Cxx20));
        assert!("c++98".parse::<LangStandard>().is_err());
    }

    #[test]
    fn lang_standard_maps_to_driver_flag() {
        assert_eq!(LangStandard::default().flag(), "-std=c++20");
        assert_eq!(LangStandard::Cxx17.to_string(), "c++17");
    }

    #[test]
    fn relative_sources_resolve_against_dsp_dir() {
        let config = HostConfig::new("/data/rtjit");
        assert_eq!(
            config.source_path(Path::new("gain.cc")),
            PathBuf::from("/data/rtjit/gain.cc")
        );
        assert_eq!(
            config.source_path(Path::new("/elsewhere/gain.cc")),
            PathBuf::from("/elsewhere/gain.cc")
        );
        assert_eq!(config.lib_dir(), PathBuf::from("/data/rtjit/lib"));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn toml_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtjit.toml");
        std::fs::write(
            &path,
            "dsp_dir = \"/srv/dsp\"\n[jit]\nlang_standard = \"c++17\"\nopt_level = \"aggressive\"\n",
        )
        .unwrap();

        let config = HostConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.dsp_dir, PathBuf::from("/srv/dsp"));
        assert_eq!(config.jit.lang_standard, LangStandard::Cxx17);
        assert_eq!(config.jit.opt_level, OptLevel::Aggressive);
        assert_eq!(config.jit.linker, PathBuf::from("cc"));
    }
}
