//! Probing of host system header directories.
//!
//! Appended after every user include path (`-idirafter`), so a driver that
//! already knows its headers is unaffected and `#include_next` keeps working.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::compiler::driver::CompilerFlavor;

struct ProbedIncludes {
    libstdcxx: Vec<PathBuf>,
    clang_builtin: Vec<PathBuf>,
}

static PROBED: Lazy<ProbedIncludes> = Lazy::new(|| ProbedIncludes {
    libstdcxx: probe_libstdcxx(),
    clang_builtin: probe_clang_builtin(),
});

/// Existing system include directories for a driver of `flavor`.
pub fn system_include_dirs(flavor: CompilerFlavor) -> Vec<PathBuf> {
    let mut dirs = PROBED.libstdcxx.clone();
    if flavor == CompilerFlavor::Clang {
        dirs.extend(PROBED.clang_builtin.iter().cloned());
    }
    dirs
}

fn probe_libstdcxx() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Some((version, dir)) = latest_versioned_child(Path::new("/usr/include/c++")) else {
        return dirs;
    };
    dirs.push(dir);

    let platform = PathBuf::from(format!(
        "/usr/include/{}-linux-gnu/c++/{version}",
        std::env::consts::ARCH
    ));
    if platform.is_dir() {
        dirs.push(platform);
    }
    dirs
}

fn probe_clang_builtin() -> Vec<PathBuf> {
    ["/usr/lib/clang", "/usr/local/lib/clang"]
        .iter()
        .filter_map(|root| latest_versioned_child(Path::new(root)))
        .map(|(_, dir)| dir.join("include"))
        .filter(|dir| dir.is_dir())
        .collect()
}

/// Child directory of `root` with the highest dotted numeric name.
fn latest_versioned_child(root: &Path) -> Option<(String, PathBuf)> {
    fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let key = version_key(&name)?;
            Some((key, name, entry.path()))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, name, path)| (name, path))
}

fn version_key(name: &str) -> Option<Vec<u32>> {
    if !name.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }
    name.split('.')
        .map(|part| part.parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_key_orders_numerically() {
        assert!(version_key("13") > version_key("9"));
        assert!(version_key("12.2.0") > version_key("12.1"));
        assert_eq!(version_key("v13"), None);
        assert_eq!(version_key("13-rc"), None);
    }

    #[test]
    fn latest_child_prefers_highest_version() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["9", "13", "11", "backup"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        let (version, path) = latest_versioned_child(dir.path()).unwrap();
        assert_eq!(version, "13");
        assert_eq!(path, dir.path().join("13"));
    }

    #[test]
    fn missing_root_yields_nothing() {
        assert!(latest_versioned_child(Path::new("/definitely/not/here")).is_none());
    }
}
