use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;

/// Overrides the object cache directory.
pub const CACHE_DIR_ENV: &str = "RTJIT_CACHE_DIR";

pub fn cache_root() -> Result<PathBuf> {
    if let Some(custom) = env::var_os(CACHE_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(custom));
    }

    let base_dirs = BaseDirs::new().context("failed to determine user directories")?;
    Ok(base_dirs.cache_dir().join("rtjit"))
}

pub fn object_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{key}.o"))
}

pub fn sidecar_path(root: &Path, key: &str) -> PathBuf {
    root.join(format!("{key}.o.sym"))
}

pub fn ensure_structure(root: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(root)
}
