#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rtjit::JitOptions;
use rtjit::compiler::CompilerDriver;

/// Skip the surrounding test when the machine has no C++ compiler.
macro_rules! require_toolchain {
    () => {
        if !support::toolchain_available() {
            return Ok(());
        }
    };
}
pub(crate) use require_toolchain;

pub fn toolchain_available() -> bool {
    let available = CompilerDriver::new(&JitOptions::default().apply_env())
        .toolchain()
        .is_some();
    if !available {
        eprintln!("skipping: no C++ compiler found on PATH");
    }
    available
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Copy a fixture to `dir/relative`, creating parent directories.
pub fn install(dir: &Path, name: &str, relative: &str) -> Result<PathBuf> {
    let target = dir.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(fixture(name), &target)?;
    Ok(target)
}

pub fn temp_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("failed to create temp dir")
}

pub fn options() -> JitOptions {
    JitOptions::default().apply_env()
}
