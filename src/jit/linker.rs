use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::LinkFailure;
use crate::jit::context::SymbolAddress;

/// Wraps the system linker driver to turn one relocatable object into a
/// loadable shared object.
#[derive(Debug, Clone)]
pub struct Linker {
    program: PathBuf,
}

impl Linker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Link `object` into `output`.
    ///
    /// Every entry of `dependencies` becomes a `DT_NEEDED` entry of the
    /// result, so references into earlier units resolve against exactly
    /// those libraries. `injected` symbols are defined as absolute addresses.
    pub fn link_shared(
        &self,
        object: &Path,
        output: &Path,
        dependencies: &[PathBuf],
        injected: &[(String, SymbolAddress)],
    ) -> Result<(), LinkFailure> {
        let mut cc = Command::new(&self.program);
        cc.arg("-shared").arg("-o").arg(output).arg(object);
        for dependency in dependencies {
            cc.arg(dependency);
        }
        for (name, address) in injected {
            cc.arg(format!("-Wl,--defsym={name}={:#x}", address.as_usize()));
        }
        cc.env("LC_ALL", "C");

        debug!(linker = %self.program.display(), output = %output.display(), "linking unit");
        let result = cc.output().map_err(|err| LinkFailure::Linker {
            output: format!("failed to invoke {}: {err}", self.program.display()),
        })?;

        if !result.status.success() {
            let mut output = String::from_utf8_lossy(&result.stderr).trim_end().to_string();
            if output.is_empty() {
                output = format!("{} exited with {}", self.program.display(), result.status);
            }
            return Err(LinkFailure::Linker { output });
        }
        Ok(())
    }
}
