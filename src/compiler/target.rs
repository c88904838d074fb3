use std::str::FromStr;

use target_lexicon::{HOST, Triple};

use crate::error::{JitError, Result};

/// Target description for one compilation.
///
/// Compiled code is loaded into this process, so a triple is only accepted
/// when its architecture and operating system match the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    triple: Triple,
    explicit: bool,
}

impl TargetSpec {
    pub fn host() -> Self {
        Self {
            triple: HOST,
            explicit: false,
        }
    }

    /// `None` or an empty string selects the host triple.
    pub fn parse(spec: Option<&str>) -> Result<Self> {
        let Some(spec) = spec.map(str::trim).filter(|spec| !spec.is_empty()) else {
            return Ok(Self::host());
        };

        let triple = Triple::from_str(spec).map_err(|err| JitError::Target {
            message: format!("invalid target triple `{spec}`: {err}"),
        })?;

        if triple.architecture != HOST.architecture
            || triple.operating_system != HOST.operating_system
        {
            return Err(JitError::Target {
                message: format!("cannot execute `{triple}` code on host `{HOST}`"),
            });
        }

        Ok(Self {
            triple,
            explicit: true,
        })
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    /// Driver flag for an explicitly requested triple.
    pub fn driver_flag(&self) -> Option<String> {
        self.explicit.then(|| format!("--target={}", self.triple))
    }
}
