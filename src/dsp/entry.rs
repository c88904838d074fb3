use std::ffi::{c_char, c_int};
use std::fmt;

use rtjit_symbols::SymbolEntry;
use rtjit_symbols::demangle::parameter_list;

use crate::error::{JitError, Result};
use crate::jit::SymbolAddress;

pub type ProcessFn = unsafe extern "C" fn(*const *const f32, *const *mut f32, u32, u32);
pub type SetupFn = unsafe extern "C" fn(f64, u32, u32) -> bool;
pub type TeardownFn = unsafe extern "C" fn();
pub type ParamCountFn = unsafe extern "C" fn() -> c_int;
pub type ParamNameFn = unsafe extern "C" fn(c_int) -> *const c_char;
pub type ParamFloatFn = unsafe extern "C" fn(c_int) -> f32;

const FLOAT_INPUTS: &[&str] = &["floatconst*const*", "constfloat*const*"];
const FLOAT_OUTPUTS: &[&str] = &["float*const*"];
const UNSIGNED: &[&str] = &["unsignedint"];
const DOUBLE: &[&str] = &["double"];
const INT: &[&str] = &["int"];

/// The functions a compiled unit may export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Process,
    Setup,
    Teardown,
    ParamCount,
    ParamName,
    ParamMin,
    ParamMax,
    ParamDefault,
}

impl EntryKind {
    pub const ALL: [EntryKind; 8] = [
        EntryKind::Process,
        EntryKind::Setup,
        EntryKind::Teardown,
        EntryKind::ParamCount,
        EntryKind::ParamName,
        EntryKind::ParamMin,
        EntryKind::ParamMax,
        EntryKind::ParamDefault,
    ];

    /// Name the unit exports the function under.
    pub fn export_name(self) -> &'static str {
        match self {
            EntryKind::Process => "process",
            EntryKind::Setup => "init",
            EntryKind::Teardown => "destroy",
            EntryKind::ParamCount => "param_count",
            EntryKind::ParamName => "param_name",
            EntryKind::ParamMin => "param_min",
            EntryKind::ParamMax => "param_max",
            EntryKind::ParamDefault => "param_default",
        }
    }

    pub fn is_required(self) -> bool {
        self == EntryKind::Process
    }

    /// Accepted whitespace-free spellings, one slice per parameter.
    fn parameters(self) -> &'static [&'static [&'static str]] {
        match self {
            EntryKind::Process => &[FLOAT_INPUTS, FLOAT_OUTPUTS, UNSIGNED, UNSIGNED],
            EntryKind::Setup => &[DOUBLE, UNSIGNED, UNSIGNED],
            EntryKind::Teardown | EntryKind::ParamCount => &[],
            EntryKind::ParamName
            | EntryKind::ParamMin
            | EntryKind::ParamMax
            | EntryKind::ParamDefault => &[INT],
        }
    }

    /// Human readable parameter list.
    pub fn signature(self) -> &'static str {
        match self {
            EntryKind::Process => {
                "const float* const*, float* const*, unsigned int, unsigned int"
            }
            EntryKind::Setup => "double, unsigned int, unsigned int",
            EntryKind::Teardown | EntryKind::ParamCount => "",
            EntryKind::ParamName
            | EntryKind::ParamMin
            | EntryKind::ParamMax
            | EntryKind::ParamDefault => "int",
        }
    }

    /// Check a C++-mangled definition against the expected parameter list.
    /// `extern "C"` exports carry no parameter information and always pass.
    pub fn check_signature(self, entry: &SymbolEntry) -> Result<()> {
        let Some(found) = parameter_list(&entry.demangled) else {
            return Ok(());
        };

        let expected = self.parameters();
        let matches = found.len() == expected.len()
            && found.iter().zip(expected).all(|(param, accepted)| {
                let compact: String = param.chars().filter(|ch| !ch.is_whitespace()).collect();
                accepted.contains(&compact.as_str())
            });

        if matches {
            Ok(())
        } else {
            Err(JitError::SignatureMismatch {
                name: self.export_name().to_string(),
                expected: self.signature().to_string(),
                found: found.join(", "),
            })
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}()", self.export_name())
    }
}

/// A resolved entry point, tagged with its calling signature.
#[derive(Debug, Clone, Copy)]
pub enum EntryPoint {
    Process(ProcessFn),
    Setup(SetupFn),
    Teardown(TeardownFn),
    ParamCount(ParamCountFn),
    ParamName(ParamNameFn),
    ParamMin(ParamFloatFn),
    ParamMax(ParamFloatFn),
    ParamDefault(ParamFloatFn),
}

impl EntryPoint {
    /// Reinterpret `address` as the function type of `kind`.
    ///
    /// # Safety
    ///
    /// `address` must be a function whose signature matches `kind`, e.g. as
    /// confirmed by [`EntryKind::check_signature`].
    pub unsafe fn from_address(kind: EntryKind, address: SymbolAddress) -> Self {
        let pointer = address.as_ptr();
        // SAFETY: guaranteed by the caller; all targets are plain fn pointers.
        unsafe {
            match kind {
                EntryKind::Process => EntryPoint::Process(std::mem::transmute(pointer)),
                EntryKind::Setup => EntryPoint::Setup(std::mem::transmute(pointer)),
                EntryKind::Teardown => EntryPoint::Teardown(std::mem::transmute(pointer)),
                EntryKind::ParamCount => EntryPoint::ParamCount(std::mem::transmute(pointer)),
                EntryKind::ParamName => EntryPoint::ParamName(std::mem::transmute(pointer)),
                EntryKind::ParamMin => EntryPoint::ParamMin(std::mem::transmute(pointer)),
                EntryKind::ParamMax => EntryPoint::ParamMax(std::mem::transmute(pointer)),
                EntryKind::ParamDefault => EntryPoint::ParamDefault(std::mem::transmute(pointer)),
            }
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryPoint::Process(_) => EntryKind::Process,
            EntryPoint::Setup(_) => EntryKind::Setup,
            EntryPoint::Teardown(_) => EntryKind::Teardown,
            EntryPoint::ParamCount(_) => EntryKind::ParamCount,
            EntryPoint::ParamName(_) => EntryKind::ParamName,
            EntryPoint::ParamMin(_) => EntryKind::ParamMin,
            EntryPoint::ParamMax(_) => EntryKind::ParamMax,
            EntryPoint::ParamDefault(_) => EntryKind::ParamDefault,
        }
    }
}
