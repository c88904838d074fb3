use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use crate::dsp::entry::{ParamCountFn, ParamFloatFn, ParamNameFn};

pub const MAX_PARAMS: usize = 16;

/// Metadata a unit reports for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl Default for ParamInfo {
    fn default() -> Self {
        Self {
            name: "Param".to_string(),
            min: 0.0,
            max: 1.0,
            default: 0.5,
        }
    }
}

/// Host-owned parameter storage, visible to compiled code as
/// `float g_params[16]`.
///
/// Cells hold `f32` bits so control threads can write while the audio
/// thread reads. The address is stable for the lifetime of the block.
#[repr(C)]
#[derive(Debug, Default)]
pub struct ParamBlock {
    cells: [AtomicU32; MAX_PARAMS],
}

impl ParamBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.cells
            .get(index)
            .map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
    }

    /// Returns `false` when `index` is out of range.
    pub fn set(&self, index: usize, value: f32) -> bool {
        match self.cells.get(index) {
            Some(cell) => {
                cell.store(value.to_bits(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> [f32; MAX_PARAMS] {
        std::array::from_fn(|index| f32::from_bits(self.cells[index].load(Ordering::Relaxed)))
    }

    pub fn apply_defaults(&self, params: &[ParamInfo]) {
        for (index, info) in params.iter().enumerate().take(MAX_PARAMS) {
            self.set(index, info.default);
        }
    }

    /// Address handed to compiled code.
    pub fn as_ptr(&self) -> *const f32 {
        self.cells.as_ptr().cast()
    }
}

/// Optional parameter query functions exported by a unit.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ParamQueries {
    pub count: Option<ParamCountFn>,
    pub name: Option<ParamNameFn>,
    pub min: Option<ParamFloatFn>,
    pub max: Option<ParamFloatFn>,
    pub default: Option<ParamFloatFn>,
}

impl ParamQueries {
    /// Ask the unit for its parameters. Missing queries fall back to the
    /// [`ParamInfo`] defaults; at most [`MAX_PARAMS`] are returned.
    ///
    /// # Safety
    ///
    /// Every function pointer must be callable with the declared signature.
    pub unsafe fn query(&self) -> Vec<ParamInfo> {
        let Some(count) = self.count else {
            return Vec::new();
        };
        // SAFETY: guaranteed by the caller.
        let count = unsafe { count() }.clamp(0, MAX_PARAMS as i32);

        (0..count)
            .map(|index| {
                let fallback = ParamInfo::default();
                // SAFETY: guaranteed by the caller.
                unsafe {
                    ParamInfo {
                        name: self
                            .name
                            .and_then(|name| c_string(name(index)))
                            .unwrap_or(fallback.name),
                        min: self.min.map_or(fallback.min, |min| min(index)),
                        max: self.max.map_or(fallback.max, |max| max(index)),
                        default: self.default.map_or(fallback.default, |default| default(index)),
                    }
                }
            })
            .collect()
    }
}

unsafe fn c_string(pointer: *const std::ffi::c_char) -> Option<String> {
    if pointer.is_null() {
        return None;
    }
    // SAFETY: non-null pointers from `param_name` are NUL-terminated strings.
    Some(unsafe { CStr::from_ptr(pointer) }.to_string_lossy().into_owned())
}
