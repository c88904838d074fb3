use std::fmt;
use std::sync::Arc;

use crate::dsp::entry::{ProcessFn, SetupFn, TeardownFn};
use crate::dsp::params::{ParamBlock, ParamInfo};
use crate::jit::ExecutionContext;

/// Stream parameters recorded at activation and replayed into the setup
/// hook of every binding swapped in afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub sample_rate: f64,
    pub min_frames: u32,
    pub max_frames: u32,
}

#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub process: ProcessFn,
    pub setup: Option<SetupFn>,
    pub teardown: Option<TeardownFn>,
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("process", &(self.process as *const ()))
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Everything the real-time path needs from one successful compile.
///
/// Immutable once built. Owns the execution context the entry points live
/// in, so the code stays mapped for as long as the binding exists.
pub struct Binding {
    entries: EntryPoints,
    params: Vec<ParamInfo>,
    generation: u64,
    param_block: Option<Arc<ParamBlock>>,
    // Dropped last: unloads the code the fields above point into.
    context: Option<ExecutionContext>,
}

impl Binding {
    /// # Safety
    ///
    /// Every entry point must stay callable for as long as `context` (or,
    /// when `None`, the program) is alive.
    pub unsafe fn new(entries: EntryPoints, generation: u64) -> Self {
        Self {
            entries,
            params: Vec::new(),
            generation,
            param_block: None,
            context: None,
        }
    }

    pub fn with_params(mut self, params: Vec<ParamInfo>, block: Arc<ParamBlock>) -> Self {
        self.params = params;
        self.param_block = Some(block);
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn params(&self) -> &[ParamInfo] {
        &self.params
    }

    pub fn entries(&self) -> &EntryPoints {
        &self.entries
    }

    pub fn context(&self) -> Option<&ExecutionContext> {
        self.context.as_ref()
    }

    pub fn has_setup(&self) -> bool {
        self.entries.setup.is_some()
    }

    pub fn has_teardown(&self) -> bool {
        self.entries.teardown.is_some()
    }

    /// Run the setup hook. A binding without one is always ready.
    pub fn setup(&self, config: StreamConfig) -> bool {
        match self.entries.setup {
            // SAFETY: valid while `self` is alive, per `Binding::new`.
            Some(setup) => unsafe {
                setup(config.sample_rate, config.min_frames, config.max_frames)
            },
            None => true,
        }
    }

    pub fn teardown(&self) {
        if let Some(teardown) = self.entries.teardown {
            // SAFETY: valid while `self` is alive, per `Binding::new`.
            unsafe { teardown() }
        }
    }

    /// # Safety
    ///
    /// `inputs` and `outputs` must point to `channels` channel pointers of at
    /// least `frames` samples each.
    pub unsafe fn process(
        &self,
        inputs: *const *const f32,
        outputs: *const *mut f32,
        channels: u32,
        frames: u32,
    ) {
        // SAFETY: buffer validity from the caller, code validity from `new`.
        unsafe { (self.entries.process)(inputs, outputs, channels, frames) }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("generation", &self.generation)
            .field("entries", &self.entries)
            .field("params", &self.params.len())
            .field("context", &self.context)
            .finish()
    }
}
