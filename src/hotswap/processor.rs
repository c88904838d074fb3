use std::ptr;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_channel::TrySendError;

use crate::dsp::{Binding, StreamConfig};
use crate::hotswap::SwapShared;

/// Channels [`Processor::process`] forwards to compiled code.
pub const MAX_CHANNELS: usize = 8;

/// Real-time half of the hot-swap channel.
///
/// Owned by exactly one audio thread. No method allocates, locks, blocks or
/// frees compiled code.
pub struct Processor {
    shared: Arc<SwapShared>,
    active: Box<Binding>,
    stream: Option<StreamConfig>,
    // A retired binding the channel had no room for.
    parked: Option<Box<Binding>>,
}

impl Processor {
    pub(super) fn new(shared: Arc<SwapShared>, active: Box<Binding>) -> Self {
        Self {
            shared,
            active,
            stream: None,
            parked: None,
        }
    }

    /// Start streaming. Runs the active setup hook and records `config` for
    /// bindings swapped in later. Returns `false` (and stays inactive) when
    /// the hook reports failure.
    pub fn activate(&mut self, sample_rate: f64, min_frames: u32, max_frames: u32) -> bool {
        if self.stream.is_some() {
            self.deactivate();
        }
        let config = StreamConfig {
            sample_rate,
            min_frames,
            max_frames,
        };
        let ok = self.active.setup(config);
        self.shared.last_setup_ok.store(ok, Ordering::Release);
        if ok {
            self.stream = Some(config);
        }
        ok
    }

    /// Stop streaming; runs the active teardown hook.
    pub fn deactivate(&mut self) {
        if self.stream.take().is_some() {
            self.active.teardown();
        }
    }

    pub fn is_activated(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.stream
    }

    pub fn generation(&self) -> u64 {
        self.active.generation()
    }

    pub fn swaps(&self) -> u64 {
        self.shared.swaps.load(Ordering::Acquire)
    }

    /// Process one block. Channels beyond [`MAX_CHANNELS`] are ignored and
    /// the frame count is the shortest buffer among the used channels.
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) {
        let channels = inputs.len().min(outputs.len()).min(MAX_CHANNELS);
        let frames = inputs[..channels]
            .iter()
            .map(|channel| channel.len())
            .chain(outputs[..channels].iter().map(|channel| channel.len()))
            .min()
            .unwrap_or(0);

        let mut input_ptrs = [ptr::null::<f32>(); MAX_CHANNELS];
        let mut output_ptrs = [ptr::null_mut::<f32>(); MAX_CHANNELS];
        for (slot, channel) in input_ptrs.iter_mut().zip(&inputs[..channels]) {
            *slot = channel.as_ptr();
        }
        for (slot, channel) in output_ptrs.iter_mut().zip(outputs[..channels].iter_mut()) {
            *slot = channel.as_mut_ptr();
        }

        // SAFETY: `channels` pointers in each array, each with `frames` samples.
        unsafe {
            self.process_raw(
                input_ptrs.as_ptr(),
                output_ptrs.as_ptr(),
                channels as u32,
                frames as u32,
            )
        }
    }

    /// Process one block from raw channel pointer arrays. Empty blocks only
    /// poll for a pending swap.
    ///
    /// # Safety
    ///
    /// `inputs` and `outputs` must each point to `channels` valid channel
    /// pointers of at least `frames` samples.
    pub unsafe fn process_raw(
        &mut self,
        inputs: *const *const f32,
        outputs: *const *mut f32,
        channels: u32,
        frames: u32,
    ) {
        self.poll_swap();
        if channels == 0 || frames == 0 {
            return;
        }
        // SAFETY: forwarded from the caller.
        unsafe { self.active.process(inputs, outputs, channels, frames) }
    }

    /// Adopt a staged binding, if any. Called at every block start.
    pub fn poll_swap(&mut self) -> bool {
        if self.shared.pending.load(Ordering::Acquire).is_null() {
            return false;
        }
        if !self.flush_parked() {
            return false;
        }

        let raw = self.shared.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if raw.is_null() {
            return false;
        }
        // SAFETY: the slot only ever holds pointers from `Box::into_raw`, and
        // the swap transferred ownership to this thread.
        let incoming = unsafe { Box::from_raw(raw) };

        self.shared.swapping.store(true, Ordering::Release);
        if self.stream.is_some() {
            self.active.teardown();
        }
        let outgoing = std::mem::replace(&mut self.active, incoming);
        if let Some(config) = self.stream {
            let ok = self.active.setup(config);
            self.shared.last_setup_ok.store(ok, Ordering::Release);
        }
        self.shared
            .active_generation
            .store(self.active.generation(), Ordering::Release);
        self.shared.swaps.fetch_add(1, Ordering::AcqRel);
        self.retire(outgoing);
        self.shared.swapping.store(false, Ordering::Release);
        true
    }

    /// Hand `binding` back to the control path, parking it if the channel is
    /// full.
    fn retire(&mut self, binding: Box<Binding>) {
        if let Err(err) = self.shared.retire_tx.try_send(binding) {
            self.parked = Some(err.into_inner());
        }
    }

    /// `true` once no retired binding is waiting for the channel.
    fn flush_parked(&mut self) -> bool {
        let Some(parked) = self.parked.take() else {
            return true;
        };
        match self.shared.retire_tx.try_send(parked) {
            Ok(()) => true,
            Err(TrySendError::Full(parked) | TrySendError::Disconnected(parked)) => {
                self.parked = Some(parked);
                false
            }
        }
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("generation", &self.active.generation())
            .field("stream", &self.stream)
            .field("parked", &self.parked.is_some())
            .finish()
    }
}
