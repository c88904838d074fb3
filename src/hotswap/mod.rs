//! Lock-free hand-over of bindings from the control path to the real-time
//! path.
//!
//! The control half ([`Publisher`]) stages a fully built binding in a single
//! atomic slot. The real-time half ([`Processor`]) checks the slot once per
//! block and swaps at the block boundary. Replaced bindings travel back over
//! a bounded channel so that code is only ever unloaded on the control side.

mod processor;
mod publisher;

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

use crate::dsp::Binding;

pub use processor::{MAX_CHANNELS, Processor};
pub use publisher::{CompileTicket, Publisher, StageOutcome};

/// Retired bindings the real-time path may hand back before it has to
/// postpone further swaps.
pub const RETIRE_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// No compile outstanding, nothing staged.
    Stable,
    /// At least one compile ticket is outstanding.
    Compiling,
    /// A binding is staged and will be picked up at the next block.
    SwapReady,
    /// The real-time path is exchanging bindings right now.
    Swapping,
}

#[derive(Debug, Default)]
struct StageState {
    latest_generation: u64,
}

struct SwapShared {
    pending: CachePadded<AtomicPtr<Binding>>,
    retire_tx: Sender<Box<Binding>>,
    retire_rx: Receiver<Box<Binding>>,
    compiling: AtomicUsize,
    swapping: AtomicBool,
    last_setup_ok: AtomicBool,
    active_generation: AtomicU64,
    swaps: AtomicU64,
    stage: Mutex<StageState>,
}

impl SwapShared {
    fn new(initial_generation: u64) -> Self {
        let (retire_tx, retire_rx) = bounded(RETIRE_CAPACITY);
        Self {
            pending: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            retire_tx,
            retire_rx,
            compiling: AtomicUsize::new(0),
            swapping: AtomicBool::new(false),
            last_setup_ok: AtomicBool::new(true),
            active_generation: AtomicU64::new(initial_generation),
            swaps: AtomicU64::new(0),
            stage: Mutex::new(StageState {
                latest_generation: initial_generation,
            }),
        }
    }
}

impl Drop for SwapShared {
    fn drop(&mut self) {
        let pending = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if !pending.is_null() {
            // SAFETY: the slot only ever holds pointers from `Box::into_raw`.
            drop(unsafe { Box::from_raw(pending) });
        }
    }
}

/// Split `initial` into a publisher/processor pair. The processor owns
/// `initial` as its active binding.
pub fn channel(initial: Binding) -> (Publisher, Processor) {
    let shared = Arc::new(SwapShared::new(initial.generation()));
    let publisher = Publisher::new(Arc::clone(&shared));
    let processor = Processor::new(shared, Box::new(initial));
    (publisher, processor)
}

#[cfg(test)]
mod tests;
