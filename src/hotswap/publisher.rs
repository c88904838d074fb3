use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::dsp::Binding;
use crate::hotswap::{SwapShared, SwapState};

/// Proof that a compile was started. Consumed by
/// [`Publisher::stage`] or [`Publisher::abandon`].
#[derive(Debug)]
#[must_use = "a ticket must be staged or abandoned"]
pub struct CompileTicket {
    generation: u64,
}

impl CompileTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The binding is pending and will become active at the next block.
    Staged,
    /// A newer compile was staged first; the binding was dropped.
    Superseded,
}

/// Control-path half of the hot-swap channel. Shareable between threads.
pub struct Publisher {
    shared: Arc<SwapShared>,
    next_generation: AtomicU64,
}

impl Publisher {
    pub(super) fn new(shared: Arc<SwapShared>) -> Self {
        let current = shared.active_generation.load(Ordering::Acquire);
        Self {
            shared,
            next_generation: AtomicU64::new(current + 1),
        }
    }

    /// Start a compile. Generations increase monotonically across threads.
    pub fn begin(&self) -> CompileTicket {
        self.shared.compiling.fetch_add(1, Ordering::AcqRel);
        CompileTicket {
            generation: self.next_generation.fetch_add(1, Ordering::AcqRel),
        }
    }

    /// Publish a binding built for `ticket`.
    ///
    /// A binding older than the newest staged one is dropped here and
    /// reported as [`StageOutcome::Superseded`]. A staged binding that the
    /// real-time path never picked up is replaced and dropped here too.
    pub fn stage(&self, ticket: CompileTicket, binding: Binding) -> StageOutcome {
        self.collect_retired();

        let replaced = {
            let mut stage = self.shared.stage.lock();
            self.shared.compiling.fetch_sub(1, Ordering::AcqRel);
            if ticket.generation <= stage.latest_generation {
                debug!(
                    generation = ticket.generation,
                    latest = stage.latest_generation,
                    "dropping superseded binding"
                );
                None
            } else {
                stage.latest_generation = ticket.generation;
                let raw = Box::into_raw(Box::new(binding));
                Some(self.shared.pending.swap(raw, Ordering::AcqRel))
            }
        };

        match replaced {
            None => StageOutcome::Superseded,
            Some(previous) => {
                if !previous.is_null() {
                    // SAFETY: produced by `Box::into_raw` above and removed
                    // from the slot by the swap, so no one else owns it.
                    let previous = unsafe { Box::from_raw(previous) };
                    debug!(generation = previous.generation(), "replaced unclaimed binding");
                }
                debug!(generation = ticket.generation, "binding staged");
                StageOutcome::Staged
            }
        }
    }

    /// Give up on a compile; the active binding is untouched.
    pub fn abandon(&self, ticket: CompileTicket) {
        self.shared.compiling.fetch_sub(1, Ordering::AcqRel);
        debug!(generation = ticket.generation, "compile abandoned");
    }

    /// Drop bindings the real-time path has retired. Returns how many.
    pub fn collect_retired(&self) -> usize {
        let mut collected = 0;
        while let Ok(retired) = self.shared.retire_rx.try_recv() {
            debug!(generation = retired.generation(), "unloading retired binding");
            drop(retired);
            collected += 1;
        }
        collected
    }

    pub fn state(&self) -> SwapState {
        if self.shared.swapping.load(Ordering::Acquire) {
            SwapState::Swapping
        } else if !self.shared.pending.load(Ordering::Acquire).is_null() {
            SwapState::SwapReady
        } else if self.shared.compiling.load(Ordering::Acquire) > 0 {
            SwapState::Compiling
        } else {
            SwapState::Stable
        }
    }

    /// Generation of the newest binding staged so far, or of the initial
    /// binding before any stage.
    pub fn latest_staged_generation(&self) -> u64 {
        self.shared.stage.lock().latest_generation
    }

    /// Generation of the binding the real-time path is running.
    pub fn active_generation(&self) -> u64 {
        self.shared.active_generation.load(Ordering::Acquire)
    }

    /// Result of the setup hook run by the most recent swap or activation.
    pub fn last_setup_ok(&self) -> bool {
        self.shared.last_setup_ok.load(Ordering::Acquire)
    }

    pub fn swaps(&self) -> u64 {
        self.shared.swaps.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("state", &self.state())
            .field("active_generation", &self.active_generation())
            .finish()
    }
}
