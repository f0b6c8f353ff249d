//! Collaborators that observe the engine: shift listeners, warning sinks and event counters.
use log::warn;
use std::cell::Cell;

/// Observer for changes to the layout of the shared coefficient vector.
///
/// External mirrors of the coefficient vector (for instance visualization buffers indexed
/// the same way) implement this to stay aligned with it. All methods default to no-ops.
pub trait NumberShiftListener {
    /// The coefficient vector now has `new_size` entries.
    fn note_change_size(&self, _new_size: usize) {}

    /// `size` entries were moved from offset `orig` to offset `dest`.
    ///
    /// The slab allocator never relocates live slots, and particle moves only release the
    /// destination slots (reported through [`note_reset`](Self::note_reset)), so this is only
    /// invoked by callers that compact or mirror the coefficient vector themselves.
    fn note_move(&self, _orig: usize, _dest: usize, _size: usize) {}

    /// The `size` entries starting at `start` no longer hold meaningful data.
    fn note_reset(&self, _start: usize, _size: usize) {}
}

/// Receiver for non-fatal diagnostics raised by the engine.
pub trait WarningSink {
    fn note_warning(&self, message: &str);
}

/// Forwards warnings to the `log` facade.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogWarnings;

impl WarningSink for LogWarnings {
    fn note_warning(&self, message: &str) {
        warn!("{}", message);
    }
}

pub(crate) static LOG_WARNINGS: LogWarnings = LogWarnings;

/// Counts occurrences of an event, e.g. element activations.
#[derive(Debug, Default, Clone)]
pub struct EventCounter {
    count: Cell<usize>,
}

impl EventCounter {
    pub fn tick(&self) {
        self.count.set(self.count.get() + 1);
    }

    pub fn get(&self) -> usize {
        self.count.get()
    }

    /// Returns the current count and resets it to zero.
    pub fn pop(&self) -> usize {
        self.count.replace(0)
    }
}
