//! `src/sched/queues.rs`
//! ============================================================================
//! # File Work Queues
//!
//! Three insertion-ordered FIFO sets of file names awaiting attribute
//! fetches. High priority feeds the stat-level classes (file-info,
//! link-info); low priority feeds the count/mime/text/thumbnail/mount/
//! filesystem classes; the extension queue feeds third-party providers.
//!
//! A file that finishes its high-priority work is promoted to the low
//! queue, then to the extension queue, then dropped entirely. Enqueue is
//! idempotent; removal is safe when absent.

use compact_str::CompactString;
use indexmap::IndexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueBand {
    High,
    Low,
    Extension,
}

#[derive(Debug, Default)]
pub(crate) struct WorkQueues {
    high: IndexSet<CompactString>,
    low: IndexSet<CompactString>,
    extension: IndexSet<CompactString>,
}

impl WorkQueues {
    fn band(&self, band: QueueBand) -> &IndexSet<CompactString> {
        match band {
            QueueBand::High => &self.high,
            QueueBand::Low => &self.low,
            QueueBand::Extension => &self.extension,
        }
    }

    fn band_mut(&mut self, band: QueueBand) -> &mut IndexSet<CompactString> {
        match band {
            QueueBand::High => &mut self.high,
            QueueBand::Low => &mut self.low,
            QueueBand::Extension => &mut self.extension,
        }
    }

    /// Put a file back at the start of the pipeline. Drops any stale
    /// membership in later bands so re-validated files redo the full pass.
    /// Returns true when membership actually changed.
    pub fn enqueue_high(&mut self, name: &CompactString) -> bool {
        let dropped_low = self.low.shift_remove(name);
        let dropped_ext = self.extension.shift_remove(name);
        let inserted = self.high.insert(name.clone());
        inserted || dropped_low || dropped_ext
    }

    /// Move a file from one band to the next. No-op when it is not in
    /// `from`.
    pub fn promote(&mut self, name: &CompactString, from: QueueBand, to: QueueBand) -> bool {
        if !self.band_mut(from).shift_remove(name) {
            return false;
        }
        self.band_mut(to).insert(name.clone());
        true
    }

    /// Drop a file from whichever band holds it, if any.
    pub fn drop_from(&mut self, name: &CompactString, band: QueueBand) -> bool {
        self.band_mut(band).shift_remove(name)
    }

    /// Remove a file from every band. Safe to call when absent.
    pub fn remove(&mut self, name: &CompactString) {
        self.high.shift_remove(name);
        self.low.shift_remove(name);
        self.extension.shift_remove(name);
    }

    /// Head of a band without removing it.
    pub fn head(&self, band: QueueBand) -> Option<&CompactString> {
        self.band(band).first()
    }

    /// Band members in queue order.
    pub fn iter(&self, band: QueueBand) -> impl Iterator<Item = &CompactString> {
        self.band(band).iter()
    }

    pub fn contains(&self, band: QueueBand, name: &CompactString) -> bool {
        self.band(band).contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty() && self.extension.is_empty()
    }
}
