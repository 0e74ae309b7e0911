//! `src/model/monitor.rs`
//! ============================================================================
//! # Monitors and Ready-Callbacks
//!
//! Two subscription flavors drive the scheduler:
//!
//! * [`Monitor`] – persistent; keeps the requested attributes fresh and
//!   receives change events until explicitly removed. One monitor per
//!   (client, file) pair; adding again replaces.
//! * [`ReadyCallback`] – one-shot; fires once its request is satisfied for
//!   its file (or for the whole listing), then is removed.
//!
//! Per-request-type counters are maintained incrementally on add/remove so
//! "does anyone want X" never scans the subscription lists.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};

use compact_str::CompactString;
use enum_map::EnumMap;
use tokio::sync::mpsc;

use crate::fs::attributes::{Request, RequestType};
use crate::model::file_entry::FileSnapshot;

// ------------------------------------------------------------
// Identities.
// ------------------------------------------------------------

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of a subscribing client, used for replace-on-add monitor
/// semantics and duplicate-callback detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl ClientId {
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CLIENT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle identifying one ready-callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(pub u64);

impl CallbackHandle {
    #[must_use]
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

// ------------------------------------------------------------
// Events delivered to monitors.
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    FilesAdded(Vec<FileSnapshot>),
    FilesChanged(Vec<FileSnapshot>),
    DoneLoading,
    LoadError {
        kind: ErrorKind,
        message: CompactString,
    },
}

pub type EventSender = mpsc::UnboundedSender<DirectoryEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DirectoryEvent>;

// ------------------------------------------------------------
// Subscription records.
// ------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Monitor {
    pub client: ClientId,
    /// `None` watches the whole listing.
    pub file: Option<CompactString>,
    pub watch_hidden: bool,
    pub request: Request,
    pub events: EventSender,
}

/// Payload handed to a ready-callback when it fires.
#[derive(Debug, Clone, Default)]
pub struct ReadyPayload {
    /// Present for file-scoped callbacks whose file still exists.
    pub file: Option<FileSnapshot>,
    /// Current listing for directory-scoped callbacks.
    pub files: Vec<FileSnapshot>,
}

pub type ReadyFn = Box<dyn FnOnce(ReadyPayload) + Send + 'static>;

pub(crate) struct ReadyCallback {
    pub handle: CallbackHandle,
    pub client: ClientId,
    pub file: Option<CompactString>,
    pub request: Request,
    /// Flipped to false once satisfied; delivery then drains the entry.
    pub active: bool,
    /// `None` registrations only trigger loading, nothing is invoked.
    pub callback: Option<ReadyFn>,
}

impl std::fmt::Debug for ReadyCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyCallback")
            .field("handle", &self.handle)
            .field("client", &self.client)
            .field("file", &self.file)
            .field("request", &self.request)
            .field("active", &self.active)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

// ------------------------------------------------------------
// Incremental request-type counters.
// ------------------------------------------------------------

pub(crate) type RequestCounts = EnumMap<RequestType, u32>;

pub(crate) fn counts_add(counts: &mut RequestCounts, request: Request) {
    for ty in request.types() {
        counts[ty] += 1;
    }
}

pub(crate) fn counts_remove(counts: &mut RequestCounts, request: Request) {
    for ty in request.types() {
        debug_assert!(counts[ty] > 0, "request counter underflow for {ty:?}");
        counts[ty] = counts[ty].saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::attributes::{FileAttributes, attributes_to_request};

    #[test]
    fn test_counts_add_remove_symmetry() {
        let mut counts = RequestCounts::default();
        let req = attributes_to_request(FileAttributes::THUMBNAIL | FileAttributes::DEEP_COUNTS);

        counts_add(&mut counts, req);
        assert_eq!(counts[RequestType::Thumbnail], 1);
        assert_eq!(counts[RequestType::FileInfo], 1); // implied
        assert_eq!(counts[RequestType::DeepCount], 1);
        assert_eq!(counts[RequestType::Mount], 0);

        counts_remove(&mut counts, req);
        assert!(counts.values().all(|&c| c == 0));
    }
}
