//! `src/sched/fetch.rs`
//! ============================================================================
//! # Generic Fetcher Abstraction
//!
//! The original design calls for near-identical stop/start/cancel machinery
//! per metadata class. Here a single [`FetchClass`] trait carries the
//! class-specific pieces (missing-predicate, synchronous short-circuit,
//! start operation, apply-result operation) while the driver owns the
//! shared lifecycle: stopped → (needy ∧ admitted) → in-flight → apply →
//! stopped, with cancellation at any point.
//!
//! Per (directory, class) there is exactly one in-flight slot; the `seq`
//! stamp lets a completion detect that its slot was cancelled and reused
//! while it ran.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use compact_str::CompactString;
use enum_map::Enum;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::SettingsData;
use crate::error::CoreError;
use crate::fs::attributes::Request;
use crate::fs::decode::ThumbnailDecoder;
use crate::fs::provider::FsProvider;
use crate::model::directory::Directory;
use crate::model::file_entry::{FileEntry, FileSeed, FileSnapshot};
use crate::plugins::ProviderRegistry;
use crate::sched::queues::QueueBand;

// ------------------------------------------------------------
// Fetch classes.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub(crate) enum FetchKind {
    FileInfo,
    LinkInfo,
    DirectoryCount,
    DeepCount,
    MimeList,
    TopLeftText,
    Thumbnail,
    Mount,
    FilesystemInfo,
    Extension,
}

impl FetchKind {
    pub const ALL: [Self; 10] = [
        Self::FileInfo,
        Self::LinkInfo,
        Self::DirectoryCount,
        Self::DeepCount,
        Self::MimeList,
        Self::TopLeftText,
        Self::Thumbnail,
        Self::Mount,
        Self::FilesystemInfo,
        Self::Extension,
    ];

    /// Admission / tracing label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::FileInfo => "file-info",
            Self::LinkInfo => "link-info",
            Self::DirectoryCount => "directory-count",
            Self::DeepCount => "deep-count",
            Self::MimeList => "mime-list",
            Self::TopLeftText => "top-left-text",
            Self::Thumbnail => "thumbnail",
            Self::Mount => "mount",
            Self::FilesystemInfo => "filesystem-info",
            Self::Extension => "extension-info",
        }
    }

    /// Which work-queue band feeds this class.
    #[must_use]
    pub const fn band(self) -> QueueBand {
        match self {
            Self::FileInfo | Self::LinkInfo => QueueBand::High,
            Self::Extension => QueueBand::Extension,
            _ => QueueBand::Low,
        }
    }

    /// The request bits this class serves.
    #[must_use]
    pub const fn request(self) -> Request {
        match self {
            Self::FileInfo => Request::FILE_INFO,
            Self::LinkInfo => Request::LINK_INFO,
            Self::DirectoryCount => Request::DIRECTORY_COUNT,
            Self::DeepCount => Request::DEEP_COUNT,
            Self::MimeList => Request::MIME_LIST,
            Self::TopLeftText => Request::TOP_LEFT_TEXT.union(Request::LARGE_TOP_LEFT_TEXT),
            Self::Thumbnail => Request::THUMBNAIL,
            Self::Mount => Request::MOUNT,
            Self::FilesystemInfo => Request::FILESYSTEM_INFO,
            Self::Extension => Request::EXTENSION_INFO,
        }
    }
}

// ------------------------------------------------------------
// In-flight slot state.
// ------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct InFlightFetch {
    pub file: CompactString,
    pub token: CancellationToken,
    /// Stamp for completion/slot matching across cancellation.
    pub seq: u64,
}

// ------------------------------------------------------------
// Fetch outcomes.
// ------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum FetchError {
    /// Never surfaced to observers; the slot is cleared silently.
    Cancelled,
    /// Entity disappeared; the file is marked gone, not failed.
    NotFound,
    /// Terminal for this fetch cycle; cached on the file entry.
    Failed(std::io::ErrorKind),
}

impl From<CoreError> for FetchError {
    fn from(e: CoreError) -> Self {
        if e.is_cancelled() {
            Self::Cancelled
        } else if e.is_not_found() {
            Self::NotFound
        } else {
            Self::Failed(e.kind())
        }
    }
}

pub(crate) type FetchResult<T> = Result<T, FetchError>;

// ------------------------------------------------------------
// Context handed to a fetch task.
// ------------------------------------------------------------

/// Everything a fetch task may touch. Cloned out of the directory under its
/// lock; the task itself never holds shared state, only a weak
/// back-reference for progress reporting.
pub(crate) struct FetchCtx {
    pub dir: Weak<Directory>,
    pub location: Arc<PathBuf>,
    pub provider: Arc<dyn FsProvider>,
    pub decoder: Arc<dyn ThumbnailDecoder>,
    pub plugins: Arc<ProviderRegistry>,
    pub settings: SettingsData,
    pub token: CancellationToken,
    pub seq: u64,
    pub seed: FileSeed,
    pub snapshot: FileSnapshot,
    /// Union of the requests wanting this file, for classes whose behavior
    /// depends on exactly what was asked (e.g. large leading-text caps).
    pub wants: Request,
}

// ------------------------------------------------------------
// The per-class plug-in trait.
// ------------------------------------------------------------

pub(crate) trait FetchClass: 'static {
    const KIND: FetchKind;
    type Output: Send + 'static;

    /// The class-specific missing-predicate: true while the file still
    /// lacks terminal data for this class.
    fn is_missing(file: &FileEntry, wants: Request) -> bool;

    /// Classes depending on base stat info return false until it arrived.
    fn ready(file: &FileEntry) -> bool {
        let _ = file;
        true
    }

    /// Resolve files the class does not apply to without issuing I/O.
    /// Returns true when the entry was finalized in place.
    fn short_circuit(file: &mut FileEntry, wants: Request) -> bool {
        let _ = (file, wants);
        false
    }

    /// The asynchronous fetch operation.
    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<Self::Output>>;

    /// Write the completed result into the entry and set terminal flags.
    /// Never sees `FetchError::Cancelled`.
    fn apply(file: &mut FileEntry, out: FetchResult<Self::Output>);
}
