//! `src/fs/provider.rs`
//! ============================================================================
//! # Abstract Async Filesystem Provider
//!
//! The directory model never touches the filesystem directly; it talks to an
//! [`FsProvider`]. Production code uses [`crate::fs::local::LocalProvider`];
//! scheduler tests use a simulated provider with controllable completion.
//!
//! All async operations take a [`CancellationToken`]; a cancelled operation
//! resolves to [`CoreError::Cancelled`] and its partial output is discarded
//! by the caller.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use compact_str::CompactString;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};

// ------------------------------------------------------------
// FileKind – coarse classification of a directory child.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// A mountable entity (e.g. a volume entry) rather than plain content.
    Mountable,
    Special,
}

impl FileKind {
    #[inline]
    #[must_use]
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }
}

// ------------------------------------------------------------
// EntryInfo – everything one stat-level query yields.
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: CompactString,
    pub kind: FileKind,

    pub size: u64,
    pub allocated_size: u64,
    pub modified: SystemTime,

    pub is_executable: bool,
    pub is_hidden: bool,
    pub is_backup: bool,

    /// Content type, lowercase, when the provider can classify it.
    pub mime_type: Option<CompactString>,

    /// Inode number; used for hard-link suppression in deep counts.
    pub inode: u64,
    /// Filesystem identity; deep counts never cross a boundary.
    pub filesystem_id: CompactString,

    pub symlink_target: Option<PathBuf>,
    /// Path of a cached thumbnail image, when one exists.
    pub thumbnail_path: Option<PathBuf>,
    pub is_mountpoint: bool,
}

impl EntryInfo {
    /// Minimal entry for construction in providers and tests; callers fill
    /// in the fields they care about.
    #[must_use]
    pub fn new(name: &str, kind: FileKind) -> Self {
        Self {
            name: CompactString::new(name),
            kind,
            size: 0,
            allocated_size: 0,
            modified: SystemTime::UNIX_EPOCH,
            is_executable: false,
            is_hidden: name.starts_with('.'),
            is_backup: name.ends_with('~'),
            mime_type: None,
            inode: 0,
            filesystem_id: CompactString::const_new("fs0"),
            symlink_target: None,
            thumbnail_path: None,
            is_mountpoint: false,
        }
    }
}

// ------------------------------------------------------------
// Filesystem-level info and mounts.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilesystemInfo {
    pub read_only: bool,
    pub use_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub name: CompactString,
    /// Root location of the mounted filesystem.
    pub root: PathBuf,
    /// Location that activates this mount, for mountable entries.
    pub activation_root: Option<PathBuf>,
    /// Shadowed mounts are skipped during resolution.
    pub is_shadowed: bool,
}

/// Stream of enumerated entries. Per-entry errors flow inline; the stream
/// ends when the sender side is dropped.
pub type EntryStream = mpsc::UnboundedReceiver<CoreResult<EntryInfo>>;

// ------------------------------------------------------------
// FsProvider – the async I/O seam.
// ------------------------------------------------------------

#[async_trait]
pub trait FsProvider: Send + Sync + 'static {
    /// Enumerate the immediate children of `location`.
    async fn enumerate(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<EntryStream>;

    /// Query stat-level attributes for a single location.
    async fn query_info(&self, location: &Path, token: CancellationToken)
    -> CoreResult<EntryInfo>;

    /// Query read-only / preview flags for the filesystem containing
    /// `location`.
    async fn query_filesystem_info(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<FilesystemInfo>;

    /// Load the full contents of a file.
    async fn load_contents(&self, location: &Path, token: CancellationToken)
    -> CoreResult<Vec<u8>>;

    /// Load at most `max_bytes` from the start of a file.
    async fn load_partial_contents(
        &self,
        location: &Path,
        max_bytes: usize,
        token: CancellationToken,
    ) -> CoreResult<Vec<u8>>;

    /// Synchronous contents read. Only used by the opt-in link-content fast
    /// path for local non-directory files; disabled by default.
    fn load_contents_sync(&self, location: &Path) -> CoreResult<Vec<u8>>;

    /// Resolve the mount containing `location`, if any.
    async fn find_enclosing_mount(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<Option<MountInfo>>;

    /// Snapshot of the live mount list.
    fn list_mounts(&self) -> Vec<MountInfo>;
}

/// Race a future against a cancellation token.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl std::future::Future<Output = CoreResult<T>>,
) -> CoreResult<T> {
    tokio::select! {
        () = token.cancelled() => Err(CoreError::Cancelled),
        out = fut => out,
    }
}
