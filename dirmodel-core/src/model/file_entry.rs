//! `src/model/file_entry.rs`
//! ============================================================================
//! # Per-File Metadata State
//!
//! One [`FileEntry`] per directory child (plus the directory's own
//! self-entry), owned exclusively by its directory. Each attribute class
//! keeps an up-to-date flag, an optional cached failure, and its result, so
//! observers can distinguish "still loading", "known failed" and "known
//! succeeded" without the scheduler retrying indefinitely.
//!
//! [`FileSnapshot`] is the immutable observer view handed out in change
//! events and ready-callback payloads.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytesize::ByteSize;
use chrono::{DateTime, Local, TimeZone};
use compact_str::CompactString;

use crate::fs::attributes::Request;
use crate::fs::decode::DecodedImage;
use crate::fs::provider::{EntryInfo, FileKind, FilesystemInfo, MountInfo};

/// Key of the directory's own self-entry in the file collection.
pub const SELF_ENTRY_NAME: &str = ".";

// ------------------------------------------------------------
// Per-class state records.
// ------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeepCountStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// Recursive aggregate statistics for a directory subtree, bounded to one
/// filesystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeepCounts {
    pub status: DeepCountStatus,
    pub directory_count: u64,
    pub file_count: u64,
    pub unreadable_count: u64,
    pub total_size: u64,
    pub on_disk_size: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LinkState {
    pub up_to_date: bool,
    pub failed: Option<ErrorKind>,
    /// Display-name override; only honored for trusted links.
    pub display_name: Option<CompactString>,
    /// Custom icon; only honored for trusted links.
    pub icon_name: Option<CompactString>,
    pub activation_uri: Option<CompactString>,
    pub is_launcher: bool,
    pub is_trusted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShallowCountState {
    pub up_to_date: bool,
    pub failed: Option<ErrorKind>,
    /// `None` for non-directories (count not applicable).
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct MimeListState {
    pub up_to_date: bool,
    pub failed: Option<ErrorKind>,
    /// Distinct content types of immediate children, unordered.
    pub types: Vec<CompactString>,
}

#[derive(Debug, Clone, Default)]
pub struct TopLeftState {
    pub up_to_date: bool,
    pub large_up_to_date: bool,
    pub failed: Option<ErrorKind>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ThumbnailState {
    pub up_to_date: bool,
    pub failed: Option<ErrorKind>,
    pub image: Option<Arc<DecodedImage>>,
    /// True when the decode came from the original file rather than the
    /// thumbnail cache; such images skip the stale-mtime check.
    pub from_original: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MountState {
    pub up_to_date: bool,
    pub mount: Option<MountInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct FilesystemState {
    pub up_to_date: bool,
    pub failed: Option<ErrorKind>,
    pub info: Option<FilesystemInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionState {
    pub done: bool,
    pub attributes: Vec<(CompactString, CompactString)>,
}

// ------------------------------------------------------------
// FileEntry – the mutable record owned by one directory.
// ------------------------------------------------------------

#[derive(Debug)]
pub struct FileEntry {
    pub name: CompactString,
    pub path: Arc<PathBuf>,
    pub is_self: bool,

    /// True while a reload is in progress and the file has not been
    /// re-seen; presumed gone if still set when the reload completes.
    pub unconfirmed: bool,
    /// An added event has been emitted for this file.
    pub is_added: bool,
    /// Entity disappeared; removed from the directory on the next sweep.
    pub is_gone: bool,

    pub info: Option<EntryInfo>,
    pub info_up_to_date: bool,
    pub info_failed: Option<ErrorKind>,

    pub link: LinkState,
    pub directory_count: ShallowCountState,
    pub deep_counts: DeepCounts,
    pub mime_list: MimeListState,
    pub top_left: TopLeftState,
    pub thumbnail: ThumbnailState,
    pub mount: MountState,
    pub filesystem: FilesystemState,
    pub extension: ExtensionState,
}

impl FileEntry {
    #[must_use]
    pub fn new(name: &str, directory_location: &Arc<PathBuf>) -> Self {
        Self::build(name, Arc::new(directory_location.join(name)), false)
    }

    /// The directory's own entry; its path is the directory location.
    #[must_use]
    pub fn new_self(location: Arc<PathBuf>) -> Self {
        Self::build(SELF_ENTRY_NAME, location, true)
    }

    fn build(name: &str, path: Arc<PathBuf>, is_self: bool) -> Self {
        Self {
            name: CompactString::new(name),
            path,
            is_self,
            unconfirmed: false,
            is_added: false,
            is_gone: false,
            info: None,
            info_up_to_date: false,
            info_failed: None,
            link: LinkState::default(),
            directory_count: ShallowCountState::default(),
            deep_counts: DeepCounts::default(),
            mime_list: MimeListState::default(),
            top_left: TopLeftState::default(),
            thumbnail: ThumbnailState::default(),
            mount: MountState::default(),
            filesystem: FilesystemState::default(),
            extension: ExtensionState::default(),
        }
    }

    /// Store a fresh stat result.
    pub fn apply_info(&mut self, info: EntryInfo) {
        self.info = Some(info);
        self.info_up_to_date = true;
        self.info_failed = None;
        self.unconfirmed = false;
    }

    /// Entity disappeared: clear cached data and schedule removal.
    pub fn mark_gone(&mut self) {
        self.is_gone = true;
        self.info = None;
        self.info_up_to_date = true;
        self.info_failed = Some(ErrorKind::NotFound);
        self.link = LinkState::default();
        self.directory_count = ShallowCountState::default();
        self.deep_counts = DeepCounts::default();
        self.mime_list = MimeListState::default();
        self.top_left = TopLeftState::default();
        self.thumbnail = ThumbnailState::default();
        self.mount = MountState::default();
        self.filesystem = FilesystemState::default();
    }

    /// Drop up-to-date state for every class the request names, so the
    /// scheduler re-fetches it.
    pub fn invalidate(&mut self, request: Request) {
        if request.intersects(Request::FILE_INFO) {
            self.info_up_to_date = false;
            self.info_failed = None;
        }
        if request.intersects(Request::LINK_INFO) {
            self.link = LinkState::default();
        }
        if request.intersects(Request::DIRECTORY_COUNT) {
            self.directory_count = ShallowCountState::default();
        }
        if request.intersects(Request::DEEP_COUNT) {
            self.deep_counts = DeepCounts::default();
        }
        if request.intersects(Request::MIME_LIST) {
            self.mime_list = MimeListState::default();
        }
        if request.intersects(Request::TOP_LEFT_TEXT | Request::LARGE_TOP_LEFT_TEXT) {
            self.top_left = TopLeftState::default();
        }
        if request.intersects(Request::THUMBNAIL) {
            self.thumbnail = ThumbnailState::default();
        }
        if request.intersects(Request::MOUNT) {
            self.mount = MountState::default();
        }
        if request.intersects(Request::FILESYSTEM_INFO) {
            self.filesystem = FilesystemState::default();
        }
        if request.intersects(Request::EXTENSION_INFO) {
            self.extension = ExtensionState::default();
        }
    }

    /// Whether every per-file type in `request` has reached a terminal
    /// (succeeded or known-failed) state. FILE_LIST is a directory-level
    /// concern and is ignored here.
    #[must_use]
    pub fn satisfies(&self, request: Request) -> bool {
        if self.is_gone {
            return true;
        }
        if request.intersects(Request::FILE_INFO) && !self.info_up_to_date {
            return false;
        }
        if request.intersects(Request::LINK_INFO) && !self.link.up_to_date {
            return false;
        }
        if request.intersects(Request::DIRECTORY_COUNT) && !self.directory_count.up_to_date {
            return false;
        }
        if request.intersects(Request::DEEP_COUNT) && self.deep_counts.status != DeepCountStatus::Done
        {
            return false;
        }
        if request.intersects(Request::MIME_LIST) && !self.mime_list.up_to_date {
            return false;
        }
        if request.intersects(Request::TOP_LEFT_TEXT) && !self.top_left.up_to_date {
            return false;
        }
        if request.intersects(Request::LARGE_TOP_LEFT_TEXT) && !self.top_left.large_up_to_date {
            return false;
        }
        if request.intersects(Request::THUMBNAIL) && !self.thumbnail.up_to_date {
            return false;
        }
        if request.intersects(Request::MOUNT) && !self.mount.up_to_date {
            return false;
        }
        if request.intersects(Request::FILESYSTEM_INFO) && !self.filesystem.up_to_date {
            return false;
        }
        if request.intersects(Request::EXTENSION_INFO) && !self.extension.done {
            return false;
        }
        true
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<FileKind> {
        self.info.as_ref().map(|i| i.kind)
    }

    /// Hidden per stat info when available, name heuristic otherwise.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.info
            .as_ref()
            .map_or_else(|| self.name.starts_with('.'), |i| i.is_hidden)
    }

    #[must_use]
    pub fn is_backup(&self) -> bool {
        self.info
            .as_ref()
            .map_or_else(|| self.name.ends_with('~'), |i| i.is_backup)
    }

    /// Immutable copy of the fields fetch tasks need, taken under the
    /// directory lock so the task never touches shared state.
    #[must_use]
    pub fn seed(&self) -> FileSeed {
        FileSeed {
            name: self.name.clone(),
            path: self.path.clone(),
            kind: self.kind(),
            size: self.info.as_ref().map_or(0, |i| i.size),
            modified: self.info.as_ref().map(|i| i.modified),
            mime_type: self.info.as_ref().and_then(|i| i.mime_type.clone()),
            is_executable: self.info.as_ref().is_some_and(|i| i.is_executable),
            symlink_target: self.info.as_ref().and_then(|i| i.symlink_target.clone()),
            thumbnail_path: self.info.as_ref().and_then(|i| i.thumbnail_path.clone()),
            is_mountpoint: self.info.as_ref().is_some_and(|i| i.is_mountpoint),
            filesystem_id: self.info.as_ref().map(|i| i.filesystem_id.clone()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            name: self.name.clone(),
            path: self.path.clone(),
            is_gone: self.is_gone,
            info: self.info.clone(),
            link: self.link.clone(),
            directory_count: self.directory_count.count,
            deep_counts: self.deep_counts,
            mime_list: self.mime_list.types.clone(),
            top_left_text: self.top_left.text.clone(),
            thumbnail: self.thumbnail.image.clone(),
            mount: self.mount.mount.clone(),
            filesystem: self.filesystem.info,
            extension_attributes: self.extension.attributes.clone(),
        }
    }
}

// ------------------------------------------------------------
// FileSeed – per-fetch input cloned out of the entry.
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSeed {
    pub name: CompactString,
    pub path: Arc<PathBuf>,
    pub kind: Option<FileKind>,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub mime_type: Option<CompactString>,
    pub is_executable: bool,
    pub symlink_target: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub is_mountpoint: bool,
    pub filesystem_id: Option<CompactString>,
}

// ------------------------------------------------------------
// FileSnapshot – the observer view.
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub name: CompactString,
    pub path: Arc<PathBuf>,
    pub is_gone: bool,
    pub info: Option<EntryInfo>,
    pub link: LinkState,
    pub directory_count: Option<u64>,
    pub deep_counts: DeepCounts,
    pub mime_list: Vec<CompactString>,
    pub top_left_text: Option<String>,
    pub thumbnail: Option<Arc<DecodedImage>>,
    pub mount: Option<MountInfo>,
    pub filesystem: Option<FilesystemInfo>,
    pub extension_attributes: Vec<(CompactString, CompactString)>,
}

impl FileSnapshot {
    // Human-readable size string.
    #[inline]
    #[must_use]
    pub fn size_human(&self) -> String {
        ByteSize::b(self.info.as_ref().map_or(0, |i| i.size)).to_string()
    }

    // Format the modification date.
    #[expect(clippy::cast_possible_wrap, reason = "Expected")]
    #[must_use]
    pub fn format_date(&self, fmt: &str) -> String {
        let modified = self
            .info
            .as_ref()
            .map_or(UNIX_EPOCH, |i| i.modified);

        let dur: Duration = modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));

        let dt: DateTime<Local> = Local
            .timestamp_opt(dur.as_secs() as i64, dur.subsec_nanos())
            .single()
            .unwrap_or_else(Local::now);

        dt.format(fmt).to_string()
    }

    /// Display name, honoring a trusted link's override.
    #[must_use]
    pub fn display_name(&self) -> CompactString {
        if self.link.is_trusted {
            if let Some(name) = &self.link.display_name {
                return name.clone();
            }
        }
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir_location() -> Arc<PathBuf> {
        Arc::new(PathBuf::from("/data"))
    }

    #[test]
    fn test_satisfies_tracks_per_class_flags() {
        let mut file = FileEntry::new("a.txt", &dir_location());
        assert!(!file.satisfies(Request::FILE_INFO));

        file.apply_info(EntryInfo::new("a.txt", FileKind::File));
        assert!(file.satisfies(Request::FILE_INFO));
        assert!(!file.satisfies(Request::FILE_INFO | Request::THUMBNAIL));

        file.thumbnail.up_to_date = true;
        assert!(file.satisfies(Request::FILE_INFO | Request::THUMBNAIL));
    }

    #[test]
    fn test_known_failure_still_satisfies() {
        // A cached failure is terminal: up-to-date stays set so the
        // scheduler does not retry until an explicit reload.
        let mut file = FileEntry::new("a.txt", &dir_location());
        file.info_up_to_date = true;
        file.info_failed = Some(ErrorKind::PermissionDenied);
        assert!(file.satisfies(Request::FILE_INFO));
    }

    #[test]
    fn test_invalidate_clears_only_named_classes() {
        let mut file = FileEntry::new("a.txt", &dir_location());
        file.apply_info(EntryInfo::new("a.txt", FileKind::File));
        file.thumbnail.up_to_date = true;
        file.mime_list.up_to_date = true;

        file.invalidate(Request::THUMBNAIL);

        assert!(!file.thumbnail.up_to_date);
        assert!(file.info_up_to_date);
        assert!(file.mime_list.up_to_date);
    }

    #[test]
    fn test_mark_gone_clears_data() {
        let mut file = FileEntry::new("a.txt", &dir_location());
        file.apply_info(EntryInfo::new("a.txt", FileKind::File));
        file.mark_gone();

        assert!(file.is_gone);
        assert!(file.info.is_none());
        assert_eq!(file.info_failed, Some(ErrorKind::NotFound));
        // Gone files satisfy everything so pending callbacks can resolve.
        assert!(file.satisfies(Request::all()));
    }

    #[test]
    fn test_untrusted_link_has_no_display_override() {
        let mut file = FileEntry::new("app.desktop", &dir_location());
        file.link.display_name = Some("Fancy".into());
        file.link.is_trusted = false;

        assert_eq!(file.snapshot().display_name(), "app.desktop");

        file.link.is_trusted = true;
        assert_eq!(file.snapshot().display_name(), "Fancy");
    }
}
