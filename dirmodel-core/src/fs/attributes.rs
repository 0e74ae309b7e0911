//! `src/fs/attributes.rs`
//! ============================================================================
//! # Attribute Sets and the Attribute→Request Translator
//!
//! Consumers ask for metadata in terms of [`FileAttributes`]. Internally the
//! scheduler works on [`Request`] bitsets, which add the FILE_LIST
//! pseudo-type ("the directory listing itself is wanted") and fold in the
//! prerequisite implications: link info, leading text, thumbnails and mount
//! resolution all require base stat info first, so requesting any of them
//! also requests FILE_INFO.

use bitflags::bitflags;
use enum_map::Enum;

bitflags! {
    /// Metadata classes a consumer can request about a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u16 {
        const FILE_INFO                 = 1 << 0;
        const LINK_INFO                 = 1 << 1;
        const DEEP_COUNTS               = 1 << 2;
        const DIRECTORY_ITEM_COUNT      = 1 << 3;
        const DIRECTORY_ITEM_MIME_TYPES = 1 << 4;
        const TOP_LEFT_TEXT             = 1 << 5;
        const LARGE_TOP_LEFT_TEXT       = 1 << 6;
        const EXTENSION_INFO            = 1 << 7;
        const THUMBNAIL                 = 1 << 8;
        const MOUNT                     = 1 << 9;
        const FILESYSTEM_INFO           = 1 << 10;
    }
}

bitflags! {
    /// Internal request bitset derived from [`FileAttributes`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Request: u16 {
        const FILE_INFO           = 1 << 0;
        const LINK_INFO           = 1 << 1;
        const DEEP_COUNT          = 1 << 2;
        const DIRECTORY_COUNT     = 1 << 3;
        const MIME_LIST           = 1 << 4;
        const TOP_LEFT_TEXT       = 1 << 5;
        const LARGE_TOP_LEFT_TEXT = 1 << 6;
        const EXTENSION_INFO      = 1 << 7;
        const THUMBNAIL           = 1 << 8;
        const MOUNT               = 1 << 9;
        const FILESYSTEM_INFO     = 1 << 10;

        /// The directory listing itself is wanted.
        const FILE_LIST           = 1 << 11;
    }
}

/// One variant per [`Request`] bit. Keys the per-type subscription counters
/// (`EnumMap<RequestType, u32>`) that make "is anyone interested in X" an
/// O(1) check instead of an O(n) scan over monitors and callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum RequestType {
    FileInfo,
    LinkInfo,
    DeepCount,
    DirectoryCount,
    MimeList,
    TopLeftText,
    LargeTopLeftText,
    ExtensionInfo,
    Thumbnail,
    Mount,
    FilesystemInfo,
    FileList,
}

impl RequestType {
    pub const ALL: [Self; 12] = [
        Self::FileInfo,
        Self::LinkInfo,
        Self::DeepCount,
        Self::DirectoryCount,
        Self::MimeList,
        Self::TopLeftText,
        Self::LargeTopLeftText,
        Self::ExtensionInfo,
        Self::Thumbnail,
        Self::Mount,
        Self::FilesystemInfo,
        Self::FileList,
    ];

    /// The single [`Request`] bit this type corresponds to.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> Request {
        match self {
            Self::FileInfo => Request::FILE_INFO,
            Self::LinkInfo => Request::LINK_INFO,
            Self::DeepCount => Request::DEEP_COUNT,
            Self::DirectoryCount => Request::DIRECTORY_COUNT,
            Self::MimeList => Request::MIME_LIST,
            Self::TopLeftText => Request::TOP_LEFT_TEXT,
            Self::LargeTopLeftText => Request::LARGE_TOP_LEFT_TEXT,
            Self::ExtensionInfo => Request::EXTENSION_INFO,
            Self::Thumbnail => Request::THUMBNAIL,
            Self::Mount => Request::MOUNT,
            Self::FilesystemInfo => Request::FILESYSTEM_INFO,
            Self::FileList => Request::FILE_LIST,
        }
    }
}

impl Request {
    /// True when this request wants the given type.
    #[inline]
    #[must_use]
    pub fn wants_type(self, ty: RequestType) -> bool {
        self.intersects(ty.bit())
    }

    /// Iterate the types present in this request.
    pub fn types(self) -> impl Iterator<Item = RequestType> {
        RequestType::ALL
            .into_iter()
            .filter(move |ty| self.wants_type(*ty))
    }
}

/// Attribute classes whose fetchers require base stat info to be present
/// before they can run, so requesting them implies FILE_INFO.
const IMPLIES_FILE_INFO: FileAttributes = FileAttributes::LINK_INFO
    .union(FileAttributes::TOP_LEFT_TEXT)
    .union(FileAttributes::LARGE_TOP_LEFT_TEXT)
    .union(FileAttributes::THUMBNAIL)
    .union(FileAttributes::MOUNT);

/// Derive the internal [`Request`] bitset for an attribute set.
///
/// Pure translation: no side effects, no errors.
#[must_use]
pub fn attributes_to_request(attrs: FileAttributes) -> Request {
    let mut request = Request::empty();

    if attrs.contains(FileAttributes::FILE_INFO) {
        request |= Request::FILE_INFO;
    }
    if attrs.contains(FileAttributes::LINK_INFO) {
        request |= Request::LINK_INFO;
    }
    if attrs.contains(FileAttributes::DEEP_COUNTS) {
        request |= Request::DEEP_COUNT;
    }
    if attrs.contains(FileAttributes::DIRECTORY_ITEM_COUNT) {
        request |= Request::DIRECTORY_COUNT;
    }
    if attrs.contains(FileAttributes::DIRECTORY_ITEM_MIME_TYPES) {
        request |= Request::MIME_LIST;
    }
    if attrs.contains(FileAttributes::TOP_LEFT_TEXT) {
        request |= Request::TOP_LEFT_TEXT;
    }
    if attrs.contains(FileAttributes::LARGE_TOP_LEFT_TEXT) {
        request |= Request::LARGE_TOP_LEFT_TEXT;
    }
    if attrs.contains(FileAttributes::EXTENSION_INFO) {
        request |= Request::EXTENSION_INFO;
    }
    if attrs.contains(FileAttributes::THUMBNAIL) {
        request |= Request::THUMBNAIL;
    }
    if attrs.contains(FileAttributes::MOUNT) {
        request |= Request::MOUNT;
    }
    if attrs.contains(FileAttributes::FILESYSTEM_INFO) {
        request |= Request::FILESYSTEM_INFO;
    }

    if attrs.intersects(IMPLIES_FILE_INFO) {
        request |= Request::FILE_INFO;
    }

    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_translation() {
        let req = attributes_to_request(FileAttributes::FILE_INFO);
        assert!(req.wants_type(RequestType::FileInfo));
        assert!(!req.wants_type(RequestType::Thumbnail));
        assert!(!req.wants_type(RequestType::FileList));
    }

    #[test]
    fn test_implication_table() {
        // Every class listed as implying FILE_INFO must pull it in.
        for attr in [
            FileAttributes::LINK_INFO,
            FileAttributes::TOP_LEFT_TEXT,
            FileAttributes::LARGE_TOP_LEFT_TEXT,
            FileAttributes::THUMBNAIL,
            FileAttributes::MOUNT,
        ] {
            let req = attributes_to_request(attr);
            assert!(
                req.wants_type(RequestType::FileInfo),
                "{attr:?} should imply FILE_INFO"
            );
        }

        // Classes without the dependency must not.
        for attr in [
            FileAttributes::DEEP_COUNTS,
            FileAttributes::DIRECTORY_ITEM_COUNT,
            FileAttributes::DIRECTORY_ITEM_MIME_TYPES,
            FileAttributes::EXTENSION_INFO,
            FileAttributes::FILESYSTEM_INFO,
        ] {
            let req = attributes_to_request(attr);
            assert!(
                !req.wants_type(RequestType::FileInfo),
                "{attr:?} should not imply FILE_INFO"
            );
        }
    }

    #[test]
    fn test_unrelated_types_stay_clear() {
        let req = attributes_to_request(FileAttributes::THUMBNAIL);
        assert!(req.wants_type(RequestType::Thumbnail));
        assert!(req.wants_type(RequestType::FileInfo));
        assert!(!req.wants_type(RequestType::DeepCount));
        assert!(!req.wants_type(RequestType::Mount));
        assert!(!req.wants_type(RequestType::ExtensionInfo));
    }

    #[test]
    fn test_types_iterator_matches_bits() {
        let req = attributes_to_request(
            FileAttributes::DEEP_COUNTS | FileAttributes::DIRECTORY_ITEM_MIME_TYPES,
        );
        let types: Vec<RequestType> = req.types().collect();
        assert_eq!(types, vec![RequestType::DeepCount, RequestType::MimeList]);
    }
}
