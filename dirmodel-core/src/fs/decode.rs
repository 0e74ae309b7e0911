//! `src/fs/decode.rs`
//! ============================================================================
//! # Opaque Thumbnail Decoder Seam
//!
//! Decoding is a collaborator, not part of the core: the engine hands raw
//! bytes to a [`ThumbnailDecoder`] and gets back a bitmap or a failure. The
//! `max_dimension` argument is the size-prepared hook: the decoder downscales
//! oversized images during decode, preserving aspect ratio, and applies
//! orientation correction before returning.

use std::time::SystemTime;

use bytes::Bytes;

use crate::error::CoreResult;

/// A decoded, orientation-corrected bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Packed pixel data; layout is a decoder concern.
    pub pixels: Bytes,
    /// Source modification time embedded in the image metadata, when
    /// present. Used to detect stale cached thumbnails.
    pub embedded_mtime: Option<SystemTime>,
}

pub trait ThumbnailDecoder: Send + Sync + 'static {
    /// Decode `data` into a bitmap, downscaling to at most `max_dimension`
    /// on the longer side when given.
    fn decode(&self, data: &[u8], max_dimension: Option<u32>) -> CoreResult<DecodedImage>;
}
