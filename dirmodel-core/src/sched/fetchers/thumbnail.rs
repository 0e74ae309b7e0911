//! `src/sched/fetchers/thumbnail.rs`
//! ============================================================================
//! # Thumbnail Fetcher
//!
//! Reads the cached-thumbnail image first. If that decode fails, or the
//! decoded image's embedded modification time disagrees with the file's
//! actual modification time (a stale cache entry), one retry from the
//! original file is permitted when policy allows; originals skip the
//! staleness check. Files that can surface no thumbnail at all resolve
//! without a single decode call.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::fs::decode::DecodedImage;
use crate::model::file_entry::{FileEntry, ThumbnailState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct ThumbnailFetch;

pub(crate) struct ThumbResult {
    pub image: Arc<DecodedImage>,
    pub from_original: bool,
}

fn is_image_mime(mime: Option<&str>) -> bool {
    mime.is_some_and(|m| m.starts_with("image/"))
}

async fn load_and_decode(ctx: &FetchCtx, path: &Path) -> FetchResult<DecodedImage> {
    let bytes = ctx
        .provider
        .load_contents(path, ctx.token.clone())
        .await
        .map_err(FetchError::from)?;

    ctx.decoder
        .decode(&bytes, Some(ctx.settings.max_thumbnail_dimension))
        .map_err(FetchError::from)
}

impl FetchClass for ThumbnailFetch {
    const KIND: FetchKind = FetchKind::Thumbnail;
    type Output = ThumbResult;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.thumbnail.up_to_date
    }

    fn ready(file: &FileEntry) -> bool {
        file.info_up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        let has_cached = file
            .info
            .as_ref()
            .is_some_and(|info| info.thumbnail_path.is_some());
        let decodable_original = file
            .info
            .as_ref()
            .is_some_and(|info| is_image_mime(info.mime_type.as_deref()));

        if has_cached || decodable_original {
            return false;
        }

        file.thumbnail = ThumbnailState {
            up_to_date: true,
            failed: None,
            image: None,
            from_original: false,
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<ThumbResult>> {
        Box::pin(async move {
            let mut last_err = FetchError::Failed(std::io::ErrorKind::InvalidData);

            if let Some(thumb_path) = ctx.seed.thumbnail_path.clone() {
                match load_and_decode(&ctx, &thumb_path).await {
                    Ok(image) => {
                        let stale = match (image.embedded_mtime, ctx.seed.modified) {
                            (Some(embedded), Some(actual)) => embedded != actual,
                            _ => false,
                        };
                        if !stale {
                            return Ok(ThumbResult {
                                image: Arc::new(image),
                                from_original: false,
                            });
                        }
                        last_err = FetchError::Failed(std::io::ErrorKind::InvalidData);
                    }
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(e) => last_err = e,
                }
            }

            // At most one retry, and only from the original image.
            if ctx.settings.thumbnail_original_fallback
                && is_image_mime(ctx.seed.mime_type.as_deref())
            {
                match load_and_decode(&ctx, &ctx.seed.path).await {
                    Ok(image) => {
                        return Ok(ThumbResult {
                            image: Arc::new(image),
                            from_original: true,
                        });
                    }
                    Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                    Err(e) => last_err = e,
                }
            }

            Err(last_err)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<ThumbResult>) {
        match out {
            Ok(result) => {
                file.thumbnail = ThumbnailState {
                    up_to_date: true,
                    failed: None,
                    image: Some(result.image),
                    from_original: result.from_original,
                };
            }
            Err(FetchError::NotFound) => {
                file.thumbnail = ThumbnailState {
                    up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    image: None,
                    from_original: false,
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.thumbnail = ThumbnailState {
                    up_to_date: true,
                    failed: Some(kind),
                    image: None,
                    from_original: false,
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
