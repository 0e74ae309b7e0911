//! `src/sched/fetchers/filesystem_info.rs`
//! ============================================================================
//! # Filesystem-Info Fetcher
//!
//! Queries the read-only and use-preview flags of the filesystem containing
//! the file.

use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::fs::provider::FilesystemInfo;
use crate::model::file_entry::{FileEntry, FilesystemState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct FilesystemInfoFetch;

impl FetchClass for FilesystemInfoFetch {
    const KIND: FetchKind = FetchKind::FilesystemInfo;
    type Output = FilesystemInfo;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.filesystem.up_to_date
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<FilesystemInfo>> {
        Box::pin(async move {
            ctx.provider
                .query_filesystem_info(&ctx.seed.path, ctx.token.clone())
                .await
                .map_err(FetchError::from)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<FilesystemInfo>) {
        match out {
            Ok(info) => {
                file.filesystem = FilesystemState {
                    up_to_date: true,
                    failed: None,
                    info: Some(info),
                };
            }
            Err(FetchError::NotFound) => {
                file.filesystem = FilesystemState {
                    up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    info: None,
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.filesystem = FilesystemState {
                    up_to_date: true,
                    failed: Some(kind),
                    info: None,
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
