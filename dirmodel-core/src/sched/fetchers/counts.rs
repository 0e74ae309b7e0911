//! `src/sched/fetchers/counts.rs`
//! ============================================================================
//! # Shallow Directory Count Fetcher
//!
//! Enumerates immediate children and counts the entries the filter policy
//! keeps (hidden and backup files only when the preferences say so).
//! Non-directories short-circuit to "not applicable" without any I/O.

use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::model::file_entry::{FileEntry, ShallowCountState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct DirectoryCountFetch;

impl FetchClass for DirectoryCountFetch {
    const KIND: FetchKind = FetchKind::DirectoryCount;
    type Output = u64;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.directory_count.up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        // Only short-circuit once the type is actually known.
        let Some(kind) = file.kind() else {
            return false;
        };
        if kind.is_directory() {
            return false;
        }
        file.directory_count = ShallowCountState {
            up_to_date: true,
            failed: None,
            count: None,
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<u64>> {
        Box::pin(async move {
            let mut rx = ctx
                .provider
                .enumerate(&ctx.seed.path, ctx.token.clone())
                .await
                .map_err(FetchError::from)?;

            let mut count: u64 = 0;
            while let Some(item) = rx.recv().await {
                let Ok(entry) = item else { continue };
                if entry.is_hidden && !ctx.settings.show_hidden_files {
                    continue;
                }
                if entry.is_backup && !ctx.settings.show_backup_files {
                    continue;
                }
                count += 1;
            }

            if ctx.token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            Ok(count)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<u64>) {
        match out {
            Ok(count) => {
                file.directory_count = ShallowCountState {
                    up_to_date: true,
                    failed: None,
                    count: Some(count),
                };
            }
            Err(FetchError::NotFound) => {
                file.directory_count = ShallowCountState {
                    up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    count: None,
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.directory_count = ShallowCountState {
                    up_to_date: true,
                    failed: Some(kind),
                    count: None,
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
