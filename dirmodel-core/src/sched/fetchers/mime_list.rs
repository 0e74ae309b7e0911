//! `src/sched/fetchers/mime_list.rs`
//! ============================================================================
//! # MIME-Type List Fetcher
//!
//! Non-recursive: enumerates immediate children and collects the distinct
//! set of content-type strings with case-insensitive set semantics. The
//! result is an unordered list.

use std::collections::HashSet;

use ahash::RandomState;
use compact_str::CompactString;
use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::model::file_entry::{FileEntry, MimeListState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct MimeListFetch;

impl FetchClass for MimeListFetch {
    const KIND: FetchKind = FetchKind::MimeList;
    type Output = Vec<CompactString>;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.mime_list.up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        let Some(kind) = file.kind() else {
            return false;
        };
        if kind.is_directory() {
            return false;
        }
        file.mime_list = MimeListState {
            up_to_date: true,
            failed: None,
            types: Vec::new(),
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<Vec<CompactString>>> {
        Box::pin(async move {
            let mut rx = ctx
                .provider
                .enumerate(&ctx.seed.path, ctx.token.clone())
                .await
                .map_err(FetchError::from)?;

            let mut distinct: HashSet<CompactString, RandomState> = HashSet::default();
            while let Some(item) = rx.recv().await {
                let Ok(entry) = item else { continue };
                if let Some(mime) = entry.mime_type {
                    distinct.insert(CompactString::new(mime.to_lowercase()));
                }
            }

            if ctx.token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            Ok(distinct.into_iter().collect())
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<Vec<CompactString>>) {
        match out {
            Ok(types) => {
                file.mime_list = MimeListState {
                    up_to_date: true,
                    failed: None,
                    types,
                };
            }
            Err(FetchError::NotFound) => {
                file.mime_list = MimeListState {
                    up_to_date: true,
                    failed: Some(std::io::ErrorKind::NotFound),
                    types: Vec::new(),
                };
            }
            Err(FetchError::Failed(kind)) => {
                file.mime_list = MimeListState {
                    up_to_date: true,
                    failed: Some(kind),
                    types: Vec::new(),
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
