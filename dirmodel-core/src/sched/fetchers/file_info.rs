//! `src/sched/fetchers/file_info.rs`
//! ============================================================================
//! # File-Info Fetcher
//!
//! Queries standard attributes for a file's location. A NOT_FOUND result
//! marks the file gone (it is removed on the next change sweep) rather than
//! being treated as a retryable failure; any other error is cached on the
//! entry with its attributes cleared.

use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::fs::provider::EntryInfo;
use crate::model::file_entry::FileEntry;
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct FileInfoFetch;

impl FetchClass for FileInfoFetch {
    const KIND: FetchKind = FetchKind::FileInfo;
    type Output = EntryInfo;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.info_up_to_date
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<EntryInfo>> {
        Box::pin(async move {
            ctx.provider
                .query_info(&ctx.seed.path, ctx.token.clone())
                .await
                .map_err(FetchError::from)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<EntryInfo>) {
        match out {
            Ok(info) => file.apply_info(info),
            Err(FetchError::NotFound) => file.mark_gone(),
            Err(FetchError::Failed(kind)) => {
                file.info = None;
                file.info_up_to_date = true;
                file.info_failed = Some(kind);
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::fs::provider::FileKind;

    #[test]
    fn test_not_found_marks_gone_not_failed() {
        let location = Arc::new(PathBuf::from("/data"));
        let mut file = FileEntry::new("a.txt", &location);

        FileInfoFetch::apply(&mut file, Err(FetchError::NotFound));

        assert!(file.is_gone);
        assert!(file.info_up_to_date);
        assert!(!FileInfoFetch::is_missing(&file, Request::FILE_INFO));
    }

    #[test]
    fn test_other_errors_cache_and_clear_attributes() {
        let location = Arc::new(PathBuf::from("/data"));
        let mut file = FileEntry::new("a.txt", &location);
        file.apply_info(EntryInfo::new("a.txt", FileKind::File));

        FileInfoFetch::apply(&mut file, Err(FetchError::Failed(ErrorKind::PermissionDenied)));

        assert!(!file.is_gone);
        assert!(file.info.is_none());
        assert_eq!(file.info_failed, Some(ErrorKind::PermissionDenied));
        // Terminal: the scheduler must not spin on it.
        assert!(!FileInfoFetch::is_missing(&file, Request::FILE_INFO));
    }
}
