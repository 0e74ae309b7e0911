//! `src/sched/fetchers/extension.rs`
//! ============================================================================
//! # Extension-Info Fetcher
//!
//! Invokes the registered third-party info providers sequentially for one
//! file, awaiting each. A provider failure is logged and skipped; it never
//! blocks the remaining providers. A file is done once the provider list is
//! exhausted (trivially so when none are registered).

use compact_str::CompactString;
use futures::future::BoxFuture;
use tracing::warn;

use crate::fs::attributes::Request;
use crate::model::file_entry::FileEntry;
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct ExtensionFetch;

impl FetchClass for ExtensionFetch {
    const KIND: FetchKind = FetchKind::Extension;
    type Output = Vec<(CompactString, CompactString)>;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.extension.done
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<Self::Output>> {
        Box::pin(async move {
            let mut attributes = Vec::new();

            for provider in ctx.plugins.snapshot() {
                if ctx.token.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }

                match provider.update_file_info(&ctx.snapshot, &ctx.token).await {
                    Ok(patch) => attributes.extend(patch.attributes),
                    Err(e) if e.is_cancelled() => return Err(FetchError::Cancelled),
                    Err(e) => {
                        warn!(
                            marker = "EXTENSION_INFO",
                            operation_type = "provider_failed",
                            provider = provider.name(),
                            file = %ctx.seed.path.display(),
                            error = %e,
                            "Info provider failed, continuing with the rest"
                        );
                    }
                }
            }

            Ok(attributes)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<Self::Output>) {
        match out {
            Ok(attributes) => {
                file.extension.attributes = attributes;
                file.extension.done = true;
            }
            Err(FetchError::NotFound | FetchError::Failed(_)) => {
                file.extension.done = true;
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
