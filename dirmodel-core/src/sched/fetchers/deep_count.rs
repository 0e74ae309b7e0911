//! `src/sched/fetchers/deep_count.rs`
//! ============================================================================
//! # Deep Recursive Count Fetcher
//!
//! Breadth-first traversal over subdirectories on the same filesystem only;
//! the root's filesystem identity is fixed once up front and entries on a
//! different filesystem are excluded entirely (neither counted nor
//! recursed). Entry counts are per-name; seen-inode suppression applies to
//! the size accumulators so hard links are sized once. Unreadable
//! subdirectories increment the unreadable counter and are not recursed.
//!
//! Partial totals are pushed back onto the entry after each directory so
//! observers can render running counts; completion sets status DONE.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use ahash::RandomState;
use compact_str::CompactString;
use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::model::directory::emit_changed;
use crate::model::file_entry::{DeepCountStatus, DeepCounts, FileEntry};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct DeepCountFetch;

impl FetchClass for DeepCountFetch {
    const KIND: FetchKind = FetchKind::DeepCount;
    type Output = DeepCounts;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        file.deep_counts.status != DeepCountStatus::Done
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        let Some(kind) = file.kind() else {
            return false;
        };
        if kind.is_directory() {
            return false;
        }
        file.deep_counts = DeepCounts {
            status: DeepCountStatus::Done,
            ..DeepCounts::default()
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<DeepCounts>> {
        Box::pin(async move {
            // Filesystem identity is resolved once up front; the traversal
            // never crosses it.
            let root_fs: Option<CompactString> = match ctx.seed.filesystem_id.clone() {
                Some(id) => Some(id),
                None => ctx
                    .provider
                    .query_info(&ctx.seed.path, ctx.token.clone())
                    .await
                    .ok()
                    .map(|info| info.filesystem_id),
            };

            let mut totals = DeepCounts {
                status: DeepCountStatus::InProgress,
                ..DeepCounts::default()
            };
            let mut seen_inodes: HashSet<u64, RandomState> = HashSet::default();
            let mut pending: VecDeque<PathBuf> = VecDeque::new();
            pending.push_back((*ctx.seed.path).clone());

            while let Some(dir_path) = pending.pop_front() {
                if ctx.token.is_cancelled() {
                    return Err(FetchError::Cancelled);
                }

                match ctx.provider.enumerate(&dir_path, ctx.token.clone()).await {
                    Ok(mut rx) => {
                        while let Some(item) = rx.recv().await {
                            let Ok(entry) = item else { continue };

                            if let Some(root) = &root_fs {
                                if entry.filesystem_id != *root {
                                    continue;
                                }
                            }

                            if entry.kind.is_directory() {
                                totals.directory_count += 1;
                                pending.push_back(dir_path.join(entry.name.as_str()));
                            } else {
                                totals.file_count += 1;
                            }

                            if seen_inodes.insert(entry.inode) {
                                totals.total_size += entry.size;
                                totals.on_disk_size += entry.allocated_size;
                            }
                        }
                    }
                    Err(e) if e.is_cancelled() => return Err(FetchError::Cancelled),
                    Err(_) => {
                        // Unreadable subtree: counted, never recursed, and
                        // the broader traversal keeps going.
                        totals.unreadable_count += 1;
                    }
                }

                report_progress(&ctx, totals)?;
            }

            Ok(totals)
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<DeepCounts>) {
        match out {
            Ok(mut totals) => {
                totals.status = DeepCountStatus::Done;
                file.deep_counts = totals;
            }
            Err(FetchError::NotFound | FetchError::Failed(_)) => {
                file.deep_counts = DeepCounts {
                    status: DeepCountStatus::Done,
                    unreadable_count: 1,
                    ..DeepCounts::default()
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}

/// Push partial totals onto the owning entry, bailing out when the slot was
/// cancelled or reassigned while the traversal ran.
fn report_progress(ctx: &FetchCtx, totals: DeepCounts) -> FetchResult<()> {
    let Some(dir) = ctx.dir.upgrade() else {
        return Err(FetchError::Cancelled);
    };

    let mut st = dir.lock_state();
    match &st.slots[FetchKind::DeepCount] {
        Some(inflight) if inflight.seq == ctx.seq => {}
        _ => return Err(FetchError::Cancelled),
    }

    if let Some(file) = st.files.get_mut(&ctx.seed.name) {
        file.deep_counts = DeepCounts {
            status: DeepCountStatus::InProgress,
            ..totals
        };
        emit_changed(&st, std::slice::from_ref(&ctx.seed.name));
    }

    Ok(())
}
