//! `src/sched/fetchers/mount.rs`
//! ============================================================================
//! # Mount Resolution Fetcher
//!
//! For mountable entries, resolves an associated active mount by scanning
//! the live mount list (shadowed mounts are skipped) for a matching
//! activation location. For mount-point directories, resolves via the
//! enclosing mount and verifies the mount's root equals the file's own
//! location, rejecting bind-mount-style mismatches. Everything else is not
//! applicable and resolves without I/O.

use futures::future::BoxFuture;

use crate::fs::attributes::Request;
use crate::fs::provider::{FileKind, MountInfo};
use crate::model::file_entry::{FileEntry, MountState};
use crate::sched::fetch::{FetchClass, FetchCtx, FetchError, FetchKind, FetchResult};

pub(crate) struct MountFetch;

impl FetchClass for MountFetch {
    const KIND: FetchKind = FetchKind::Mount;
    type Output = Option<MountInfo>;

    fn is_missing(file: &FileEntry, _wants: Request) -> bool {
        !file.mount.up_to_date
    }

    fn ready(file: &FileEntry) -> bool {
        file.info_up_to_date
    }

    fn short_circuit(file: &mut FileEntry, _wants: Request) -> bool {
        let applicable = match file.kind() {
            Some(FileKind::Mountable) => true,
            Some(FileKind::Directory) => file
                .info
                .as_ref()
                .is_some_and(|info| info.is_mountpoint),
            _ => false,
        };
        if applicable && file.info.is_some() {
            return false;
        }
        file.mount = MountState {
            up_to_date: true,
            mount: None,
        };
        true
    }

    fn fetch(ctx: FetchCtx) -> BoxFuture<'static, FetchResult<Option<MountInfo>>> {
        Box::pin(async move {
            if ctx.seed.kind == Some(FileKind::Mountable) {
                let found = ctx
                    .provider
                    .list_mounts()
                    .into_iter()
                    .filter(|mount| !mount.is_shadowed)
                    .find(|mount| {
                        mount.activation_root.as_deref() == Some(ctx.seed.path.as_path())
                    });
                return Ok(found);
            }

            let enclosing = ctx
                .provider
                .find_enclosing_mount(&ctx.seed.path, ctx.token.clone())
                .await
                .map_err(FetchError::from)?;

            // A mount whose root differs from the file's own location is
            // someone else's mount seen through a bind; reject it.
            Ok(enclosing.filter(|mount| mount.root == *ctx.seed.path))
        })
    }

    fn apply(file: &mut FileEntry, out: FetchResult<Option<MountInfo>>) {
        match out {
            Ok(mount) => {
                file.mount = MountState {
                    up_to_date: true,
                    mount,
                };
            }
            Err(FetchError::NotFound | FetchError::Failed(_)) => {
                file.mount = MountState {
                    up_to_date: true,
                    mount: None,
                };
            }
            Err(FetchError::Cancelled) => {}
        }
    }
}
