//! `src/fs/local.rs`
//! ============================================================================
//! # Local Filesystem Provider
//!
//! Production [`FsProvider`] backed by `tokio::fs`. Enumeration streams
//! entries through a channel so completion handling stays on the caller's
//! side; every operation honors its cancellation token.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use compact_str::CompactString;
use sha2::{Digest, Sha256};
use tokio::fs as TokioFs;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::fs::provider::{
    EntryInfo, EntryStream, FileKind, FilesystemInfo, FsProvider, MountInfo, cancellable,
};

/// Extension-based content classification for the stat path. Opening files
/// to sniff magic bytes is deliberately avoided here; consumers that need
/// authoritative types read contents through the partial-load path.
fn mime_for_name(name: &str) -> Option<CompactString> {
    let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" | "md" | "log" | "cfg" | "conf" | "ini" | "toml" | "yaml" | "yml" => "text/plain",
        "rs" | "c" | "h" | "py" | "sh" | "js" | "ts" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "desktop" => "application/x-desktop",
        _ => return None,
    };
    Some(CompactString::const_new(mime))
}

#[derive(Debug, Default)]
pub struct LocalProvider {
    /// Root of the cached-thumbnail tree, e.g. `~/.cache/thumbnails/normal`.
    thumbnail_dir: Option<PathBuf>,
}

impl LocalProvider {
    #[must_use]
    pub fn new() -> Self {
        let thumbnail_dir = directories::BaseDirs::new()
            .map(|dirs| dirs.cache_dir().join("thumbnails").join("normal"));
        Self { thumbnail_dir }
    }

    #[must_use]
    pub fn with_thumbnail_dir(thumbnail_dir: Option<PathBuf>) -> Self {
        Self { thumbnail_dir }
    }

    fn thumbnail_path_for(&self, path: &Path) -> Option<PathBuf> {
        let dir = self.thumbnail_dir.as_ref()?;
        let uri = format!("file://{}", path.display());
        let digest = Sha256::digest(uri.as_bytes());
        let mut name = String::with_capacity(68);
        for byte in digest {
            name.push_str(&format!("{byte:02x}"));
        }
        name.push_str(".png");
        let candidate = dir.join(name);
        candidate.exists().then_some(candidate)
    }

    fn build_info(&self, path: &Path, meta: &std::fs::Metadata) -> EntryInfo {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let kind = if meta.file_type().is_dir() {
            FileKind::Directory
        } else if meta.file_type().is_symlink() {
            FileKind::Symlink
        } else if meta.file_type().is_file() {
            FileKind::File
        } else {
            FileKind::Special
        };

        let mut info = EntryInfo::new(&name, kind);
        info.size = if kind == FileKind::Directory { 0 } else { meta.len() };
        info.modified = meta.modified().unwrap_or(UNIX_EPOCH);
        info.mime_type = if kind == FileKind::Directory {
            Some(CompactString::const_new("inode/directory"))
        } else {
            mime_for_name(&name)
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            info.inode = meta.ino();
            info.filesystem_id = CompactString::from(meta.dev().to_string());
            info.allocated_size = meta.blocks() * 512;
            info.is_executable = meta.mode() & 0o111 != 0;
        }
        #[cfg(not(unix))]
        {
            info.allocated_size = info.size;
        }

        if kind == FileKind::Symlink {
            info.symlink_target = std::fs::read_link(path).ok();
        }
        if kind == FileKind::File {
            info.thumbnail_path = self.thumbnail_path_for(path);
        }
        #[cfg(unix)]
        if kind == FileKind::Directory {
            use std::os::unix::fs::MetadataExt;
            info.is_mountpoint = path
                .parent()
                .and_then(|parent| std::fs::symlink_metadata(parent).ok())
                .is_some_and(|parent_meta| parent_meta.dev() != meta.dev());
        }

        info
    }
}

#[async_trait]
impl FsProvider for LocalProvider {
    async fn enumerate(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<EntryStream> {
        let mut read_dir = cancellable(&token, async {
            TokioFs::read_dir(location).await.map_err(CoreError::from)
        })
        .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let provider = Self {
            thumbnail_dir: self.thumbnail_dir.clone(),
        };

        tokio::spawn(async move {
            loop {
                if token.is_cancelled() {
                    return;
                }
                match read_dir.next_entry().await {
                    Ok(Some(entry)) => {
                        let entry_path = entry.path();
                        match TokioFs::symlink_metadata(&entry_path).await {
                            Ok(meta) => {
                                let info = provider.build_info(&entry_path, &meta);
                                if tx.send(Ok(info)).is_err() {
                                    return;
                                }
                            }
                            Err(_) => {
                                // Vanished between readdir and stat: skip it.
                                continue;
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(CoreError::from(e)));
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn query_info(&self, location: &Path, token: CancellationToken)
    -> CoreResult<EntryInfo> {
        let meta = cancellable(&token, async {
            TokioFs::symlink_metadata(location)
                .await
                .map_err(CoreError::from)
        })
        .await?;
        Ok(self.build_info(location, &meta))
    }

    async fn query_filesystem_info(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<FilesystemInfo> {
        // Writability probe: metadata readonly flag of the location itself.
        let meta = cancellable(&token, async {
            TokioFs::metadata(location).await.map_err(CoreError::from)
        })
        .await?;
        Ok(FilesystemInfo {
            read_only: meta.permissions().readonly(),
            use_preview: true,
        })
    }

    async fn load_contents(&self, location: &Path, token: CancellationToken)
    -> CoreResult<Vec<u8>> {
        cancellable(&token, async {
            TokioFs::read(location).await.map_err(CoreError::from)
        })
        .await
    }

    async fn load_partial_contents(
        &self,
        location: &Path,
        max_bytes: usize,
        token: CancellationToken,
    ) -> CoreResult<Vec<u8>> {
        cancellable(&token, async {
            let file = TokioFs::File::open(location).await?;
            let mut buf = Vec::with_capacity(max_bytes.min(64 * 1024));
            let mut handle = file.take(max_bytes as u64);
            handle.read_to_end(&mut buf).await?;
            Ok(buf)
        })
        .await
    }

    fn load_contents_sync(&self, location: &Path) -> CoreResult<Vec<u8>> {
        std::fs::read(location).map_err(CoreError::from)
    }

    async fn find_enclosing_mount(
        &self,
        location: &Path,
        _token: CancellationToken,
    ) -> CoreResult<Option<MountInfo>> {
        let mounts = self.list_mounts();
        Ok(mounts
            .into_iter()
            .filter(|m| !m.is_shadowed && location.starts_with(&m.root))
            .max_by_key(|m| m.root.components().count()))
    }

    fn list_mounts(&self) -> Vec<MountInfo> {
        #[cfg(target_os = "linux")]
        {
            let Ok(raw) = std::fs::read_to_string("/proc/mounts") else {
                return Vec::new();
            };
            raw.lines()
                .filter_map(|line| {
                    let mut parts = line.split_whitespace();
                    let source = parts.next()?;
                    let target = parts.next()?;
                    Some(MountInfo {
                        name: CompactString::new(source),
                        root: PathBuf::from(target),
                        activation_root: None,
                        is_shadowed: false,
                    })
                })
                .collect()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Vec::new()
        }
    }
}
