//! `src/fs/sim.rs`
//! ============================================================================
//! # Simulated Provider (test support)
//!
//! An in-memory filesystem with controllable completion: operation gates
//! hold async calls open so scheduler tests can observe in-flight state
//! deterministically, and call counters expose what the engine actually
//! touched. Only compiled for tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use compact_str::CompactString;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::fs::decode::{DecodedImage, ThumbnailDecoder};
use crate::fs::provider::{
    EntryInfo, EntryStream, FileKind, FilesystemInfo, FsProvider, MountInfo,
};

// ------------------------------------------------------------
// Gate – holds async operations open until released.
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Gate {
    held: AtomicBool,
    notify: Notify,
}

impl Gate {
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub async fn pass(&self, token: &CancellationToken) -> CoreResult<()> {
        loop {
            if !self.held.load(Ordering::SeqCst) {
                return Ok(());
            }
            let notified = self.notify.notified();
            if !self.held.load(Ordering::SeqCst) {
                return Ok(());
            }
            tokio::select! {
                () = token.cancelled() => return Err(CoreError::Cancelled),
                () = notified => {}
            }
        }
    }
}

// ------------------------------------------------------------
// SimFs.
// ------------------------------------------------------------

#[derive(Debug)]
struct SimNode {
    info: EntryInfo,
    children: Vec<CompactString>,
    contents: Vec<u8>,
    fsinfo: FilesystemInfo,
}

#[derive(Debug, Default)]
pub struct SimCounters {
    pub enumerate: AtomicUsize,
    pub query_info: AtomicUsize,
    pub load_contents: AtomicUsize,
}

#[derive(Debug, Default)]
pub struct SimGates {
    pub enumerate: Gate,
    pub query: Gate,
}

#[derive(Default)]
pub struct SimFs {
    nodes: Mutex<HashMap<PathBuf, SimNode>>,
    mounts: Mutex<Vec<MountInfo>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    next_inode: AtomicU64,
    pub gates: SimGates,
    pub counters: SimCounters,
}

impl SimFs {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_inode: AtomicU64::new(100),
            ..Self::default()
        }
    }

    fn insert(&self, path: &str, kind: FileKind, customize: impl FnOnce(&mut EntryInfo)) {
        let path = PathBuf::from(path);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let mut info = EntryInfo::new(&name, kind);
        info.inode = self.next_inode.fetch_add(1, Ordering::Relaxed);
        info.modified = UNIX_EPOCH + Duration::from_secs(1_000_000);
        customize(&mut info);

        let mut nodes = self.nodes.lock().expect("sim nodes poisoned");
        if let Some(parent) = path.parent() {
            if let Some(parent_node) = nodes.get_mut(parent) {
                let key = CompactString::new(&name);
                if !parent_node.children.contains(&key) {
                    parent_node.children.push(key);
                }
            }
        }
        nodes.insert(
            path,
            SimNode {
                info,
                children: Vec::new(),
                contents: Vec::new(),
                fsinfo: FilesystemInfo::default(),
            },
        );
    }

    pub fn add_dir(&self, path: &str) {
        self.insert(path, FileKind::Directory, |_| {});
    }

    pub fn add_dir_with(&self, path: &str, customize: impl FnOnce(&mut EntryInfo)) {
        self.insert(path, FileKind::Directory, customize);
    }

    pub fn add_file(&self, path: &str, size: u64) {
        self.insert(path, FileKind::File, |info| {
            info.size = size;
            info.allocated_size = size;
        });
    }

    pub fn add_file_with(&self, path: &str, customize: impl FnOnce(&mut EntryInfo)) {
        self.insert(path, FileKind::File, customize);
    }

    pub fn set_contents(&self, path: &str, contents: &[u8]) {
        let mut nodes = self.nodes.lock().expect("sim nodes poisoned");
        if let Some(node) = nodes.get_mut(Path::new(path)) {
            node.contents = contents.to_vec();
            node.info.size = contents.len() as u64;
        }
    }

    pub fn set_filesystem_info(&self, path: &str, fsinfo: FilesystemInfo) {
        let mut nodes = self.nodes.lock().expect("sim nodes poisoned");
        if let Some(node) = nodes.get_mut(Path::new(path)) {
            node.fsinfo = fsinfo;
        }
    }

    pub fn add_mount(&self, mount: MountInfo) {
        self.mounts.lock().expect("sim mounts poisoned").push(mount);
    }

    /// Delete an entry so the next query observes NOT_FOUND.
    pub fn remove_entry(&self, path: &str) {
        let path = PathBuf::from(path);
        let mut nodes = self.nodes.lock().expect("sim nodes poisoned");
        nodes.remove(&path);
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name().and_then(|n| n.to_str()))
        {
            if let Some(parent_node) = nodes.get_mut(parent) {
                parent_node.children.retain(|c| c.as_str() != name);
            }
        }
    }

    /// Enumerating this path fails with permission denied.
    pub fn mark_unreadable(&self, path: &str) {
        self.unreadable
            .lock()
            .expect("sim unreadable poisoned")
            .insert(PathBuf::from(path));
    }

    fn permission_denied(path: &Path) -> CoreError {
        CoreError::from(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("unreadable: {}", path.display()),
        ))
    }
}

#[async_trait]
impl FsProvider for SimFs {
    async fn enumerate(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<EntryStream> {
        self.counters.enumerate.fetch_add(1, Ordering::Relaxed);
        self.gates.enumerate.pass(&token).await?;

        if self
            .unreadable
            .lock()
            .expect("sim unreadable poisoned")
            .contains(location)
        {
            return Err(Self::permission_denied(location));
        }

        let nodes = self.nodes.lock().expect("sim nodes poisoned");
        let node = nodes
            .get(location)
            .ok_or_else(|| CoreError::not_found(location.display().to_string()))?;
        if !node.info.kind.is_directory() {
            return Err(CoreError::from(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a directory",
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for child in &node.children {
            let child_path = location.join(child.as_str());
            if let Some(child_node) = nodes.get(&child_path) {
                let _ = tx.send(Ok(child_node.info.clone()));
            }
        }
        Ok(rx)
    }

    async fn query_info(
        &self,
        location: &Path,
        token: CancellationToken,
    ) -> CoreResult<EntryInfo> {
        self.counters.query_info.fetch_add(1, Ordering::Relaxed);
        self.gates.query.pass(&token).await?;

        let nodes = self.nodes.lock().expect("sim nodes poisoned");
        nodes
            .get(location)
            .map(|node| node.info.clone())
            .ok_or_else(|| CoreError::not_found(location.display().to_string()))
    }

    async fn query_filesystem_info(
        &self,
        location: &Path,
        _token: CancellationToken,
    ) -> CoreResult<FilesystemInfo> {
        let nodes = self.nodes.lock().expect("sim nodes poisoned");
        nodes
            .get(location)
            .map(|node| node.fsinfo)
            .ok_or_else(|| CoreError::not_found(location.display().to_string()))
    }

    async fn load_contents(
        &self,
        location: &Path,
        _token: CancellationToken,
    ) -> CoreResult<Vec<u8>> {
        self.counters.load_contents.fetch_add(1, Ordering::Relaxed);
        let nodes = self.nodes.lock().expect("sim nodes poisoned");
        nodes
            .get(location)
            .map(|node| node.contents.clone())
            .ok_or_else(|| CoreError::not_found(location.display().to_string()))
    }

    async fn load_partial_contents(
        &self,
        location: &Path,
        max_bytes: usize,
        token: CancellationToken,
    ) -> CoreResult<Vec<u8>> {
        let mut contents = self.load_contents(location, token).await?;
        contents.truncate(max_bytes);
        Ok(contents)
    }

    fn load_contents_sync(&self, location: &Path) -> CoreResult<Vec<u8>> {
        let nodes = self.nodes.lock().expect("sim nodes poisoned");
        nodes
            .get(location)
            .map(|node| node.contents.clone())
            .ok_or_else(|| CoreError::not_found(location.display().to_string()))
    }

    async fn find_enclosing_mount(
        &self,
        location: &Path,
        _token: CancellationToken,
    ) -> CoreResult<Option<MountInfo>> {
        let mounts = self.mounts.lock().expect("sim mounts poisoned");
        let best = mounts
            .iter()
            .filter(|m| !m.is_shadowed && location.starts_with(&m.root))
            .max_by_key(|m| m.root.components().count())
            .cloned();
        Ok(best)
    }

    fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts.lock().expect("sim mounts poisoned").clone()
    }
}

// ------------------------------------------------------------
// SimDecoder.
// ------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SimDecoder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub embedded_mtime: Mutex<Option<SystemTime>>,
}

impl SimDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_embedded_mtime(&self, mtime: Option<SystemTime>) {
        *self.embedded_mtime.lock().expect("sim decoder poisoned") = mtime;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ThumbnailDecoder for SimDecoder {
    fn decode(&self, _data: &[u8], _max_dimension: Option<u32>) -> CoreResult<DecodedImage> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::decode("simulated decode failure"));
        }
        Ok(DecodedImage {
            width: 16,
            height: 16,
            pixels: bytes::Bytes::new(),
            embedded_mtime: *self.embedded_mtime.lock().expect("sim decoder poisoned"),
        })
    }
}
