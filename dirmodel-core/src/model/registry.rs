//! `src/model/registry.rs`
//! ============================================================================
//! # Directory Registry
//!
//! Process-wide deduplication of directory models: one instance per
//! canonical location, handed out as `Arc` and tracked through weak
//! references with lazy pruning. The registry also owns the collaborator
//! set (provider, decoder, plugins, settings) and the admission controller
//! shared by every directory it creates.

use std::path::Path;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::Settings;
use crate::fs::decode::ThumbnailDecoder;
use crate::fs::provider::FsProvider;
use crate::model::directory::{Directory, EngineCtx};
use crate::plugins::ProviderRegistry;
use crate::sched::admission::AdmissionController;

pub struct DirectoryRegistry {
    ctx: EngineCtx,
    directories: DashMap<std::path::PathBuf, Weak<Directory>>,
}

impl DirectoryRegistry {
    #[must_use]
    pub fn new(
        provider: Arc<dyn FsProvider>,
        decoder: Arc<dyn ThumbnailDecoder>,
        plugins: Arc<ProviderRegistry>,
        settings: Arc<Settings>,
    ) -> Self {
        Self::with_admission(
            provider,
            decoder,
            plugins,
            settings,
            Arc::new(AdmissionController::new()),
        )
    }

    #[must_use]
    pub fn with_admission(
        provider: Arc<dyn FsProvider>,
        decoder: Arc<dyn ThumbnailDecoder>,
        plugins: Arc<ProviderRegistry>,
        settings: Arc<Settings>,
        admission: Arc<AdmissionController>,
    ) -> Self {
        Self {
            ctx: EngineCtx {
                provider,
                decoder,
                plugins,
                settings,
                admission,
            },
            directories: DashMap::new(),
        }
    }

    #[must_use]
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.ctx.admission
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.ctx.settings
    }

    /// Singleton lookup/creation per location.
    #[must_use]
    pub fn get_or_create(&self, location: &Path) -> Arc<Directory> {
        match self.directories.entry(location.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                if let Some(existing) = occupied.get().upgrade() {
                    return existing;
                }
                let dir = Directory::new(location.to_path_buf(), self.ctx.clone());
                occupied.insert(Arc::downgrade(&dir));
                dir
            }
            Entry::Vacant(vacant) => {
                let dir = Directory::new(location.to_path_buf(), self.ctx.clone());
                vacant.insert(Arc::downgrade(&dir));
                dir
            }
        }
    }

    /// Look up an existing instance without creating one.
    #[must_use]
    pub fn get(&self, location: &Path) -> Option<Arc<Directory>> {
        self.directories
            .get(location)
            .and_then(|weak| weak.upgrade())
    }

    /// Drop registry entries whose directory has been torn down.
    pub fn prune(&self) {
        self.directories.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Live directory count (dead entries pruned first).
    #[must_use]
    pub fn len(&self) -> usize {
        self.prune();
        self.directories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
