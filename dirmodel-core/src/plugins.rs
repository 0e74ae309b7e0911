//! `src/plugins.rs`
//! ============================================================================
//! # Extension Info Providers
//!
//! Third-party capabilities that contribute extra per-file attributes. The
//! engine invokes registered providers sequentially per file and awaits each
//! one; synchronous completion, synchronous failure and asynchronous
//! completion all collapse into future readiness. One provider failing never
//! blocks the remaining providers.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use compact_str::CompactString;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::model::file_entry::FileSnapshot;

/// Attributes a provider contributes for one file.
#[derive(Debug, Clone, Default)]
pub struct InfoPatch {
    pub attributes: Vec<(CompactString, CompactString)>,
}

impl InfoPatch {
    #[must_use]
    pub fn single(key: &str, value: &str) -> Self {
        Self {
            attributes: vec![(CompactString::new(key), CompactString::new(value))],
        }
    }
}

#[async_trait]
pub trait InfoProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Produce extra attributes for `file`. Cancellation is observed through
    /// `token`; a cancelled provider run is discarded silently.
    async fn update_file_info(
        &self,
        file: &FileSnapshot,
        token: &CancellationToken,
    ) -> CoreResult<InfoPatch>;
}

/// Registry of providers, in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn InfoProvider>>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn InfoProvider>) {
        self.providers
            .write()
            .expect("provider registry poisoned")
            .push(provider);
    }

    /// Snapshot of the current provider list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn InfoProvider>> {
        self.providers
            .read()
            .expect("provider registry poisoned")
            .clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers
            .read()
            .expect("provider registry poisoned")
            .is_empty()
    }
}
