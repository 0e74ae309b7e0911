//! `src/config.rs`
//! ============================================================================
//! # Settings: Preference Service for the Directory Model
//!
//! Typed key-value preferences consumed by the fetchers (hidden-file policy,
//! link-trust data directories, thumbnail policy, leading-text caps), loaded
//! and saved as TOML from the proper cross-platform config path using the
//! [`directories`](https://docs.rs/directories) crate, with a
//! `tokio::sync::watch` change-notification signal.

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::fs as TokioFs;
use tokio::sync::watch;
use tracing::info;

use crate::error::{CoreError, CoreResult};

/// Byte/line caps for leading-text extraction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextCaps {
    pub max_bytes: usize,
    pub max_lines: usize,
}

/// All user-editable preferences the engine reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsData {
    /// Whether hidden entries count toward shallow directory counts.
    pub show_hidden_files: bool,

    /// Whether backup entries (`name~`) count toward shallow counts.
    pub show_backup_files: bool,

    /// Opt-in synchronous link-content reads for local non-directory files.
    /// Deliberately off by default; the async path is the norm.
    pub sync_link_reads: bool,

    /// Permit one decode retry from the original file when the cached
    /// thumbnail is missing, stale, or undecodable.
    pub thumbnail_original_fallback: bool,

    /// Longer-side pixel cap handed to the decoder.
    pub max_thumbnail_dimension: u32,

    /// Directories under which link files are considered system-provided
    /// and therefore trusted.
    pub system_data_dirs: Vec<PathBuf>,

    pub text_caps: TextCaps,
    pub large_text_caps: TextCaps,
}

impl Default for SettingsData {
    fn default() -> Self {
        Self {
            show_hidden_files: false,
            show_backup_files: false,
            sync_link_reads: false,
            thumbnail_original_fallback: true,
            max_thumbnail_dimension: 256,
            system_data_dirs: vec![
                PathBuf::from("/usr/share"),
                PathBuf::from("/usr/local/share"),
            ],
            text_caps: TextCaps {
                max_bytes: 1024,
                max_lines: 24,
            },
            large_text_caps: TextCaps {
                max_bytes: 10 * 1024,
                max_lines: 80,
            },
        }
    }
}

/// Shared settings service: snapshot reads, guarded updates, and a watch
/// channel so long-lived observers can react to preference changes.
#[derive(Debug)]
pub struct Settings {
    tx: watch::Sender<SettingsData>,
}

impl Settings {
    #[must_use]
    pub fn new(data: SettingsData) -> Self {
        let (tx, _rx) = watch::channel(data);
        Self { tx }
    }

    /// Current snapshot. Cheap clone; fetch tasks capture one per fetch so a
    /// mid-flight preference change never splits one operation's policy.
    #[must_use]
    pub fn get(&self) -> SettingsData {
        self.tx.borrow().clone()
    }

    /// Apply a mutation and notify watchers.
    pub fn update(&self, f: impl FnOnce(&mut SettingsData)) {
        self.tx.send_modify(f);
    }

    /// Subscribe to preference changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SettingsData> {
        self.tx.subscribe()
    }

    fn config_file() -> CoreResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "dirmodel", "dirmodel")
            .ok_or_else(|| CoreError::Config("no valid home directory".into()))?;

        Ok(dirs.config_dir().join("settings.toml"))
    }

    /// Load settings from the platform config path, defaulting when the
    /// file does not exist yet.
    pub async fn load() -> CoreResult<Self> {
        let path = Self::config_file()?;

        let data = match TokioFs::read_to_string(&path).await {
            Ok(raw) => toml::from_str(&raw)
                .map_err(|e| CoreError::Config(format!("parse {}: {e}", path.display()).into()))?,

            Err(_) => {
                info!(
                    marker = "SETTINGS",
                    operation_type = "settings_default",
                    path = %path.display(),
                    "No settings file found, using defaults"
                );
                SettingsData::default()
            }
        };

        Ok(Self::new(data))
    }

    /// Persist the current snapshot.
    pub async fn save(&self) -> CoreResult<()> {
        let path = Self::config_file()?;

        if let Some(parent) = path.parent() {
            TokioFs::create_dir_all(parent).await?;
        }

        let raw = toml::to_string_pretty(&self.get())
            .map_err(|e| CoreError::Config(format!("serialize settings: {e}").into()))?;

        TokioFs::write(&path, raw).await?;

        info!(
            marker = "SETTINGS",
            operation_type = "settings_saved",
            path = %path.display(),
            "Settings saved"
        );

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new(SettingsData::default())
    }
}
