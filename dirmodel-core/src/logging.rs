//! `src/logging.rs`
//! ============================================================================
//! # Tracing Initialisation
//!
//! Structured logging for the engine: significant events carry `marker` and
//! `operation_type` fields so downstream tooling can group by concern.
//! Console output goes through a fmt layer filtered by `RUST_LOG` (falling
//! back to the configured level); an optional daily-rolling file appender
//! captures the same stream without blocking the runtime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use compact_str::CompactString;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub log_to_file: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("dirmodel"),
            log_level: CompactString::const_new("info"),
            log_to_file: false,
        }
    }
}

pub struct Logger;

impl Logger {
    /// Install the global subscriber. Returns the appender guard that must
    /// be kept alive for file logging to flush.
    pub fn init(config: &LoggerConfig) -> Result<Option<WorkerGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

        let console = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true);

        if config.log_to_file {
            std::fs::create_dir_all(&config.log_dir)
                .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;

            let appender = RollingFileAppender::new(
                Rotation::DAILY,
                &config.log_dir,
                config.log_file_prefix.as_str(),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(filter)
                .with(console.and_then(file_layer))
                .try_init()
                .context("logger already initialised")?;

            Ok(Some(guard))
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
                .context("logger already initialised")?;

            Ok(None)
        }
    }
}
