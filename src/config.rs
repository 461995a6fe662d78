//! Runtime configuration for the bridge.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::Deserialize;

use crate::constants;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Worker threads of the runtime executing asynchronous wire calls.
    pub worker_threads: usize,
    pub thread_name: String,
    /// `env_logger` filter directive; `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            thread_name: constants::DEFAULT_WORKER_THREAD_NAME.to_string(),
            log_filter: constants::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Reads the file named by `CLIENT_BRIDGE_CONFIG`, or returns defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(constants::CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading bridge config {}", path.display()))?;
        let config = Self::from_json(&data)
            .with_context(|| format!("parsing bridge config {}", path.display()))?;
        info!("[Config] Loaded bridge config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_slice(data)?;
        config.validated()
    }

    pub(crate) fn validated(mut self) -> Result<Self> {
        anyhow::ensure!(self.worker_threads > 0, "worker_threads must be at least 1");
        if self.thread_name.trim().is_empty() {
            self.thread_name = constants::DEFAULT_WORKER_THREAD_NAME.to_string();
        }
        Ok(self)
    }
}
