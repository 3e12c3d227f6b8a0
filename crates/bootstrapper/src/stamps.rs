//! Done and working stamps
//!
//! Both stamps are YAML snapshots of a [`Config`]. The done stamp marks the
//! node as bootstrapped; the working stamp records the last attempted
//! config for diagnostics only.

use crate::error::BootstrapError;
use node_config::Config;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

const DONE_STAMP: &str = "bootstrapped";
const WORKING_STAMP: &str = "working";

/// Stamp files under a data directory.
#[derive(Debug, Clone)]
pub struct StampStore {
    data_dir: PathBuf,
}

impl StampStore {
    /// Stamps kept directly under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Written after a successful apply.
    pub fn done_path(&self) -> PathBuf {
        self.data_dir.join(DONE_STAMP)
    }

    /// Written at the start of every attempt.
    pub fn working_path(&self) -> PathBuf {
        self.data_dir.join(WORKING_STAMP)
    }

    /// Whether the done stamp exists.
    pub async fn is_done(&self) -> Result<bool, BootstrapError> {
        let path = self.done_path();
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(BootstrapError::CheckDone { path, source }),
        }
    }

    /// Removes the done stamp; a missing stamp is not an error.
    pub async fn clear_done(&self) -> Result<(), BootstrapError> {
        let path = self.done_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed done stamp {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(BootstrapError::CheckDone { path, source }),
        }
    }

    /// Records the config of the attempt being made.
    pub async fn write_working(&self, cfg: &Config) -> Result<(), BootstrapError> {
        write_config(&self.working_path(), cfg).await
    }

    /// Marks the node as bootstrapped with `cfg`.
    pub async fn write_done(&self, cfg: &Config) -> Result<(), BootstrapError> {
        write_config(&self.done_path(), cfg).await
    }

    /// Config recorded by the last successful bootstrap, if any.
    pub async fn read_done(&self) -> Result<Option<Config>, BootstrapError> {
        let path = self.done_path();
        match tokio::fs::read(&path).await {
            Ok(data) => serde_yaml::from_slice(&data)
                .map(Some)
                .map_err(|source| BootstrapError::DecodeStamp { path, source }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BootstrapError::CheckDone { path, source }),
        }
    }
}

/// Writes `data` to `path` with owner-only permissions, creating parents.
pub(crate) async fn write_private(path: &Path, data: &[u8]) -> Result<(), BootstrapError> {
    let write_err = |source| BootstrapError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let mut out = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .await
        .map_err(write_err)?;
    out.write_all(data).await.map_err(write_err)?;
    out.flush().await.map_err(write_err)
}

async fn write_config(path: &Path, cfg: &Config) -> Result<(), BootstrapError> {
    let data = serde_yaml::to_string(cfg)?;
    write_private(path, data.as_bytes()).await
}
