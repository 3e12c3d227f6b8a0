//! Bootstrapper error types.

use bootstrap_plan::ApplyError;
use node_config::ConfigError;
use node_planner::{PlanError, VersionError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from [`RetryRunner`](crate::RetryRunner).
#[derive(Debug, Error)]
pub enum RetryError {
    /// No command was given
    #[error("no command given to retry")]
    EmptyCommand,

    /// Cancelled before the command succeeded
    #[error("retry cancelled")]
    Cancelled,

    /// A bounded policy ran out of attempts
    #[error("command [{command}] failed after {attempts} attempt(s): {reason}")]
    Exhausted {
        command: String,
        attempts: u32,
        reason: String,
    },
}

/// Errors that can occur while bootstrapping a node.
///
/// Every variant except [`BootstrapError::Cancelled`] and
/// [`BootstrapError::CheckDone`] ends only the current attempt.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The done stamp could not be inspected
    #[error("checking done stamp [{path}]: {source}")]
    CheckDone {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be resolved
    #[error("loading config: {0}")]
    Config(#[from] ConfigError),

    /// A stamp or plan file could not be written
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stamp could not be encoded
    #[error("encoding stamp: {0}")]
    Encode(#[from] serde_yaml::Error),

    /// The done stamp exists but is not a valid config
    #[error("decoding stamp [{path}]: {source}")]
    DecodeStamp {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The plan file could not be encoded
    #[error("encoding plan: {0}")]
    EncodePlan(#[from] serde_json::Error),

    #[error(transparent)]
    Version(#[from] VersionError),

    /// Plan could not be built
    #[error("generating plan: {0}")]
    Plan(#[from] PlanError),

    /// The apply engine failed
    #[error("running plan: {0}")]
    Apply(#[source] ApplyError),

    /// Kubeconfig could not be loaded
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Cancelled; never retried
    #[error("bootstrap cancelled")]
    Cancelled,
}

impl From<ApplyError> for BootstrapError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Cancelled => Self::Cancelled,
            other => Self::Apply(other),
        }
    }
}
