//! Plan apply and probe errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while applying a plan
#[derive(Debug, Error)]
pub enum ApplyError {
    /// Filesystem error on a plan file or the working directory
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File content in the plan is not valid base64
    #[error("invalid base64 content for {path}: {source}")]
    Content {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    /// Instruction has neither a command nor an image
    #[error("instruction {0} has no command or image to run")]
    EmptyInstruction(String),

    /// Instruction could not be spawned
    #[error("failed to spawn instruction {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Instruction ran and exited unsuccessfully on every attempt
    #[error("instruction {name} failed after {attempts} attempt(s) ({status}): {stderr}")]
    Instruction {
        name: String,
        attempts: u32,
        status: String,
        stderr: String,
    },

    /// Output serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Apply was cancelled
    #[error("apply cancelled")]
    Cancelled,
}

/// Errors that can occur while running plan probes
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Plan file could not be read
    #[error("reading plan file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plan file is not a valid plan
    #[error("parsing plan file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// TLS material referenced by a probe could not be loaded
    #[error("loading TLS material for probe {probe} from {path}: {reason}")]
    Tls {
        probe: String,
        path: String,
        reason: String,
    },

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Probing was cancelled before all probes became healthy
    #[error("probes cancelled")]
    Cancelled,
}
