//! Plan data model
//!
//! Every collection is an ordered `Vec` or a `BTreeMap` so that the JSON
//! encoding of a plan depends only on its content.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The execution artifact handed to an [`ApplyEngine`](crate::ApplyEngine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Files to write, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,

    /// Instructions run once per apply, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_time_instructions: Vec<OneTimeInstruction>,

    /// Instructions run on every apply pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub periodic_instructions: Vec<PeriodicInstruction>,

    /// Named health checks
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub probes: BTreeMap<String, Probe>,
}

impl Plan {
    /// Pretty JSON encoding used for the on-disk plan file.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        Ok(data)
    }

    /// Parses a plan previously written with [`Plan::to_json_pretty`].
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// A file to place on disk. `content` is base64 encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Absolute destination path
    pub path: String,
    #[serde(default)]
    pub content: String,
}

impl File {
    /// Builds a file entry from raw bytes.
    pub fn from_bytes(path: impl Into<String>, data: &[u8]) -> Self {
        Self {
            path: path.into(),
            content: STANDARD.encode(data),
        }
    }

    /// Decodes the base64 content.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.content.as_bytes())
    }
}

/// An instruction run once per apply.
///
/// Either `command` is spawned with `args`, or, when only `image` is set,
/// the image is handed to the engine's installer runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeInstruction {
    /// Identifies the instruction in logs and in the apply output
    #[serde(default)]
    pub name: String,

    /// Executable to spawn
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// `KEY=value` pairs added to the process environment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// Installer image used when no command is set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Whether stdout is captured into the apply output
    #[serde(default)]
    pub save_output: bool,
}

/// An instruction run on every apply pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicInstruction {
    #[serde(flatten)]
    pub instruction: OneTimeInstruction,

    /// Minimum seconds between runs
    #[serde(default)]
    pub period_seconds: u64,
}

/// A named HTTP health check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probe {
    /// Seconds after start before the first check
    #[serde(default)]
    pub initial_delay_seconds: u64,

    /// Per-request timeout; zero means 5 seconds
    #[serde(default)]
    pub timeout_seconds: u64,

    /// Consecutive successes to become healthy
    #[serde(default)]
    pub success_threshold: u32,

    /// Consecutive failures to become unhealthy
    #[serde(default)]
    pub failure_threshold: u32,

    pub http_get: HttpGetAction,
}

/// Target of a [`Probe`]. Certificate fields are file paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetAction {
    pub url: String,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure: bool,

    /// Client certificate, used together with `client_key`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_cert: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_key: String,

    /// Additional trusted CA bundle
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_cert: String,
}
