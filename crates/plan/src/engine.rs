//! Apply engine contract
//!
//! The bootstrapper never touches the machine directly: it hands a finished
//! [`Plan`] to an implementation of [`ApplyEngine`]. This trait is the only
//! coupling point, which keeps the orchestration testable with a mock.

use crate::error::ApplyError;
use crate::types::Plan;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Per-apply execution limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Scratch directory for instruction working state
    pub work_dir: PathBuf,

    /// Maximum attempts per one-time instruction
    pub one_time_instruction_attempts: u32,

    /// Whether one-time instructions run at all
    pub run_one_time_instructions: bool,

    /// Skip rewriting files whose on-disk content already matches
    pub reconcile_files: bool,
}

impl ApplyOptions {
    /// Options used by the bootstrapper: run everything, 5 attempts, reconcile files.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            one_time_instruction_attempts: 5,
            run_one_time_instructions: true,
            reconcile_files: true,
        }
    }

    /// Sets the attempts per one-time instruction; at least one.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.one_time_instruction_attempts = attempts.max(1);
        self
    }
}

/// Executes a plan against the local machine.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ApplyEngine: Send + Sync {
    /// Applies `plan` and returns the captured instruction output.
    async fn apply(
        &self,
        plan: &Plan,
        options: &ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ApplyError>;
}
