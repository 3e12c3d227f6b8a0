//! Mock apply engine for unit testing
//!
//! Records every plan it is given and can be scripted to fail a fixed
//! number of calls before succeeding, without touching the machine.

use crate::engine::{ApplyEngine, ApplyOptions};
use crate::error::ApplyError;
use crate::types::Plan;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Mock ApplyEngine for testing
#[derive(Clone, Default)]
pub struct MockApplyEngine {
    applied: Arc<Mutex<Vec<(Plan, ApplyOptions)>>>,
    failures_remaining: Arc<Mutex<u32>>,
    output: Vec<u8>,
}

impl MockApplyEngine {
    /// Create a mock that always succeeds with empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with an instruction error
    #[must_use]
    pub fn failing(self, count: u32) -> Self {
        if let Ok(mut remaining) = self.failures_remaining.lock() {
            *remaining = count;
        }
        self
    }

    /// Output returned by successful calls
    #[must_use]
    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = output.into();
        self
    }

    /// Number of apply calls, including failed ones
    pub fn calls(&self) -> usize {
        self.applied.lock().map(|a| a.len()).unwrap_or_default()
    }

    /// Plans passed to apply, in call order
    pub fn applied_plans(&self) -> Vec<Plan> {
        self.applied
            .lock()
            .map(|a| a.iter().map(|(plan, _)| plan.clone()).collect())
            .unwrap_or_default()
    }

    /// Options passed to the most recent apply call
    pub fn last_options(&self) -> Option<ApplyOptions> {
        self.applied
            .lock()
            .ok()
            .and_then(|a| a.last().map(|(_, options)| options.clone()))
    }
}

impl std::fmt::Debug for MockApplyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockApplyEngine")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ApplyEngine for MockApplyEngine {
    async fn apply(
        &self,
        plan: &Plan,
        options: &ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ApplyError> {
        if cancel.is_cancelled() {
            return Err(ApplyError::Cancelled);
        }
        if let Ok(mut applied) = self.applied.lock() {
            applied.push((plan.clone(), options.clone()));
        }

        let fail = match self.failures_remaining.lock() {
            Ok(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(ApplyError::Instruction {
                name: "mock".to_string(),
                attempts: options.one_time_instruction_attempts,
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }

        Ok(self.output.clone())
    }
}
