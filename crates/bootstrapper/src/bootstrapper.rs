//! Node bootstrap executor
//!
//! # State machine
//!
//! ```text
//! Idle ──done stamp present──────────────────────────▶ Done
//!  │
//!  └──▶ Running ──load → stamp working → resolve → build → apply → stamp done──▶ Done
//!          ▲                    │ error
//!          └──── wait interval ─┴──▶ Failed
//! ```
//!
//! Every attempt starts from scratch: the config is reloaded and the plan
//! rebuilt. Only the join token survives between attempts, recovered from
//! the runtime config written by the previous attempt.

use crate::error::BootstrapError;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::stamps::{StampStore, write_private};
use bootstrap_plan::{ApplyEngine, ApplyOptions, Plan};
use node_config::ConfigResolver;
use node_planner::{PlanBuilder, plan_file, plan_output_file};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Location of all state written by the bootstrapper.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/nodestrap";

/// Explicit config file, merged after the implicit ones.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/nodestrap/config.yaml";

/// Wait between failed attempts.
pub const DEFAULT_BOOTSTRAP_RETRY_INTERVAL: Duration = Duration::from_secs(15);

/// Attempts per one-time instruction within one apply.
pub const DEFAULT_ONE_TIME_INSTRUCTION_ATTEMPTS: u32 = 5;

/// Bootstrapper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Discard the done stamp and bootstrap again
    pub force: bool,
    /// Stamps, plan and plan output live here
    pub data_dir: PathBuf,
    /// Explicit config file
    pub config_path: PathBuf,
    /// Wait between failed attempts
    pub retry_interval: Duration,
    /// Passed to the apply engine
    pub one_time_instruction_attempts: u32,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            force: false,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            retry_interval: DEFAULT_BOOTSTRAP_RETRY_INTERVAL,
            one_time_instruction_attempts: DEFAULT_ONE_TIME_INSTRUCTION_ATTEMPTS,
        }
    }
}

/// Where the bootstrapper is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Idle,
    Running,
    /// Last attempt failed; waiting to retry
    Failed,
    Done,
}

/// How a bootstrap run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Done stamp was present; nothing was done
    AlreadyBootstrapped,
    /// Config has no role; nothing was done and no done stamp was written
    Skipped,
    /// Plan applied and done stamp written
    Bootstrapped { version: String },
}

/// Brings the node up once and records completion.
pub struct Bootstrapper {
    settings: BootstrapSettings,
    resolver: ConfigResolver,
    planner: PlanBuilder,
    engine: Arc<dyn ApplyEngine>,
    stamps: StampStore,
    state: watch::Sender<BootstrapState>,
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .field("planner", &self.planner)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Bootstrapper {
    /// Creates a bootstrapper in the `Idle` state.
    ///
    /// # Arguments
    ///
    /// * `settings` - Paths, force flag and retry timing
    /// * `resolver` - Loads the node config on every attempt
    /// * `planner` - Builds the plan from the loaded config
    /// * `engine` - Applies the built plan
    pub fn new(
        settings: BootstrapSettings,
        resolver: ConfigResolver,
        planner: PlanBuilder,
        engine: Arc<dyn ApplyEngine>,
    ) -> Self {
        let stamps = StampStore::new(&settings.data_dir);
        Self {
            settings,
            resolver,
            planner,
            engine,
            stamps,
            state: watch::Sender::new(BootstrapState::Idle),
        }
    }

    /// Current state.
    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Stamp files under the data directory.
    pub fn stamps(&self) -> &StampStore {
        &self.stamps
    }

    /// Bootstraps the node, retrying failed attempts until one succeeds or
    /// `cancel` fires.
    ///
    /// Returns immediately if the node is already bootstrapped. Only a
    /// failure to inspect the done stamp or cancellation ends the run with
    /// an error.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<BootstrapOutcome, BootstrapError> {
        if self.settings.force {
            self.stamps.clear_done().await?;
        } else if self.stamps.is_done().await? {
            info!(
                "System is already bootstrapped. To force the system to be bootstrapped again run with the --force flag"
            );
            self.state.send_replace(BootstrapState::Done);
            return Ok(BootstrapOutcome::AlreadyBootstrapped);
        }

        let policy = RetryPolicy::forever(self.settings.retry_interval);
        let outcome = policy
            .run(cancel, move |attempt| async move {
                self.state.send_replace(BootstrapState::Running);
                let result = tokio::select! {
                    result = self.execute(cancel) => result,
                    () = cancel.cancelled() => Err(BootstrapError::Cancelled),
                };
                if let Err(e) = &result {
                    self.state.send_replace(BootstrapState::Failed);
                    if !matches!(e, BootstrapError::Cancelled) {
                        warn!("failed to bootstrap system (attempt {}), will retry: {}", attempt, e);
                    }
                }
                result
            })
            .await;

        match outcome {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::Cancelled => Err(BootstrapError::Cancelled),
            RetryOutcome::ExhaustedRetries { last_error, .. } => Err(last_error),
        }
    }

    /// One attempt: load, stamp, resolve, build, apply, stamp.
    async fn execute(&self, cancel: &CancellationToken) -> Result<BootstrapOutcome, BootstrapError> {
        let mut cfg = self.resolver.load(Some(&self.settings.config_path))?;
        self.stamps.write_working(&cfg).await?;

        if cfg.role.is_empty() {
            warn!("No role defined, skipping bootstrap");
            self.state.send_replace(BootstrapState::Idle);
            return Ok(BootstrapOutcome::Skipped);
        }

        let version = self.planner.versions().resolve(&cfg.kubernetes_version).await?;
        info!("Bootstrapping Kubernetes ({})", version);

        let plan = self.planner.build(&mut cfg, &self.settings.data_dir).await?;
        self.write_plan(&plan).await?;

        let options = ApplyOptions::new(self.settings.data_dir.join("plan").join("work"))
            .with_attempts(self.settings.one_time_instruction_attempts);
        let output = self.engine.apply(&plan, &options, cancel).await?;
        write_private(&plan_output_file(&self.settings.data_dir), &output).await?;

        self.stamps.write_done(&cfg).await?;
        self.state.send_replace(BootstrapState::Done);
        info!("Successfully Bootstrapped Kubernetes ({})", version);
        Ok(BootstrapOutcome::Bootstrapped { version })
    }

    async fn write_plan(&self, plan: &Plan) -> Result<(), BootstrapError> {
        let path = plan_file(&self.settings.data_dir);
        info!("Writing plan file to {}", path.display());
        write_private(&path, &plan.to_json_pretty()?).await
    }
}
