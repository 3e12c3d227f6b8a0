//! Bootstrapper
//!
//! Drives a node from configuration to a running cluster member exactly
//! once: [`Bootstrapper`] resolves the config, builds the plan, hands it to an
//! [`ApplyEngine`](bootstrap_plan::ApplyEngine) and records completion in a
//! done stamp, retrying failed attempts until cancelled.
//!
//! [`RetryRunner`] is the command-level retry primitive behind the
//! `retry` subcommand, and [`collect_info`] backs `info`.

pub mod bootstrapper;
pub mod error;
pub mod info;
pub mod retry;
pub mod stamps;

pub use bootstrapper::{
    BootstrapOutcome, BootstrapSettings, BootstrapState, Bootstrapper, DEFAULT_CONFIG_FILE,
    DEFAULT_DATA_DIR,
};
pub use error::{BootstrapError, RetryError};
pub use info::{collect_info, InstallInfo};
pub use retry::{RetryOutcome, RetryPolicy, RetryRunner, DEFAULT_RETRY_INTERVAL, SLEEP_FIRST_DELAY};
pub use stamps::StampStore;
