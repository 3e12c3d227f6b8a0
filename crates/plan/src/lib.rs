//! Bootstrap Plan
//!
//! The deterministic, serializable artifact describing every side effect
//! needed to bring a node up, plus the seam through which it is applied.
//!
//! # Example
//!
//! ```no_run
//! use bootstrap_plan::{ApplyEngine, ApplyOptions, File, LocalApplyEngine, Plan};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut plan = Plan::default();
//! plan.files.push(File::from_bytes("/etc/motd", b"welcome\n"));
//!
//! let engine = LocalApplyEngine::default();
//! let options = ApplyOptions::new("/var/lib/nodestrap/plan/work");
//! let output = engine.apply(&plan, &options, &CancellationToken::new()).await?;
//! # let _ = output;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Plan model**: files, one-time instructions, periodic instructions, probes
//! - **Apply contract**: the [`ApplyEngine`] trait consumed by the bootstrapper
//! - **Local engine**: a single-machine implementation of the contract
//! - **Probes**: polling HTTP health checks read back from a written plan file

pub mod engine;
pub mod error;
pub mod local;
pub mod probe;
pub mod types;
#[cfg(feature = "test-util")]
pub mod mock;

pub use engine::{ApplyEngine, ApplyOptions};
pub use error::{ApplyError, ProbeError};
pub use local::LocalApplyEngine;
pub use probe::{run_probes, ProbeRunner};
pub use types::*;
#[cfg(feature = "test-util")]
pub use mock::MockApplyEngine;
