//! Node Planner
//!
//! Turns a resolved node [`Config`](node_config::Config) into a
//! [`Plan`](bootstrap_plan::Plan): the runtime config file, the runtime
//! install, health probes and the bootstrap manifests, in a fixed order.
//!
//! # Example
//!
//! ```no_run
//! use node_config::Config;
//! use node_planner::{PlanBuilder, RuntimeLayout, VersionResolver};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let versions = Arc::new(VersionResolver::new()?);
//! let builder = PlanBuilder::new(versions, RuntimeLayout::default(), std::env::current_exe()?);
//!
//! let mut cfg = Config {
//!     role: "cluster-init".to_string(),
//!     kubernetes_version: "v1.30.4+k3s1".to_string(),
//!     ..Default::default()
//! };
//! let plan = builder.build(&mut cfg, Path::new("/var/lib/nodestrap")).await?;
//! println!("{} file(s), token {}", plan.files.len(), cfg.token);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod error;
pub mod images;
pub mod layout;
pub mod probes;
pub mod resources;
pub mod runtime;
pub mod runtime_config;
pub mod token;
pub mod version;

pub use builder::PlanBuilder;
pub use error::{PlanError, TokenError, VersionError};
pub use images::installer_image;
pub use layout::{bootstrap_manifest_path, plan_file, plan_output_file, RuntimeLayout};
pub use runtime::Runtime;
pub use token::{generate_token, TokenManager};
pub use version::VersionResolver;
