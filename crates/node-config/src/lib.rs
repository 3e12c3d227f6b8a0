//! Node Configuration
//!
//! The resolved desired state of a node and the resolver that assembles it
//! from layered YAML files:
//! - discovered manifests become opaque `resources`
//! - well-known implicit files (and their `.d/` fragments) are merged in order
//! - an explicit file is merged last, with highest precedence
//!
//! Merging overwrites scalars and concatenates sequences.

pub mod error;
pub mod merge;
pub mod resolver;
pub mod types;

pub use error::ConfigError;
pub use merge::merge_concat_slice;
pub use resolver::{ConfigResolver, ResolverPaths, NAMESPACE_KEY};
pub use types::*;
