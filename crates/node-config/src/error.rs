//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving node configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid YAML
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config file parsed, but its top level is not a mapping
    #[error("{0} does not contain a YAML mapping")]
    NotAMapping(PathBuf),

    /// The merged values do not fit the typed configuration
    #[error("decoding merged configuration: {0}")]
    Decode(#[source] serde_yaml::Error),

    /// The role is set but is not one of the known roles
    #[error("invalid role ({0}) defined")]
    UnknownRole(String),
}
