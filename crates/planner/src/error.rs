//! Plan building errors

use node_config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving a version channel
#[derive(Debug, Error)]
pub enum VersionError {
    /// HTTP client construction error
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Channel lookup request failed
    #[error("getting channel version from ({url}): {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Channel endpoint answered without a redirect location
    #[error("getting channel version URL from ({url}): no Location header in {status} response")]
    MissingLocation { url: String, status: u16 },

    /// Redirect location has no usable last path segment
    #[error("channel ({url}) redirected to unusable location {location}")]
    InvalidLocation { url: String, location: String },
}

/// Errors that can occur while recovering or creating the join token
#[derive(Debug, Error)]
pub enum TokenError {
    /// Persisted runtime config exists but could not be read
    #[error("reading runtime config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted runtime config is not valid YAML
    #[error("parsing runtime config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that can occur while building a plan
#[derive(Debug, Error)]
pub enum PlanError {
    /// Configuration is invalid (e.g. unknown role)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Config has no role to plan for
    #[error("no role defined in config")]
    MissingRole,

    /// Joining node has no server URL
    #[error("server is required in config for all roles besides cluster-init")]
    MissingServer,

    /// Joining node has no token
    #[error("token is required in config for all roles besides cluster-init")]
    MissingToken,

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Token(#[from] TokenError),

    /// A generated document could not be encoded
    #[error("rendering {what}: {source}")]
    Render {
        what: &'static str,
        #[source]
        source: serde_yaml::Error,
    },

    /// Host name lookup for the Node object failed
    #[error("looking up hostname: {0}")]
    Hostname(#[source] std::io::Error),
}

impl PlanError {
    /// Whether the error comes from the config itself rather than the environment.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingRole | Self::MissingServer | Self::MissingToken
        )
    }
}
