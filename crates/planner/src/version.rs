//! Kubernetes version and channel resolution
//!
//! Concrete versions pass through untouched. Channel names such as `stable`
//! or `v1.30` are looked up against the release channel server, which answers
//! with a redirect whose last path segment is the concrete version. Channel
//! lookups are cached for the life of the resolver.

use crate::error::VersionError;
use reqwest::{Client, redirect};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Channel used when no version is configured.
pub const DEFAULT_CHANNEL: &str = "stable";

/// `{channel}` is replaced by the channel name.
pub const DEFAULT_CHANNEL_URL_TEMPLATE: &str = "https://update.k3s.io/v1-release/channels/{channel}";

const HEAD_SUFFIX: &str = "-head";
const RUNTIME_SUFFIX: &str = ":k3s";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves versions and channels, caching channel lookups in memory.
///
/// Construct once per process and share it behind an `Arc`.
#[derive(Debug)]
pub struct VersionResolver {
    client: Client,
    url_template: String,
    cache: Mutex<HashMap<String, String>>,
}

impl VersionResolver {
    /// Resolver against the public k3s channel server.
    pub fn new() -> Result<Self, VersionError> {
        Self::with_channel_url_template(DEFAULT_CHANNEL_URL_TEMPLATE)
    }

    /// Resolver against a custom channel server.
    pub fn with_channel_url_template(template: impl Into<String>) -> Result<Self, VersionError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url_template: template.into(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Resolves `requested` to a concrete version string.
    pub async fn resolve(&self, requested: &str) -> Result<String, VersionError> {
        // Held across the lookup so concurrent callers share one request.
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(requested) {
            debug!("Using cached version {} for [{}]", cached, requested);
            return Ok(cached.clone());
        }

        let channel_url = match classify(requested, &self.url_template) {
            Requested::Resolved(version) => return Ok(version),
            Requested::Channel(url) => url,
        };

        let resolved = self.lookup(&channel_url).await?;
        info!(
            "Resolving Kubernetes version [{}] to {} from {}",
            requested, resolved, channel_url
        );
        cache.insert(requested.to_string(), resolved.clone());
        Ok(resolved)
    }

    async fn lookup(&self, channel_url: &str) -> Result<String, VersionError> {
        let response = self
            .client
            .get(channel_url)
            .send()
            .await
            .map_err(|source| VersionError::Request {
                url: channel_url.to_string(),
                source,
            })?;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| VersionError::MissingLocation {
                url: channel_url.to_string(),
                status: response.status().as_u16(),
            })?;

        let invalid = || VersionError::InvalidLocation {
            url: channel_url.to_string(),
            location: location.to_string(),
        };
        let target = response.url().join(location).map_err(|_| invalid())?;
        target
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .map(str::to_string)
            .ok_or_else(invalid)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Requested {
    /// Usable as-is
    Resolved(String),
    /// Needs a lookup at this URL
    Channel(String),
}

fn classify(requested: &str, url_template: &str) -> Requested {
    let version = requested.strip_suffix(RUNTIME_SUFFIX).unwrap_or(requested);
    let version = if version.is_empty() { DEFAULT_CHANNEL } else { version };

    if version.starts_with('v') && version.split('.').count() > 2 {
        return Requested::Resolved(version.to_string());
    }
    if version.starts_with("http://")
        || version.starts_with("https://")
        || version.contains('/')
        || version.ends_with(HEAD_SUFFIX)
    {
        return Requested::Resolved(version.to_string());
    }

    Requested::Channel(url_template.replace("{channel}", version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_default(requested: &str) -> Requested {
        classify(requested, DEFAULT_CHANNEL_URL_TEMPLATE)
    }

    #[test]
    fn test_concrete_versions_pass_through() {
        assert_eq!(
            classify_default("v1.28.0+k3s1"),
            Requested::Resolved("v1.28.0+k3s1".to_string())
        );
        assert_eq!(
            classify_default("v1.28.0+k3s1:k3s"),
            Requested::Resolved("v1.28.0+k3s1".to_string())
        );
    }

    #[test]
    fn test_head_and_paths_are_already_resolved() {
        assert_eq!(
            classify_default("v1.30-head"),
            Requested::Resolved("v1.30-head".to_string())
        );
        assert_eq!(
            classify_default("registry.local/k3s"),
            Requested::Resolved("registry.local/k3s".to_string())
        );
        assert_eq!(
            classify_default("https://example.com/channels/stable"),
            Requested::Resolved("https://example.com/channels/stable".to_string())
        );
    }

    #[test]
    fn test_channels_map_to_lookup_url() {
        assert_eq!(
            classify_default(""),
            Requested::Channel("https://update.k3s.io/v1-release/channels/stable".to_string())
        );
        assert_eq!(
            classify_default("v1.30"),
            Requested::Channel("https://update.k3s.io/v1-release/channels/v1.30".to_string())
        );
        assert_eq!(
            classify_default("latest:k3s"),
            Requested::Channel("https://update.k3s.io/v1-release/channels/latest".to_string())
        );
    }
}
