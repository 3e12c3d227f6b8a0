//! Installer image references

use crate::runtime::Runtime;

/// Installer image prefix used when no registry is configured.
pub const DEFAULT_INSTALLER_IMAGE_PREFIX: &str = "rancher/system-agent-installer";

/// Installer image for the runtime of `version`.
///
/// `image_override` wins when set. Otherwise the image is
/// `<prefix>-<runtime>:<tag>`, where the prefix is `registry` or
/// `rancher/system-agent-installer` when that is empty, and the tag is
/// `version` with `+` replaced by `-`, or `latest`.
pub fn installer_image(image_override: &str, registry: &str, version: &str) -> String {
    if !image_override.is_empty() {
        return image_override.to_string();
    }

    let prefix = match registry.trim_end_matches('/') {
        "" => DEFAULT_INSTALLER_IMAGE_PREFIX,
        registry => registry,
    };
    let tag = match version.replace('+', "-") {
        tag if tag.is_empty() => "latest".to_string(),
        tag => tag,
    };
    format!("{}-{}:{}", prefix, Runtime::detect(version), tag)
}
