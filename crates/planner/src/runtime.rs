//! Kubernetes distribution detection

use std::fmt;

const K3S_KUBECTL: &str = "/usr/local/bin/kubectl";

/// The Kubernetes distribution installed on the node, derived from the
/// resolved version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    K3s,
    Unknown,
}

impl Runtime {
    /// `v1.30.4+k3s1` is k3s; anything else is unknown.
    pub fn detect(version: &str) -> Self {
        if version.contains("k3s") {
            Self::K3s
        } else {
            Self::Unknown
        }
    }

    /// Runtime name used in paths and image names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::K3s => "k3s",
            Self::Unknown => "unknown",
        }
    }

    /// kubectl binary used for bootstrap manifests.
    pub fn kubectl_command(self) -> &'static str {
        match self {
            Self::K3s => K3S_KUBECTL,
            Self::Unknown => "kubectl",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
