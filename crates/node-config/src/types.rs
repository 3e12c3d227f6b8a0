//! Node configuration types
//!
//! Field names follow the camelCase keys operators write in config files.

use crate::error::ConfigError;
use bootstrap_plan::OneTimeInstruction;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fmt;

/// The intended function of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// First control-plane node; creates the cluster
    ClusterInit,
    /// Additional control-plane node joining an existing cluster
    ControlPlane,
    /// Workload-only node
    Worker,
    /// Datastore-only node
    Etcd,
}

impl Role {
    /// Parses a role name as written in config files.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "cluster-init" => Ok(Self::ClusterInit),
            "control-plane" => Ok(Self::ControlPlane),
            "worker" => Ok(Self::Worker),
            "etcd" => Ok(Self::Etcd),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }

    /// Name of the role as written in the config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClusterInit => "cluster-init",
            Self::ControlPlane => "control-plane",
            Self::Worker => "worker",
            Self::Etcd => "etcd",
        }
    }

    /// Whether the node runs the Kubernetes control plane components.
    pub fn is_control_plane(self) -> bool {
        matches!(self, Self::ClusterInit | Self::ControlPlane)
    }

    /// Whether the node runs the runtime in agent mode.
    pub fn is_agent(self) -> bool {
        matches!(self, Self::Worker)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved desired state for this node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Join URL of an existing cluster; empty for cluster-init
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,

    /// One of `cluster-init`, `control-plane`, `worker`, `etcd`; empty skips bootstrap
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,

    /// Extra subject alternative names for the API server certificate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tls_sans: Vec<String>,

    /// Node name; the short host name when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,

    /// Advertised node address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// Internal node address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub internal_address: String,

    /// Taints registered with the node, `key=value:Effect`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taints: Vec<String>,

    /// Labels registered with the node, `key=value`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Cluster join secret
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,

    /// Runtime-specific keys passed through verbatim
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub extra_config: Mapping,

    /// Concrete version, channel name, or channel URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,

    /// Run before the runtime is installed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_instructions: Vec<OneTimeInstruction>,

    /// Run after the bootstrap manifests are applied
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_instructions: Vec<OneTimeInstruction>,

    /// Manifests applied once the cluster is up
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Mapping>,

    /// Overrides the computed runtime installer image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime_installer_image: String,

    /// Image prefix for the runtime installer, replacing
    /// `rancher/system-agent-installer`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_default_registry: String,

    /// Private registry settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registries: Option<Registry>,
}

impl Config {
    /// The parsed role, or `None` when no role is set.
    pub fn role(&self) -> Result<Option<Role>, ConfigError> {
        if self.role.is_empty() {
            return Ok(None);
        }
        Role::parse(&self.role).map(Some)
    }
}

/// Private registry configuration written to the runtime's registries file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Mirror endpoints keyed by the registry they stand in for
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mirrors: BTreeMap<String, Mirror>,

    /// Auth and TLS settings keyed by registry host
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, RegistryConfig>,
}

/// Endpoints serving a mirrored registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    /// Tried in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoint: Vec<String>,

    /// Repository rewrite rules, regex to replacement
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rewrite: BTreeMap<String, String>,
}

/// Per-registry credentials and TLS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

/// Registry credentials. Only one of the forms is normally set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Base64 `username:password`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,

    /// Bearer token; also read from `identitytoken`
    #[serde(default, alias = "identitytoken", skip_serializing_if = "String::is_empty")]
    pub identity_token: String,
}

/// Client TLS settings for a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca_file: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cert_file: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_file: String,

    /// Skip server certificate verification
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_known_roles() {
        for name in ["cluster-init", "control-plane", "worker", "etcd"] {
            assert_eq!(Role::parse(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn test_role_parse_rejects_typos() {
        let err = Role::parse("control_plane").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownRole(r) if r == "control_plane"));
    }

    #[test]
    fn test_empty_role_means_skip() {
        assert_eq!(Config::default().role().unwrap(), None);
    }

    #[test]
    fn test_config_decodes_camel_case_keys() {
        let yaml = r"
role: worker
server: https://10.0.0.1:6443
nodeName: node-a
tlsSans: [a.example.com]
extraConfig:
  kubelet-arg: [max-pods=200]
preInstructions:
  - name: prep
    command: /bin/true
registries:
  mirrors:
    docker.io:
      endpoint: [https://mirror.local]
";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.role().unwrap(), Some(Role::Worker));
        assert_eq!(cfg.node_name, "node-a");
        assert_eq!(cfg.tls_sans, vec!["a.example.com"]);
        assert_eq!(cfg.pre_instructions[0].name, "prep");
        assert!(cfg.extra_config.contains_key("kubelet-arg"));
        let mirrors = &cfg.registries.unwrap().mirrors;
        assert_eq!(mirrors["docker.io"].endpoint, vec!["https://mirror.local"]);
    }

    #[test]
    fn test_config_serializes_without_empty_fields() {
        let cfg = Config {
            role: "cluster-init".to_string(),
            ..Default::default()
        };
        assert_eq!(serde_yaml::to_string(&cfg).unwrap(), "role: cluster-init\n");
    }
}
