//! Installation info
//!
//! Read-only summary of what is configured and what is running. Nothing
//! here writes to disk, and failures only leave fields empty.

use crate::error::BootstrapError;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as KubeConfig};
use node_config::ConfigResolver;
use node_planner::{PlanBuilder, Runtime};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

const CONTROL_PLANE_SELECTOR: &str = "node-role.kubernetes.io/control-plane=true";

/// Versions configured for and installed on this node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallInfo {
    /// Version of this binary
    pub agent_version: String,
    /// Version or channel as written in the config
    pub configured_version: String,
    /// Concrete version the configured one resolves to
    pub resolved_version: Option<String>,
    /// Runtime of the resolved version
    pub runtime: Option<Runtime>,
    /// Kubelet version reported by a control-plane node
    pub kubelet_version: Option<String>,
}

impl fmt::Display for InstallInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_unknown = |value: Option<&str>| value.filter(|v| !v.is_empty()).unwrap_or("unknown").to_string();
        writeln!(f, "Agent version: {}", self.agent_version)?;
        writeln!(
            f,
            "Configured Kubernetes version: {}",
            or_unknown(Some(self.configured_version.as_str()))
        )?;
        writeln!(
            f,
            "Resolved Kubernetes version: {}",
            or_unknown(self.resolved_version.as_deref())
        )?;
        writeln!(f, "Runtime: {}", or_unknown(self.runtime.map(Runtime::as_str)))?;
        writeln!(f, "Kubernetes version: {}", or_unknown(self.kubelet_version.as_deref()))
    }
}

/// Collects [`InstallInfo`] for the config at `config_path`.
pub async fn collect_info(resolver: &ConfigResolver, planner: &PlanBuilder, config_path: &Path) -> InstallInfo {
    let mut info = InstallInfo {
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    };

    match resolver.load(Some(config_path)) {
        Ok(cfg) => info.configured_version = cfg.kubernetes_version,
        Err(e) => warn!("Failed to load config: {}", e),
    }

    match planner.versions().resolve(&info.configured_version).await {
        Ok(version) => {
            info.runtime = Some(Runtime::detect(&version));
            info.resolved_version = Some(version);
        }
        Err(e) => warn!("Failed to resolve Kubernetes version: {}", e),
    }

    // Fall back to the k3s location when the runtime is not known.
    let runtime = info.runtime.filter(|r| *r != Runtime::Unknown).unwrap_or(Runtime::K3s);
    let kubeconfig = planner.layout().kubeconfig_path(runtime);
    if kubeconfig.exists() {
        match kubelet_version(&kubeconfig).await {
            Ok(version) => info.kubelet_version = version,
            Err(e) => debug!("Failed to query cluster with {}: {}", kubeconfig.display(), e),
        }
    } else {
        debug!("No kubeconfig at {}", kubeconfig.display());
    }

    info
}

/// Kubelet version of the first control-plane node.
async fn kubelet_version(kubeconfig: &Path) -> Result<Option<String>, BootstrapError> {
    let kubeconfig = Kubeconfig::read_from(kubeconfig)?;
    let config = KubeConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
    let client = Client::try_from(config)?;

    let nodes: Api<Node> = Api::all(client);
    let list = nodes
        .list(&ListParams::default().labels(CONTROL_PLANE_SELECTOR))
        .await?;

    Ok(list
        .items
        .into_iter()
        .next()
        .and_then(|node| node.status)
        .and_then(|status| status.node_info)
        .map(|node_info| node_info.kubelet_version))
}
