//! On-disk locations used by a plan

use crate::runtime::Runtime;
use std::path::{Path, PathBuf};

const RUNTIME_CONFIG_FILE: &str = "40-nodestrap.yaml";

/// Root directories of the installed runtime.
///
/// Defaults to `/etc/rancher` and `/var/lib/rancher`; tests point these at
/// temporary directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeLayout {
    /// Parent of the per-runtime config directories
    pub etc_root: PathBuf,
    /// Parent of the per-runtime data directories
    pub data_root: PathBuf,
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self {
            etc_root: PathBuf::from("/etc/rancher"),
            data_root: PathBuf::from("/var/lib/rancher"),
        }
    }
}

impl RuntimeLayout {
    /// Layout rooted at the given directories.
    ///
    /// # Arguments
    ///
    /// * `etc_root` - Config root, `/etc/rancher` on a real node
    /// * `data_root` - Data root, `/var/lib/rancher` on a real node
    pub fn new(etc_root: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            etc_root: etc_root.into(),
            data_root: data_root.into(),
        }
    }

    /// Drop-in config fragment the runtime reads at start.
    pub fn runtime_config_path(&self, runtime: Runtime) -> PathBuf {
        self.etc_root
            .join(runtime.as_str())
            .join("config.yaml.d")
            .join(RUNTIME_CONFIG_FILE)
    }

    /// Private registry settings for `runtime`.
    pub fn registries_path(&self, runtime: Runtime) -> PathBuf {
        self.etc_root.join(runtime.as_str()).join("registries.yaml")
    }

    /// Admin kubeconfig written by `runtime` once it is up.
    pub fn kubeconfig_path(&self, runtime: Runtime) -> PathBuf {
        self.etc_root
            .join(runtime.as_str())
            .join(format!("{}.yaml", runtime.as_str()))
    }

    /// Directory holding the server CA and client certificates.
    pub fn server_tls_dir(&self, runtime: Runtime) -> PathBuf {
        self.data_root.join(runtime.as_str()).join("server").join("tls")
    }

    /// `KUBECONFIG=...` for instructions that talk to the local cluster.
    /// Empty for an unknown runtime.
    pub fn kubectl_env(&self, runtime: Runtime) -> Vec<String> {
        match runtime {
            Runtime::Unknown => Vec::new(),
            Runtime::K3s => vec![format!(
                "KUBECONFIG={}",
                self.kubeconfig_path(runtime).display()
            )],
        }
    }
}

/// Where the plan is written before it is applied.
pub fn plan_file(data_dir: &Path) -> PathBuf {
    data_dir.join("plan").join("plan.json")
}

/// Where the apply output is saved.
pub fn plan_output_file(data_dir: &Path) -> PathBuf {
    data_dir.join("plan").join("plan-output.json")
}

/// Manifests applied by the bootstrap instruction.
pub fn bootstrap_manifest_path(data_dir: &Path) -> PathBuf {
    data_dir.join("bootstrapmanifests").join("nodestrap.yaml")
}
