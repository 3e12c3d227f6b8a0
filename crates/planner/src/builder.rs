//! Plan construction
//!
//! A cluster-init plan contains, in order:
//!
//! | Files | One-time instructions |
//! |---|---|
//! | runtime config (`cluster-init: true`) | operator pre-instructions |
//! | registries (when configured) | runtime install |
//! | bootstrap manifests | probes |
//! | | bootstrap manifest apply |
//! | | operator post-instructions |
//!
//! A join plan has the same shape without the bootstrap manifests and the
//! `cluster-init` marker, and refuses to build without `server` and `token`.

use crate::error::PlanError;
use crate::images::installer_image;
use crate::layout::{bootstrap_manifest_path, plan_file, RuntimeLayout};
use crate::probes::{probe_instruction, probes_for};
use crate::resources::{render_bootstrap_manifests, short_hostname};
use crate::runtime::Runtime;
use crate::runtime_config::{render_registries, render_runtime_config};
use crate::token::TokenManager;
use crate::version::VersionResolver;
use bootstrap_plan::{File, OneTimeInstruction, Plan};
use node_config::{Config, Role};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the instruction applying the bootstrap manifests.
pub const BOOTSTRAP_INSTRUCTION: &str = "bootstrap";

/// Builds plans for a node.
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    versions: Arc<VersionResolver>,
    tokens: TokenManager,
    layout: RuntimeLayout,
    self_exe: PathBuf,
    hostname: Option<String>,
}

impl PlanBuilder {
    /// `self_exe` is the binary re-invoked by probe and bootstrap instructions.
    pub fn new(versions: Arc<VersionResolver>, layout: RuntimeLayout, self_exe: impl Into<PathBuf>) -> Self {
        Self {
            versions,
            tokens: TokenManager::new(layout.clone()),
            layout,
            self_exe: self_exe.into(),
            hostname: None,
        }
    }

    /// Host name used for the Node object when the config has no `nodeName`.
    /// Read from the machine when unset.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Filesystem layout the plans target.
    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    /// Shared version resolver, also used outside plan building.
    pub fn versions(&self) -> &Arc<VersionResolver> {
        &self.versions
    }

    /// Builds the plan for `cfg`.
    ///
    /// A cluster-init build fills in `cfg.token`, so the caller can persist
    /// exactly the config the plan was built from.
    pub async fn build(&self, cfg: &mut Config, data_dir: &Path) -> Result<Plan, PlanError> {
        let role = cfg.role()?.ok_or(PlanError::MissingRole)?;
        debug!("Building {} plan", role);
        match role {
            Role::ClusterInit => self.init_plan(cfg, data_dir).await,
            role => self.join_plan(cfg, role, data_dir).await,
        }
    }

    async fn init_plan(&self, cfg: &mut Config, data_dir: &Path) -> Result<Plan, PlanError> {
        let version = self.versions.resolve(&cfg.kubernetes_version).await?;
        let runtime = Runtime::detect(&version);
        self.tokens.ensure_token(cfg, runtime)?;

        let mut plan = Plan::default();
        self.add_config_files(&mut plan, cfg, Role::ClusterInit, runtime)?;

        let manifests = render_bootstrap_manifests(&cfg.resources, &self.node_name(cfg)?)
            .map_err(|source| PlanError::Render {
                what: "bootstrap manifests",
                source,
            })?;
        let manifest_path = bootstrap_manifest_path(data_dir);
        plan.files
            .push(File::from_bytes(manifest_path.display().to_string(), manifests.as_bytes()));

        let core = vec![
            self.runtime_instruction(cfg, Role::ClusterInit, &version, runtime),
            probe_instruction(&self.self_exe, &plan_file(data_dir)),
            self.bootstrap_instruction(cfg, &version, runtime, &manifest_path),
        ];
        plan.one_time_instructions = self.wrap_operator_instructions(cfg, core, runtime);
        plan.probes = probes_for(Role::ClusterInit, runtime, &self.layout);
        Ok(plan)
    }

    async fn join_plan(&self, cfg: &Config, role: Role, data_dir: &Path) -> Result<Plan, PlanError> {
        if cfg.server.is_empty() {
            return Err(PlanError::MissingServer);
        }
        if cfg.token.is_empty() {
            return Err(PlanError::MissingToken);
        }

        let version = self.versions.resolve(&cfg.kubernetes_version).await?;
        let runtime = Runtime::detect(&version);

        let mut plan = Plan::default();
        self.add_config_files(&mut plan, cfg, role, runtime)?;

        let core = vec![
            self.runtime_instruction(cfg, role, &version, runtime),
            probe_instruction(&self.self_exe, &plan_file(data_dir)),
        ];
        plan.one_time_instructions = self.wrap_operator_instructions(cfg, core, runtime);
        plan.probes = probes_for(role, runtime, &self.layout);
        Ok(plan)
    }

    fn add_config_files(&self, plan: &mut Plan, cfg: &Config, role: Role, runtime: Runtime) -> Result<(), PlanError> {
        let config = render_runtime_config(cfg, role).map_err(|source| PlanError::Render {
            what: "runtime config",
            source,
        })?;
        plan.files.push(File::from_bytes(
            self.layout.runtime_config_path(runtime).display().to_string(),
            config.as_bytes(),
        ));

        if let Some(registries) = &cfg.registries {
            let data = render_registries(registries).map_err(|source| PlanError::Render {
                what: "registries",
                source,
            })?;
            plan.files.push(File::from_bytes(
                self.layout.registries_path(runtime).display().to_string(),
                data.as_bytes(),
            ));
        }
        Ok(())
    }

    fn runtime_instruction(&self, cfg: &Config, role: Role, version: &str, runtime: Runtime) -> OneTimeInstruction {
        let image = installer_image(&cfg.runtime_installer_image, &cfg.system_default_registry, version);

        let mut env = Vec::new();
        if !cfg.server.is_empty() {
            env.push(format!("K3S_URL={}", cfg.server));
        }
        env.push(format!("K3S_TOKEN={}", cfg.token));
        let exec = if role.is_agent() { "agent" } else { "server" };
        env.push(format!("INSTALL_K3S_EXEC={exec}"));
        env.push(format!("RESTART_STAMP={image}"));

        OneTimeInstruction {
            name: runtime.as_str().to_string(),
            env,
            image,
            save_output: true,
            ..Default::default()
        }
    }

    fn bootstrap_instruction(
        &self,
        cfg: &Config,
        version: &str,
        runtime: Runtime,
        manifest_path: &Path,
    ) -> OneTimeInstruction {
        OneTimeInstruction {
            name: BOOTSTRAP_INSTRUCTION.to_string(),
            image: installer_image(&cfg.runtime_installer_image, &cfg.system_default_registry, version),
            command: self.self_exe.display().to_string(),
            args: vec![
                "retry".to_string(),
                runtime.kubectl_command().to_string(),
                "apply".to_string(),
                "--validate=false".to_string(),
                "-f".to_string(),
                manifest_path.display().to_string(),
            ],
            env: self.layout.kubectl_env(runtime),
            save_output: true,
            ..Default::default()
        }
    }

    /// Places operator pre-instructions before and post-instructions after
    /// `core`, giving them the kubeconfig environment.
    fn wrap_operator_instructions(
        &self,
        cfg: &Config,
        core: Vec<OneTimeInstruction>,
        runtime: Runtime,
    ) -> Vec<OneTimeInstruction> {
        let kube_env = self.layout.kubectl_env(runtime);
        let with_env = |inst: &OneTimeInstruction| {
            let mut inst = inst.clone();
            inst.env.extend(kube_env.iter().cloned());
            inst
        };

        let pre = cfg.pre_instructions.iter().map(with_env);
        let post = cfg.post_instructions.iter().map(with_env);
        pre.chain(core).chain(post).collect()
    }

    fn node_name(&self, cfg: &Config) -> Result<String, PlanError> {
        if !cfg.node_name.is_empty() {
            return Ok(cfg.node_name.clone());
        }
        match &self.hostname {
            Some(hostname) => Ok(crate::resources::short_name(hostname)),
            None => short_hostname().map_err(PlanError::Hostname),
        }
    }
}
