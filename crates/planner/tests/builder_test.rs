//! Plan building scenarios

use bootstrap_plan::OneTimeInstruction;
use node_config::{Config, ConfigError};
use node_planner::{PlanBuilder, PlanError, RuntimeLayout, Runtime, VersionResolver};
use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::sync::Arc;

const VERSION: &str = "v1.28.0+k3s1";
const SELF_EXE: &str = "/usr/local/bin/nodestrap";

// Nothing listens on the discard port, so any channel lookup fails.
const UNREACHABLE_CHANNELS: &str = "http://127.0.0.1:9/channels/{channel}";

fn builder(root: &Path) -> PlanBuilder {
    let versions = Arc::new(VersionResolver::with_channel_url_template(UNREACHABLE_CHANNELS).unwrap());
    PlanBuilder::new(
        versions,
        RuntimeLayout::new(root.join("etc/rancher"), root.join("var/lib/rancher")),
        SELF_EXE,
    )
    .with_hostname("node-0.example.com")
}

fn instruction(name: &str, command: &str) -> OneTimeInstruction {
    OneTimeInstruction {
        name: name.to_string(),
        command: command.to_string(),
        ..Default::default()
    }
}

fn cluster_init() -> Config {
    Config {
        role: "cluster-init".to_string(),
        kubernetes_version: VERSION.to_string(),
        ..Default::default()
    }
}

fn names(instructions: &[OneTimeInstruction]) -> Vec<&str> {
    instructions.iter().map(|i| i.name.as_str()).collect()
}

#[tokio::test]
async fn test_cluster_init_plan_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let mut cfg = cluster_init();

    let plan = builder(dir.path()).build(&mut cfg, &data_dir).await.unwrap();

    let runtime_config = String::from_utf8(plan.files[0].decode().unwrap()).unwrap();
    let parsed: Mapping = serde_yaml::from_str(&runtime_config).unwrap();
    assert_eq!(parsed["cluster-init"], Value::Bool(true));
    assert_eq!(parsed["token"], Value::from(cfg.token.as_str()));
    assert!(plan.files[0].path.ends_with("etc/rancher/k3s/config.yaml.d/40-nodestrap.yaml"));

    let install = &plan.one_time_instructions[0];
    assert_eq!(install.name, "k3s");
    assert_eq!(install.image, "rancher/system-agent-installer-k3s:v1.28.0-k3s1");
    assert!(install.env.contains(&"INSTALL_K3S_EXEC=server".to_string()));
    assert!(!install.env.iter().any(|e| e.starts_with("K3S_URL=")));

    assert_eq!(names(&plan.one_time_instructions), vec!["k3s", "probes", "bootstrap"]);
    let bootstrap = &plan.one_time_instructions[2];
    assert_eq!(bootstrap.command, SELF_EXE);
    assert_eq!(&bootstrap.args[..4], ["retry", "/usr/local/bin/kubectl", "apply", "--validate=false"]);

    let manifests = String::from_utf8(plan.files[1].decode().unwrap()).unwrap();
    assert!(manifests.contains("kind: Node"));
    assert!(manifests.contains("name: node-0\n"));
    assert_eq!(plan.probes.len(), 4);
}

#[tokio::test]
async fn test_build_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let planner = builder(dir.path());

    let mut cfg = cluster_init();
    cfg.token = "fixed".to_string();
    cfg.node_name = "cp-1".to_string();
    cfg.labels = vec!["zone=a".to_string(), "rack=1".to_string()];
    cfg.extra_config = serde_yaml::from_str("kubeletArg: [max-pods=200]\ndisable: [traefik]\n").unwrap();
    cfg.resources = vec![
        serde_yaml::from_str("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: apps\n").unwrap(),
    ];
    cfg.pre_instructions = vec![instruction("prep", "/bin/true")];

    let first = planner.build(&mut cfg.clone(), &data_dir).await.unwrap();
    let second = planner.build(&mut cfg.clone(), &data_dir).await.unwrap();
    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
}

#[tokio::test]
async fn test_join_requires_server_before_anything_else() {
    let dir = tempfile::tempdir().unwrap();
    // An empty version would need a channel lookup, which would fail differently.
    let mut cfg = Config {
        role: "worker".to_string(),
        token: "secret".to_string(),
        ..Default::default()
    };

    let err = builder(dir.path()).build(&mut cfg, dir.path()).await.unwrap_err();
    assert!(matches!(err, PlanError::MissingServer));
    assert!(err.is_precondition());
}

#[tokio::test]
async fn test_join_requires_token() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config {
        role: "control-plane".to_string(),
        server: "https://10.0.0.1:6443".to_string(),
        ..Default::default()
    };

    let err = builder(dir.path()).build(&mut cfg, dir.path()).await.unwrap_err();
    assert!(matches!(err, PlanError::MissingToken));
    assert!(cfg.token.is_empty());
}

#[tokio::test]
async fn test_worker_join_plan() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config {
        role: "worker".to_string(),
        server: "https://10.0.0.1:6443".to_string(),
        token: "secret".to_string(),
        kubernetes_version: VERSION.to_string(),
        ..Default::default()
    };

    let plan = builder(dir.path()).build(&mut cfg, dir.path()).await.unwrap();

    assert_eq!(plan.files.len(), 1);
    let runtime_config: Mapping = serde_yaml::from_slice(&plan.files[0].decode().unwrap()).unwrap();
    assert!(!runtime_config.contains_key("cluster-init"));
    assert_eq!(runtime_config["server"], Value::from("https://10.0.0.1:6443"));

    assert_eq!(names(&plan.one_time_instructions), vec!["k3s", "probes"]);
    let env = &plan.one_time_instructions[0].env;
    assert_eq!(
        env,
        &vec![
            "K3S_URL=https://10.0.0.1:6443".to_string(),
            "K3S_TOKEN=secret".to_string(),
            "INSTALL_K3S_EXEC=agent".to_string(),
            "RESTART_STAMP=rancher/system-agent-installer-k3s:v1.28.0-k3s1".to_string(),
        ]
    );
    assert_eq!(plan.probes.keys().collect::<Vec<_>>(), vec!["kubelet"]);
}

#[tokio::test]
async fn test_operator_instructions_wrap_core_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = cluster_init();
    cfg.node_name = "cp-1".to_string();
    cfg.pre_instructions = vec![instruction("prep", "/bin/true")];
    cfg.post_instructions = vec![instruction("label", "/bin/true"), instruction("notify", "/bin/true")];

    let planner = builder(dir.path());
    let plan = planner.build(&mut cfg, dir.path()).await.unwrap();

    assert_eq!(
        names(&plan.one_time_instructions),
        vec!["prep", "k3s", "probes", "bootstrap", "label", "notify"]
    );
    let kubeconfig = format!(
        "KUBECONFIG={}",
        planner.layout().kubeconfig_path(Runtime::K3s).display()
    );
    assert_eq!(plan.one_time_instructions[0].env, vec![kubeconfig.clone()]);
    assert_eq!(plan.one_time_instructions[5].env, vec![kubeconfig]);
}

#[tokio::test]
async fn test_registries_file_follows_runtime_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = cluster_init();
    cfg.node_name = "cp-1".to_string();
    cfg.registries = Some(
        serde_yaml::from_str("mirrors:\n  docker.io:\n    endpoint: [https://mirror.local]\n").unwrap(),
    );

    let plan = builder(dir.path()).build(&mut cfg, dir.path()).await.unwrap();
    assert_eq!(plan.files.len(), 3);
    assert!(plan.files[1].path.ends_with("etc/rancher/k3s/registries.yaml"));
}

#[tokio::test]
async fn test_persisted_token_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let planner = builder(dir.path());
    let persisted = planner.layout().runtime_config_path(Runtime::K3s);
    std::fs::create_dir_all(persisted.parent().unwrap()).unwrap();
    std::fs::write(&persisted, "cluster-init: true\ntoken: T1\n").unwrap();

    let mut cfg = cluster_init();
    cfg.node_name = "cp-1".to_string();
    planner.build(&mut cfg, dir.path()).await.unwrap();
    assert_eq!(cfg.token, "T1");
}

#[tokio::test]
async fn test_unknown_role_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config {
        role: "master".to_string(),
        ..Default::default()
    };

    let err = builder(dir.path()).build(&mut cfg, dir.path()).await.unwrap_err();
    assert!(matches!(err, PlanError::Config(ConfigError::UnknownRole(ref r)) if r == "master"));
    assert!(err.is_precondition());
}
