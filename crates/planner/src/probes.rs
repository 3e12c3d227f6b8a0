//! Health probes for the runtime's components

use crate::layout::RuntimeLayout;
use crate::runtime::Runtime;
use bootstrap_plan::{HttpGetAction, OneTimeInstruction, Probe};
use node_config::Role;
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the instruction waiting for the probes.
pub const PROBE_INSTRUCTION: &str = "probes";

const PROBE_INTERVAL: &str = "5s";

/// Instruction that blocks until the plan's probes pass, by re-invoking
/// this binary's `probe` command on the written plan file.
pub fn probe_instruction(self_exe: &Path, plan_file: &Path) -> OneTimeInstruction {
    OneTimeInstruction {
        name: PROBE_INSTRUCTION.to_string(),
        command: self_exe.display().to_string(),
        args: vec![
            "probe".to_string(),
            "--interval".to_string(),
            PROBE_INTERVAL.to_string(),
            "--file".to_string(),
            plan_file.display().to_string(),
        ],
        save_output: true,
        ..Default::default()
    }
}

/// Probes a node of `role` must pass.
///
/// Control-plane nodes check every component; workers and etcd-only nodes
/// only the kubelet.
pub fn probes_for(role: Role, runtime: Runtime, layout: &RuntimeLayout) -> BTreeMap<String, Probe> {
    let mut probes = BTreeMap::new();
    if runtime == Runtime::Unknown {
        return probes;
    }

    if role.is_control_plane() {
        let tls = layout.server_tls_dir(runtime);
        let tls_file = |name: &str| tls.join(name).display().to_string();
        probes.insert(
            "kube-apiserver".to_string(),
            probe(HttpGetAction {
                url: "https://127.0.0.1:6443/readyz".to_string(),
                ca_cert: tls_file("server-ca.crt"),
                client_cert: tls_file("client-kube-apiserver.crt"),
                client_key: tls_file("client-kube-apiserver.key"),
                ..Default::default()
            }),
        );
        probes.insert(
            "kube-controller-manager".to_string(),
            probe(HttpGetAction {
                url: "https://127.0.0.1:10257/healthz".to_string(),
                insecure: true,
                ..Default::default()
            }),
        );
        probes.insert(
            "kube-scheduler".to_string(),
            probe(HttpGetAction {
                url: "https://127.0.0.1:10259/healthz".to_string(),
                insecure: true,
                ..Default::default()
            }),
        );
    }

    probes.insert(
        "kubelet".to_string(),
        probe(HttpGetAction {
            url: "http://127.0.0.1:10248/healthz".to_string(),
            ..Default::default()
        }),
    );
    probes
}

fn probe(http_get: HttpGetAction) -> Probe {
    Probe {
        initial_delay_seconds: 1,
        timeout_seconds: 5,
        success_threshold: 1,
        failure_threshold: 2,
        http_get,
    }
}
