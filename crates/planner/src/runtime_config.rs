//! Runtime config and registries file rendering
//!
//! The runtime reads flat kebab-case keys (`node-name`, `tls-san`, ...).
//! Typed config fields are renamed to those keys, `extraConfig` entries are
//! normalized the same way and override them.

use node_config::{Config, Registry, Role};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

const STRIPPED_KEYS: [&str; 2] = ["extraConfig", "role"];

const RENAMED_KEYS: [(&str, &str); 5] = [
    ("tlsSans", "tls-san"),
    ("nodeName", "node-name"),
    ("internalAddress", "internal-address"),
    ("taints", "node-taint"),
    ("labels", "node-label"),
];

const ETCD_ONLY_KEYS: [&str; 3] = [
    "disable-apiserver",
    "disable-controller-manager",
    "disable-scheduler",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeFields<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    server: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tls_sans: &'a Vec<String>,
    #[serde(skip_serializing_if = "str::is_empty")]
    node_name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    address: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    internal_address: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    taints: &'a Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: &'a Vec<String>,
    #[serde(skip_serializing_if = "str::is_empty")]
    token: &'a str,
}

impl<'a> From<&'a Config> for RuntimeFields<'a> {
    fn from(cfg: &'a Config) -> Self {
        Self {
            server: &cfg.server,
            tls_sans: &cfg.tls_sans,
            node_name: &cfg.node_name,
            address: &cfg.address,
            internal_address: &cfg.internal_address,
            taints: &cfg.taints,
            labels: &cfg.labels,
            token: &cfg.token,
        }
    }
}

/// Renders the runtime config file for `role`.
///
/// Keys are emitted sorted, so identical configs render identical bytes.
pub fn render_runtime_config(cfg: &Config, role: Role) -> Result<String, serde_yaml::Error> {
    let mut result: BTreeMap<String, Value> = BTreeMap::new();

    if role == Role::Etcd {
        for key in ETCD_ONLY_KEYS {
            result.insert(key.to_string(), Value::Bool(true));
        }
    }

    let typed = match serde_yaml::to_value(RuntimeFields::from(cfg))? {
        Value::Mapping(mapping) => mapping,
        _ => Mapping::new(),
    };
    result.extend(normalize(typed));
    result.extend(normalize(cfg.extra_config.clone()));

    if role == Role::ClusterInit {
        result.insert("cluster-init".to_string(), Value::Bool(true));
    }

    serde_yaml::to_string(&result)
}

/// Renders the runtime's `registries.yaml`.
pub fn render_registries(registry: &Registry) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(registry)
}

fn normalize(mut data: Mapping) -> Vec<(String, Value)> {
    for key in STRIPPED_KEYS {
        data.remove(key);
    }
    for (old, new) in RENAMED_KEYS {
        if let Some(value) = data.remove(old) {
            data.insert(Value::from(new), value);
        }
    }

    data.into_iter()
        .filter_map(|(key, value)| {
            let key = match key {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((to_yaml_key(&key).replace('_', "-"), value))
        })
        .collect()
}

/// Converts a camelCase key to kebab-case. Runs of capitals stay together,
/// so `internalIPAddress` becomes `internal-ipaddress`.
pub fn to_yaml_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() + 4);
    let mut in_caps = false;
    for (i, c) in key.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !in_caps {
                result.push('-');
            }
            result.extend(c.to_lowercase());
            in_caps = true;
        } else {
            result.push(c);
            in_caps = false;
        }
    }
    result
}
