//! Bootstrap manifests applied once the cluster is up

use serde_yaml::{Mapping, Value};
use std::path::Path;

const HOSTNAME_SOURCES: [&str; 2] = ["/proc/sys/kernel/hostname", "/etc/hostname"];

/// The Node object registering this machine under `node_name`.
pub fn node_object(node_name: &str) -> Mapping {
    let mut labels = Mapping::new();
    labels.insert(
        Value::from("node-role.kubernetes.io/etcd"),
        Value::from("true"),
    );

    let mut metadata = Mapping::new();
    metadata.insert(Value::from("name"), Value::from(node_name));
    metadata.insert(Value::from("labels"), Value::Mapping(labels));

    let mut node = Mapping::new();
    node.insert(Value::from("apiVersion"), Value::from("v1"));
    node.insert(Value::from("kind"), Value::from("Node"));
    node.insert(Value::from("metadata"), Value::Mapping(metadata));
    node
}

/// Multi-document YAML of `resources` followed by the Node object.
pub fn render_bootstrap_manifests(
    resources: &[Mapping],
    node_name: &str,
) -> Result<String, serde_yaml::Error> {
    let node = node_object(node_name);
    let mut out = String::new();
    for doc in resources.iter().chain(std::iter::once(&node)) {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}

/// First label of the machine's host name.
pub fn short_hostname() -> std::io::Result<String> {
    let mut last_err = None;
    for source in HOSTNAME_SOURCES {
        match std::fs::read_to_string(Path::new(source)) {
            Ok(name) if !name.trim().is_empty() => return Ok(short_name(&name)),
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::other("host name is empty")))
}

/// `node-1.example.com` → `node-1`
pub fn short_name(hostname: &str) -> String {
    hostname
        .trim()
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("node-1.example.com\n"), "node-1");
        assert_eq!(short_name("node-2"), "node-2");
    }

    #[test]
    fn test_node_object_comes_last() {
        let ns: Mapping =
            serde_yaml::from_str("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: apps\n").unwrap();
        let text = render_bootstrap_manifests(&[ns], "node-1").unwrap();

        let docs: Vec<Value> = serde_yaml::Deserializer::from_str(&text)
            .map(|d| serde::Deserialize::deserialize(d).unwrap())
            .collect();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], Value::from("Namespace"));
        assert_eq!(docs[1]["kind"], Value::from("Node"));
        assert_eq!(docs[1]["metadata"]["name"], Value::from("node-1"));
        assert_eq!(
            docs[1]["metadata"]["labels"]["node-role.kubernetes.io/etcd"],
            Value::from("true")
        );
    }
}
