//! Layered configuration resolver
//!
//! Builds a [`Config`] from, in increasing precedence:
//! 1. manifests discovered under `manifest_dirs` (as `resources`)
//! 2. each of `implicit_paths`, plus the YAML files inside it when the path is a directory
//! 3. the explicit path given to [`ConfigResolver::load`]
//!
//! Any file may carry a sibling `<file>.d/` directory whose `.yaml`/`.yml`
//! fragments are merged right after it, recursively. Missing files are
//! skipped. Broken implicit files and manifests are logged and skipped;
//! only a broken explicit file or a decode failure aborts resolution.

use crate::error::ConfigError;
use crate::merge::merge_concat_slice;
use crate::types::Config;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Top-level key under which a shared file (e.g. cloud-init user data) may
/// nest this tool's settings.
pub const NAMESPACE_KEY: &str = "nodestrap";

/// Well-known locations consulted by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPaths {
    /// Config files merged before the explicit file, in order.
    /// Each may also be a directory of YAML files.
    pub implicit_paths: Vec<PathBuf>,
    /// Directories searched recursively for Kubernetes manifests
    pub manifest_dirs: Vec<PathBuf>,
}

impl Default for ResolverPaths {
    fn default() -> Self {
        Self {
            implicit_paths: vec![
                PathBuf::from("/usr/share/oem/nodestrap/config.yaml"),
                PathBuf::from("/usr/share/nodestrap/config.yaml"),
                // Standard cloud-config
                PathBuf::from("/var/lib/cloud/instance/user-data.txt"),
            ],
            manifest_dirs: vec![
                PathBuf::from("/usr/share/oem/nodestrap/manifests"),
                PathBuf::from("/usr/share/nodestrap/manifests"),
                PathBuf::from("/etc/nodestrap/manifests"),
            ],
        }
    }
}

impl ResolverPaths {
    /// No implicit files and no manifest directories.
    pub fn empty() -> Self {
        Self {
            implicit_paths: Vec::new(),
            manifest_dirs: Vec::new(),
        }
    }
}

/// Loads and merges layered configuration files into one [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    paths: ResolverPaths,
}

impl ConfigResolver {
    /// Creates a resolver reading from `paths`.
    pub fn new(paths: ResolverPaths) -> Self {
        Self { paths }
    }

    /// Resolves the configuration, merging `explicit` last when given.
    pub fn load(&self, explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let mut values = Mapping::new();

        let resources = self.discover_resources();
        if !resources.is_empty() {
            debug!("Discovered {} manifest resource(s)", resources.len());
            values.insert(
                Value::from("resources"),
                Value::Sequence(resources.into_iter().map(Value::Mapping).collect()),
            );
        }

        for file in self.implicit_files() {
            match merge_file(values.clone(), &file) {
                Ok(merged) => values = merged,
                Err(e) => warn!("Failed to parse {}, skipping file: {}", file.display(), e),
            }
        }

        if let Some(path) = explicit {
            values = merge_file(values, path)?;
        }

        serde_yaml::from_value(Value::Mapping(values)).map_err(ConfigError::Decode)
    }

    fn implicit_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for path in &self.paths.implicit_paths {
            files.push(path.clone());
            if let Ok(entries) = sorted_entries(path) {
                files.extend(entries.into_iter().filter(|entry| is_yaml(entry)));
            }
        }
        files
    }

    fn discover_resources(&self) -> Vec<Mapping> {
        let mut resources = Vec::new();
        for dir in &self.paths.manifest_dirs {
            let mut files = Vec::new();
            if let Err(e) = collect_yaml_files(dir, &mut files) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to walk manifest directory {}: {}", dir.display(), e);
                }
                continue;
            }
            for file in files {
                match read_manifests(&file) {
                    Ok(docs) => resources.extend(docs),
                    Err(e) => warn!("Failed to load manifests from {}, skipping file: {}", file.display(), e),
                }
            }
        }
        resources
    }
}

fn merge_file(acc: Mapping, file: &Path) -> Result<Mapping, ConfigError> {
    let data = if file.is_dir() {
        Vec::new()
    } else {
        match fs::read(file) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: file.to_path_buf(),
                    source,
                });
            }
        }
    };

    let fragments = dot_d_files(file)?;

    let mut values = Mapping::new();
    if !data.is_empty() {
        info!("Loading config file [{}]", file.display());
        values = parse_mapping(&data, file)?;
    }

    if let Some(Value::Mapping(nested)) = values.get(NAMESPACE_KEY) {
        values = nested.clone();
    }

    let mut merged = merge_concat_slice(acc, values);
    for fragment in fragments {
        merged = merge_file(merged, &fragment)?;
    }
    Ok(merged)
}

fn parse_mapping(data: &[u8], path: &Path) -> Result<Mapping, ConfigError> {
    let value: Value = serde_yaml::from_slice(data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(ConfigError::NotAMapping(path.to_path_buf())),
    }
}

fn dot_d_files(file: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let mut dir = OsString::from(file.as_os_str());
    dir.push(".d");
    let dir = PathBuf::from(dir);

    match sorted_entries(&dir) {
        Ok(entries) => Ok(entries
            .into_iter()
            .filter(|entry| !entry.is_dir() && has_yaml_suffix(entry))
            .collect()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(ConfigError::Io { path: dir, source }),
    }
}

fn read_manifests(file: &Path) -> Result<Vec<Mapping>, ConfigError> {
    let data = fs::read(file).map_err(|source| ConfigError::Io {
        path: file.to_path_buf(),
        source,
    })?;

    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(&data) {
        let value = Value::deserialize(document).map_err(|source| ConfigError::Parse {
            path: file.to_path_buf(),
            source,
        })?;
        let Value::Mapping(object) = value else {
            continue;
        };
        if non_empty_str(&object, "apiVersion") && non_empty_str(&object, "kind") {
            docs.push(object);
        }
    }
    Ok(docs)
}

fn non_empty_str(object: &Mapping, key: &str) -> bool {
    object
        .get(key)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in sorted_entries(dir)? {
        if entry.is_dir() {
            collect_yaml_files(&entry, out)?;
        } else if is_yaml(&entry) {
            out.push(entry);
        }
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

fn is_yaml(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .is_some_and(|name| name.ends_with(".yaml") || name.ends_with(".yml"))
}

// `.d` fragments match the suffix case-sensitively.
fn has_yaml_suffix(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .is_some_and(|name| name.ends_with(".yaml") || name.ends_with(".yml"))
}
