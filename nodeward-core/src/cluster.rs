// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{Context, Result};
use nodeward_model::{compare_versions, document_name, version_from_document_name, ConfigurationDocument};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("document {name:?} not found in namespace {namespace:?}")]
    DocumentNotFound { namespace: String, name: String },
    #[error("node {0:?} not found")]
    NodeNotFound(String),
    #[error("node {node:?} has no {key:?} annotation")]
    MissingAnnotation { node: String, key: String },
    #[error("no services document found in namespace {0:?}")]
    NoDocuments(String),
}

/// Read access to desired-state documents and read/annotate access to node
/// records. Absent objects are `Ok(None)`; errors are transport failures.
pub trait ClusterStore: Send + Sync {
    fn get_document(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>>;

    fn list_documents(&self, namespace: &str) -> Result<Vec<String>>;

    fn list_nodes(&self) -> Result<Vec<Value>>;

    fn get_node(&self, name: &str) -> Result<Option<Value>>;

    fn patch_node_annotations(&self, name: &str, set: &BTreeMap<String, String>, remove: &[String]) -> Result<()>;
}

/// Raw key/value data of the document for `version`. Absence is an error.
pub fn document_data(store: &dyn ClusterStore, namespace: &str, version: &str) -> Result<BTreeMap<String, String>> {
    let name = document_name(version);
    Ok(store.get_document(namespace, &name)?.ok_or(LookupError::DocumentNotFound {
        namespace: namespace.to_string(),
        name,
    })?)
}

/// Parses fetched document data. Shape and validation errors keep their
/// `ValidationError` so callers can tell them apart from store failures.
pub fn parse_document(version: &str, data: &BTreeMap<String, String>) -> Result<ConfigurationDocument> {
    ConfigurationDocument::from_data(version, data)
        .with_context(|| format!("parsing document {:?}", document_name(version)))
}

/// Fetches and parses the document for `version`.
pub fn fetch_document(store: &dyn ClusterStore, namespace: &str, version: &str) -> Result<ConfigurationDocument> {
    parse_document(version, &document_data(store, namespace, version)?)
}

/// Highest document version present in `namespace`.
pub fn latest_version(store: &dyn ClusterStore, namespace: &str) -> Result<Option<String>> {
    Ok(store
        .list_documents(namespace)?
        .iter()
        .filter_map(|name| version_from_document_name(name))
        .max_by(|a, b| compare_versions(a, b))
        .map(str::to_string))
}

pub fn node_name(node: &Value) -> Option<&str> {
    node.pointer("/metadata/name").and_then(Value::as_str)
}

pub fn node_annotation<'a>(node: &'a Value, key: &str) -> Option<&'a str> {
    node.get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
}

fn node_addresses(node: &Value) -> impl Iterator<Item = Ipv4Addr> + '_ {
    node.pointer("/status/addresses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("address").and_then(Value::as_str))
        .filter_map(|a| a.parse::<Ipv4Addr>().ok())
}

/// First node record carrying one of `local` as an address.
pub fn find_node_by_addresses(store: &dyn ClusterStore, local: &[Ipv4Addr]) -> Result<Option<Value>> {
    let nodes = store.list_nodes()?;
    Ok(nodes
        .into_iter()
        .find(|node| node_addresses(node).any(|addr| local.contains(&addr))))
}

/// Cluster store over a directory tree:
/// `<root>/<namespace>/<document>.json` holds a string map,
/// `<root>/nodes/<node>.json` holds a node record.
pub struct FileClusterStore {
    root: PathBuf,
}

impl FileClusterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn nodes_dir(&self) -> PathBuf {
        self.root.join("nodes")
    }

    fn node_path(&self, name: &str) -> PathBuf {
        self.nodes_dir().join(format!("{}.json", name))
    }

    pub fn put_document(&self, namespace: &str, name: &str, data: &BTreeMap<String, String>) -> Result<()> {
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir)?;
        write_json(&dir.join(format!("{}.json", name)), &serde_json::to_value(data)?)
    }

    pub fn put_node(&self, node: &Value) -> Result<()> {
        let name = node_name(node).context("node record has no metadata.name")?;
        fs::create_dir_all(self.nodes_dir())?;
        write_json(&self.node_path(name), node)
    }
}

fn read_json(path: &Path) -> Result<Option<Value>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path).with_context(|| format!("writing {}", path.display()))
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl ClusterStore for FileClusterStore {
    fn get_document(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        let path = self.root.join(namespace).join(format!("{}.json", name));
        match read_json(&path)? {
            Some(v) => Ok(Some(
                serde_json::from_value(v).with_context(|| format!("{} is not a string map", path.display()))?,
            )),
            None => Ok(None),
        }
    }

    fn list_documents(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(json_files(&self.root.join(namespace))?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect())
    }

    fn list_nodes(&self) -> Result<Vec<Value>> {
        let mut nodes = Vec::new();
        for path in json_files(&self.nodes_dir())? {
            if let Some(node) = read_json(&path)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn get_node(&self, name: &str) -> Result<Option<Value>> {
        read_json(&self.node_path(name))
    }

    fn patch_node_annotations(&self, name: &str, set: &BTreeMap<String, String>, remove: &[String]) -> Result<()> {
        let path = self.node_path(name);
        let mut node = read_json(&path)?.ok_or_else(|| LookupError::NodeNotFound(name.to_string()))?;

        let metadata = node
            .as_object_mut()
            .context("node record is not an object")?
            .entry("metadata")
            .or_insert_with(|| Value::Object(Map::new()));
        let annotations = metadata
            .as_object_mut()
            .context("node metadata is not an object")?
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .context("node annotations are not an object")?;

        for key in remove {
            annotations.remove(key);
        }
        for (key, value) in set {
            annotations.insert(key.clone(), Value::String(value.clone()));
        }
        write_json(&path, &node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotations_are_patched_in_place() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileClusterStore::new(dir.path());
        store.put_node(&json!({"metadata": {"name": "n1"}, "status": {}}))?;

        let set = BTreeMap::from([("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]);
        store.patch_node_annotations("n1", &set, &[])?;
        store.patch_node_annotations("n1", &BTreeMap::new(), &["a".to_string()])?;

        let node = store.get_node("n1")?.unwrap();
        assert_eq!(node_annotation(&node, "a"), None);
        assert_eq!(node_annotation(&node, "b"), Some("2"));
        assert!(store.patch_node_annotations("ghost", &set, &[]).is_err());
        Ok(())
    }

    #[test]
    fn latest_version_uses_version_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileClusterStore::new(dir.path());
        for name in ["services-9.0.0", "services-10.0.0", "services-10.0.1", "unrelated"] {
            store.put_document("ns", name, &BTreeMap::new())?;
        }
        assert_eq!(latest_version(&store, "ns")?.as_deref(), Some("10.0.1"));
        assert_eq!(latest_version(&store, "empty")?, None);
        Ok(())
    }

    #[test]
    fn finds_node_by_address() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileClusterStore::new(dir.path());
        store.put_node(&json!({"metadata": {"name": "a"},
            "status": {"addresses": [{"type": "InternalIP", "address": "10.0.0.1"}]}}))?;
        store.put_node(&json!({"metadata": {"name": "b"},
            "status": {"addresses": [{"type": "Hostname", "address": "b"},
                                     {"type": "InternalIP", "address": "10.0.0.2"}]}}))?;

        let found = find_node_by_addresses(&store, &["192.168.1.1".parse()?, "10.0.0.2".parse()?])?;
        assert_eq!(found.as_ref().and_then(node_name), Some("b"));
        assert!(find_node_by_addresses(&store, &["172.16.0.1".parse()?])?.is_none());
        Ok(())
    }
}
