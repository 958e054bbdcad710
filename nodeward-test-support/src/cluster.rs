// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{anyhow, bail, Result};
use nodeward_core::cluster::node_name;
use nodeward_core::{ClusterStore, LookupError};
use nodeward_model::ConfigurationDocument;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    documents: BTreeMap<(String, String), BTreeMap<String, String>>,
    nodes: BTreeMap<String, Value>,
    fail_node_listing: bool,
    document_reads: usize,
}

/// Cluster store held in memory. Node records can be inspected after a run.
#[derive(Default)]
pub struct MemoryClusterStore {
    state: Mutex<State>,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_document(&self, namespace: &str, doc: &ConfigurationDocument) {
        self.put_raw_document(namespace, &doc.name(), doc.to_data());
    }

    pub fn put_raw_document(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.lock()
            .documents
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn put_node(&self, node: Value) {
        let name = node_name(&node).unwrap_or_default().to_string();
        self.lock().nodes.insert(name, node);
    }

    pub fn node(&self, name: &str) -> Option<Value> {
        self.lock().nodes.get(name).cloned()
    }

    /// Number of `get_document` calls served so far.
    pub fn document_reads(&self) -> usize {
        self.lock().document_reads
    }

    /// Makes `list_nodes` fail, as an unreachable API server would.
    pub fn fail_node_listing(&self) {
        self.lock().fail_node_listing = true;
    }
}

impl ClusterStore for MemoryClusterStore {
    fn get_document(&self, namespace: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
        let mut state = self.lock();
        state.document_reads += 1;
        Ok(state.documents.get(&(namespace.to_string(), name.to_string())).cloned())
    }

    fn list_documents(&self, namespace: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .documents
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn list_nodes(&self) -> Result<Vec<Value>> {
        let state = self.lock();
        if state.fail_node_listing {
            bail!("node listing unavailable");
        }
        Ok(state.nodes.values().cloned().collect())
    }

    fn get_node(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.node(name))
    }

    fn patch_node_annotations(&self, name: &str, set: &BTreeMap<String, String>, remove: &[String]) -> Result<()> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(name)
            .ok_or_else(|| LookupError::NodeNotFound(name.to_string()))?;
        let annotations = node
            .pointer_mut("/metadata")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("node {} has no metadata", name))?
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| anyhow!("node {} annotations are not an object", name))?;
        for key in remove {
            annotations.remove(key);
        }
        for (key, value) in set {
            annotations.insert(key.clone(), Value::String(value.clone()));
        }
        Ok(())
    }
}

/// A node record shaped like the ones the cluster API returns.
pub fn node_record(name: &str, internal_ips: &[&str], annotations: &[(&str, &str)]) -> Value {
    let mut addresses: Vec<Value> = internal_ips
        .iter()
        .map(|ip| json!({"type": "InternalIP", "address": ip}))
        .collect();
    addresses.push(json!({"type": "Hostname", "address": name}));
    let annotations: Map<String, Value> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    json!({
        "metadata": {
            "name": name,
            "labels": {"kubernetes.io/hostname": name, "kubernetes.io/os": "windows"},
            "annotations": annotations,
        },
        "status": {"addresses": addresses},
    })
}
