// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::agent::NodeAgent;
use crate::cluster::{fetch_document, find_node_by_addresses, latest_version, node_annotation, node_name, LookupError};
use crate::envvars::reconcile_env;
use crate::host::local_ipv4_addrs;
use anyhow::{bail, Context, Result};
use nodeward_model::{merge_services, sort_by_priority, ConfigurationDocument, ServiceDefinition};
use nodeward_model::{REBOOT_ANNOTATION, VERSION_ANNOTATION};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// What teardown removes: the managed services and the environment
/// variables the daemon owns.
#[derive(Debug, Default)]
pub struct RemovalPlan {
    pub services: Vec<ServiceDefinition>,
    pub env_vars: Vec<String>,
}

impl RemovalPlan {
    fn from_documents(docs: &[&ConfigurationDocument]) -> Self {
        let mut services: Vec<ServiceDefinition> = Vec::new();
        let mut env_vars = BTreeSet::new();
        for doc in docs {
            services = merge_services(&services, &doc.services);
            env_vars.extend(doc.watched_environment_vars.iter().cloned());
            env_vars.extend(doc.environment_vars.keys().cloned());
        }
        // Highest priority first, the reverse of creation order.
        sort_by_priority(&mut services);
        services.reverse();
        Self {
            services,
            env_vars: env_vars.into_iter().collect(),
        }
    }
}

impl NodeAgent {
    /// Removes everything this daemon put on the host. Runs best effort when
    /// the host has no node record: the latest document stands in for the
    /// node's applied version.
    pub async fn deconfigure(&self, namespace: &str) -> Result<()> {
        let addrs = self.options.local_addrs.clone().unwrap_or_else(local_ipv4_addrs);
        let node = find_node_by_addresses(self.store.as_ref(), &addrs).context("looking up node record")?;
        let name = node.as_ref().and_then(node_name).map(str::to_string);
        match &name {
            Some(n) => info!(node = %n, "deconfiguring node"),
            None => warn!(?addrs, "no node record matches this host, removing services best effort"),
        }

        let plan = self.removal_plan(namespace, node.as_ref())?;

        for svc in &plan.services {
            if self.options.cancel.is_cancelled() {
                bail!("deconfigure cancelled before service {:?}", svc.name);
            }
            self.services
                .delete_service(&svc.name)
                .await
                .with_context(|| format!("removing service {:?}", svc.name))?;
        }

        self.reap_shims();

        let reboot = reconcile_env(self.env.as_ref(), &BTreeMap::new(), &plan.env_vars)
            .context("clearing environment variables")?;

        if let Some(name) = &name {
            let mut set = BTreeMap::new();
            if reboot {
                set.insert(REBOOT_ANNOTATION.to_string(), "true".to_string());
            }
            self.store
                .patch_node_annotations(name, &set, &[VERSION_ANNOTATION.to_string()])
                .with_context(|| format!("annotating node {}", name))?;
        } else if reboot {
            warn!("environment changed but there is no node record to request a reboot on");
        }
        info!(removed = plan.services.len(), reboot, "deconfigure complete");
        Ok(())
    }

    /// Services to remove, from the node's applied version and the latest
    /// version. Either alone is enough; when both exist and differ their
    /// lists are merged with the node's version taking precedence.
    pub fn removal_plan(&self, namespace: &str, node: Option<&Value>) -> Result<RemovalPlan> {
        let store = self.store.as_ref();

        let applied = node.and_then(|n| node_annotation(n, VERSION_ANNOTATION)).and_then(|version| {
            fetch_document(store, namespace, version)
                .map_err(|e| warn!(version, error = %format!("{:#}", e), "applied document unavailable"))
                .ok()
        });
        if node.is_some() && applied.is_none() {
            debug!("falling back to the latest document");
        }

        let latest = match latest_version(store, namespace) {
            Ok(Some(version)) => fetch_document(store, namespace, &version)
                .map_err(|e| warn!(%version, error = %format!("{:#}", e), "latest document unavailable"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "listing documents failed");
                None
            }
        };

        let plan = match (&applied, &latest) {
            (Some(a), Some(l)) if a.version != l.version => RemovalPlan::from_documents(&[a, l]),
            (Some(a), _) => RemovalPlan::from_documents(&[a]),
            (None, Some(l)) => RemovalPlan::from_documents(&[l]),
            (None, None) => return Err(LookupError::NoDocuments(namespace.to_string()).into()),
        };
        Ok(plan)
    }

    fn reap_shims(&self) {
        for name in &self.options.shim_process_names {
            match self.reaper.kill_by_name(name) {
                Ok(0) => debug!(process = %name, "no lingering processes"),
                Ok(killed) => info!(process = %name, killed, "killed lingering processes"),
                Err(e) => warn!(process = %name, error = %format!("{:#}", e), "could not kill lingering processes"),
            }
        }
    }
}
