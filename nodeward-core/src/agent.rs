// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::cluster::{document_data, node_annotation, parse_document, ClusterStore, LookupError};
use crate::envvars::{reconcile_env, EnvStore, RegistryEnvStore};
use crate::files::verify_files;
use crate::host::{ProcessReaper, SysinfoReaper, DEFAULT_SHIM_PROCESS};
use crate::reconcile::{Reconciler, SharedManager};
use crate::resolve::CommandResolver;
use crate::retry::RetryPolicy;
use crate::runner::{CommandRunner, PowershellRunner};
use anyhow::{Context, Result};
use nodeward_model::{ConfigurationDocument, DESIRED_VERSION_ANNOTATION, REBOOT_ANNOTATION, VERSION_ANNOTATION};
use nodeward_scm::{PollConfig, ServiceController};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct AgentOptions {
    /// Namespace holding the `services-<version>` documents.
    pub namespace: String,
    pub poll: PollConfig,
    pub retry: RetryPolicy,
    pub resync_interval: Duration,
    pub shim_process_names: Vec<String>,
    /// Addresses used to find this host's node record. Detected from the
    /// network interfaces when unset.
    pub local_addrs: Option<Vec<Ipv4Addr>>,
    pub cancel: CancellationToken,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            namespace: "kube-system".to_string(),
            poll: PollConfig::default(),
            retry: RetryPolicy::default(),
            resync_interval: Duration::from_secs(30),
            shim_process_names: vec![DEFAULT_SHIM_PROCESS.to_string()],
            local_addrs: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Everything the daemon does on one host: bootstrap, continuous
/// reconciliation against the node's desired version, and teardown.
pub struct NodeAgent {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) services: Arc<ServiceController<SharedManager>>,
    pub(crate) runner: Arc<dyn CommandRunner>,
    pub(crate) env: Arc<dyn EnvStore>,
    pub(crate) reaper: Arc<dyn ProcessReaper>,
    pub(crate) options: AgentOptions,
}

impl NodeAgent {
    /// Agent with the host defaults: PowerShell pre-scripts, the registry
    /// environment block and the sysinfo process reaper.
    pub fn new(store: Arc<dyn ClusterStore>, manager: SharedManager, options: AgentOptions) -> Self {
        let services = Arc::new(ServiceController::new(manager, options.poll.clone(), options.cancel.clone()));
        Self {
            store,
            services,
            runner: Arc::new(PowershellRunner::default()),
            env: Arc::new(RegistryEnvStore::default()),
            reaper: Arc::new(SysinfoReaper),
            options,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_env_store(mut self, env: Arc<dyn EnvStore>) -> Self {
        self.env = env;
        self
    }

    pub fn with_reaper(mut self, reaper: Arc<dyn ProcessReaper>) -> Self {
        self.reaper = reaper;
        self
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.options.cancel
    }

    pub(crate) fn reconciler(&self) -> Reconciler {
        Reconciler::new(self.services.clone(), CommandResolver::new(self.runner.clone()))
    }

    /// Retries only the store read. A document that arrives but does not
    /// parse fails at once, since fetching it again yields the same bytes.
    pub(crate) async fn fetch_with_retry(&self, version: &str) -> Result<ConfigurationDocument> {
        let what = format!("fetching document version {}", version);
        let data = self
            .options
            .retry
            .execute(&self.options.cancel, &what, || {
                document_data(self.store.as_ref(), &self.options.namespace, version)
            })
            .await?;
        parse_document(version, &data)
    }

    /// One full pass for `node_name`. Returns without touching the host
    /// when the node has no desired version yet.
    pub async fn reconcile_node(&self, node_name: &str) -> Result<()> {
        let node = self
            .options
            .retry
            .execute(&self.options.cancel, "fetching node record", || {
                self.store.get_node(node_name)?.ok_or_else(|| LookupError::NodeNotFound(node_name.to_string()).into())
            })
            .await?;

        let Some(desired) = node_annotation(&node, DESIRED_VERSION_ANNOTATION).map(str::to_string) else {
            debug!(node = %node_name, "no desired version requested");
            return Ok(());
        };
        let applied = node_annotation(&node, VERSION_ANNOTATION);

        let doc = self.fetch_with_retry(&desired).await?;
        verify_files(&doc.files).with_context(|| format!("verifying files of version {}", desired))?;

        self.reconciler()
            .reconcile(&doc.services, Some(&node))
            .await
            .with_context(|| format!("applying version {} to node {}", desired, node_name))?;

        let reboot = reconcile_env(self.env.as_ref(), &doc.environment_vars, &doc.watched_environment_vars)
            .context("reconciling environment variables")?;

        let mut set = BTreeMap::new();
        if applied != Some(desired.as_str()) {
            set.insert(VERSION_ANNOTATION.to_string(), desired.clone());
        }
        if reboot {
            warn!(node = %node_name, "environment changed, reboot required");
            set.insert(REBOOT_ANNOTATION.to_string(), "true".to_string());
        }
        if !set.is_empty() {
            self.store
                .patch_node_annotations(node_name, &set, &[])
                .with_context(|| format!("annotating node {}", node_name))?;
        }
        info!(node = %node_name, version = %desired, "node reconciled");
        Ok(())
    }

    /// Reconciles every `resync_interval` until cancelled. A failed pass is
    /// logged and retried on the next tick.
    pub async fn run(&self, node_name: &str) -> Result<()> {
        info!(node = %node_name, interval = ?self.options.resync_interval, "node agent started");
        loop {
            if let Err(e) = self.reconcile_node(node_name).await {
                error!(node = %node_name, error = %format!("{:#}", e), "reconcile failed");
            }
            tokio::select! {
                _ = self.options.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.resync_interval) => {}
            }
        }
        info!(node = %node_name, "node agent stopped");
        Ok(())
    }
}
