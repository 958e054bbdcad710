// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::agent::NodeAgent;
use anyhow::{Context, Result};
use tracing::info;

impl NodeAgent {
    /// Brings up the services a node needs before it can register with the
    /// cluster. No node record exists yet, so only bootstrap services of
    /// exactly `version` are applied and node variables cannot resolve.
    pub async fn bootstrap(&self, version: &str) -> Result<()> {
        let doc = self.fetch_with_retry(version).await?;
        let services = doc.bootstrap_services();
        if services.is_empty() {
            info!(version = %version, "document has no bootstrap services");
            return Ok(());
        }
        info!(version = %version, count = services.len(), "bootstrapping");
        self.reconciler()
            .reconcile(&services, None)
            .await
            .with_context(|| format!("bootstrapping version {}", version))
    }
}
