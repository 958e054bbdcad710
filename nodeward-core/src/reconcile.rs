// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::resolve::CommandResolver;
use anyhow::{bail, Context, Result};
use nodeward_model::ServiceDefinition;
use nodeward_scm::{ServiceConfig, ServiceController, ServiceManager, ServiceStatus};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Binary path a service is registered with until its real command is known.
pub const PLACEHOLDER_COMMAND: &str = "nodeward-pending";

pub type SharedManager = Arc<dyn ServiceManager>;

/// Drives the host's services toward a desired service list. Holds no state
/// between calls: every pass re-reads the service manager and re-diffs.
pub struct Reconciler {
    services: Arc<ServiceController<SharedManager>>,
    resolver: CommandResolver,
}

impl Reconciler {
    pub fn new(services: Arc<ServiceController<SharedManager>>, resolver: CommandResolver) -> Self {
        Self { services, resolver }
    }

    /// Processes `desired` strictly in order and stops at the first failure.
    /// `node` is the node identity record, absent during bootstrap.
    pub async fn reconcile(&self, desired: &[ServiceDefinition], node: Option<&Value>) -> Result<()> {
        let existing = self.services.list_services().context("listing services")?;
        for def in desired {
            if self.services.cancel_token().is_cancelled() {
                bail!("reconcile cancelled before service {:?}", def.name);
            }
            self.reconcile_service(def, &existing, node)
                .await
                .with_context(|| format!("reconciling service {:?}", def.name))?;
        }
        Ok(())
    }

    async fn reconcile_service(
        &self,
        def: &ServiceDefinition,
        existing: &HashSet<String>,
        node: Option<&Value>,
    ) -> Result<()> {
        let handle = if existing.contains(&def.name) {
            self.services.open_service(&def.name)?
        } else {
            let stub = ServiceConfig::new(PLACEHOLDER_COMMAND, Vec::new(), def.description());
            self.services.create_service(&def.name, &stub)?
        };

        let command = self.resolver.resolve(def, node)?;
        let desired = ServiceConfig::new(command, def.dependencies.clone(), def.description());
        let current = self.services.get_config(&handle)?;

        let mut interrupted = Vec::new();
        if needs_update(&current, &desired) {
            info!(service = %def.name, "service configuration drifted");
            interrupted = self.services.stop_with_dependents(&handle).await?;
            self.services.update_config(&handle, &desired)?;
        } else {
            debug!(service = %def.name, "service configuration up to date");
        }

        self.services.ensure_state(&handle, ServiceStatus::Running).await?;

        // Dependents taken down for the reconfiguration, including ones
        // this daemon does not manage.
        for name in interrupted {
            info!(service = %name, dependency = %def.name, "restarting dependent");
            let dependent = self.services.open_service(&name)?;
            self.services.ensure_state(&dependent, ServiceStatus::Running).await?;
        }
        Ok(())
    }
}

/// Dependencies compare as sets, so ordering and an unset list never cause churn.
pub fn needs_update(current: &ServiceConfig, desired: &ServiceConfig) -> bool {
    let deps = |c: &ServiceConfig| c.dependencies.iter().cloned().collect::<BTreeSet<_>>();
    current.binary_path != desired.binary_path
        || current.description != desired.description
        || deps(current) != deps(desired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(bin: &str, deps: &[&str]) -> ServiceConfig {
        ServiceConfig::new(bin, deps.iter().map(|d| d.to_string()).collect(), "nodeward managed x")
    }

    #[test]
    fn dependency_order_is_not_drift() {
        assert!(!needs_update(&cfg("x", &["a", "b"]), &cfg("x", &["b", "a"])));
        assert!(!needs_update(&cfg("x", &[]), &cfg("x", &[])));
    }

    #[test]
    fn any_field_change_is_drift() {
        assert!(needs_update(&cfg("x", &[]), &cfg("y", &[])));
        assert!(needs_update(&cfg("x", &["a"]), &cfg("x", &[])));
        let mut other = cfg("x", &[]);
        other.description = "something else".into();
        assert!(needs_update(&cfg("x", &[]), &other));
    }
}
