// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ScmError;
use crate::manager::{ServiceConfig, ServiceManager, ServiceStatus};
use crate::wait::{poll_immediate, PollOutcome};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(120),
        }
    }
}

/// An opened service registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    name: String,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Uniform service control on top of a [`ServiceManager`] backend. Every
/// start or stop is followed by a wait for the state to settle, and both
/// directions walk the dependency graph so the backend never sees a request
/// it would refuse for ordering reasons.
pub struct ServiceController<M> {
    manager: M,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl<M: ServiceManager> ServiceController<M> {
    pub fn new(manager: M, poll: PollConfig, cancel: CancellationToken) -> Self {
        Self { manager, poll, cancel }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn list_services(&self) -> Result<HashSet<String>, ScmError> {
        self.manager.list()
    }

    pub fn create_service(&self, name: &str, config: &ServiceConfig) -> Result<ServiceHandle, ScmError> {
        info!(service = %name, "creating service");
        self.manager.create(name, config)?;
        Ok(ServiceHandle { name: name.to_string() })
    }

    pub fn open_service(&self, name: &str) -> Result<ServiceHandle, ScmError> {
        self.manager.status(name)?;
        Ok(ServiceHandle { name: name.to_string() })
    }

    pub fn get_config(&self, handle: &ServiceHandle) -> Result<ServiceConfig, ScmError> {
        self.manager.config(&handle.name)
    }

    pub fn update_config(&self, handle: &ServiceHandle, config: &ServiceConfig) -> Result<(), ScmError> {
        info!(service = %handle.name, binary_path = %config.binary_path, "updating service configuration");
        self.manager.update_config(&handle.name, config)
    }

    /// Stops everything that depends on `name`, stops `name`, then removes
    /// it. A service that does not exist counts as already deleted.
    pub async fn delete_service(&self, name: &str) -> Result<(), ScmError> {
        if !self.manager.list()?.contains(name) {
            debug!(service = %name, "service already absent");
            return Ok(());
        }
        let handle = ServiceHandle { name: name.to_string() };
        self.ensure_state(&handle, ServiceStatus::Stopped).await?;
        info!(service = %name, "deleting service");
        self.manager.delete(name)
    }

    /// Drives the service to `desired` (Running or Stopped). Reaching
    /// Running first brings up the transitive dependency closure; reaching
    /// Stopped first brings down every transitive dependent.
    pub async fn ensure_state(&self, handle: &ServiceHandle, desired: ServiceStatus) -> Result<(), ScmError> {
        match desired {
            ServiceStatus::Running => {
                for name in self.dependency_closure(&handle.name)? {
                    self.start_one(&name).await?;
                }
                Ok(())
            }
            ServiceStatus::Stopped => {
                for name in self.dependent_closure(&handle.name)? {
                    self.stop_one(&name).await?;
                }
                Ok(())
            }
            other => Err(ScmError::Backend {
                op: "ensure_state",
                message: format!("{} is not a target state", other),
            }),
        }
    }

    /// Stops `handle` the way `ensure_state(Stopped)` does and returns the
    /// dependents that were up beforehand, dependencies first, so a caller
    /// can bring them back once the service runs again.
    pub async fn stop_with_dependents(&self, handle: &ServiceHandle) -> Result<Vec<String>, ScmError> {
        let mut interrupted = Vec::new();
        for name in self.dependent_closure(&handle.name)? {
            let was_up = self.manager.status(&name)? != ServiceStatus::Stopped;
            self.stop_one(&name).await?;
            if was_up && name != handle.name {
                interrupted.push(name);
            }
        }
        interrupted.reverse();
        Ok(interrupted)
    }

    async fn start_one(&self, name: &str) -> Result<(), ScmError> {
        match self.manager.status(name)? {
            ServiceStatus::Running => return Ok(()),
            ServiceStatus::StartPending => return self.wait_for(name, ServiceStatus::Running).await,
            ServiceStatus::StopPending => self.wait_for(name, ServiceStatus::Stopped).await?,
            _ => {}
        }
        info!(service = %name, "starting service");
        self.manager.start(name)?;
        self.wait_for(name, ServiceStatus::Running).await
    }

    async fn stop_one(&self, name: &str) -> Result<(), ScmError> {
        match self.manager.status(name)? {
            ServiceStatus::Stopped => return Ok(()),
            ServiceStatus::StopPending => return self.wait_for(name, ServiceStatus::Stopped).await,
            ServiceStatus::StartPending => self.wait_for(name, ServiceStatus::Running).await?,
            _ => {}
        }
        info!(service = %name, "stopping service");
        self.manager.stop(name)?;
        self.wait_for(name, ServiceStatus::Stopped).await
    }

    async fn wait_for(&self, name: &str, state: ServiceStatus) -> Result<(), ScmError> {
        let outcome = poll_immediate(&self.cancel, self.poll.interval, self.poll.timeout, || {
            let current = self.manager.status(name)?;
            debug!(service = %name, %current, target = %state, "polling service state");
            Ok::<_, ScmError>(current == state)
        })
        .await?;
        match outcome {
            PollOutcome::Done => Ok(()),
            PollOutcome::TimedOut => Err(ScmError::Timeout {
                service: name.to_string(),
                state,
                timeout: self.poll.timeout,
            }),
            PollOutcome::Cancelled => Err(ScmError::Cancelled(name.to_string())),
        }
    }

    /// `name` and everything it transitively depends on, dependencies first.
    fn dependency_closure(&self, name: &str) -> Result<Vec<String>, ScmError> {
        let existing = self.manager.list()?;
        if !existing.contains(name) {
            return Err(ScmError::NotFound(name.to_string()));
        }
        self.closure(name, |n| {
            let deps = self.manager.config(n)?.dependencies;
            for dep in &deps {
                if !existing.contains(dep) {
                    return Err(ScmError::DependencyMissing {
                        service: n.to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
            Ok(deps)
        })
    }

    /// `name` and everything that transitively depends on it, dependents first.
    fn dependent_closure(&self, name: &str) -> Result<Vec<String>, ScmError> {
        self.closure(name, |n| self.manager.dependents(n))
    }

    /// Post-order walk of the graph given by `edges`.
    fn closure<F>(&self, root: &str, mut edges: F) -> Result<Vec<String>, ScmError>
    where
        F: FnMut(&str) -> Result<Vec<String>, ScmError>,
    {
        #[derive(PartialEq)]
        enum Mark {
            Open,
            Closed,
        }

        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut order = Vec::new();
        // (node, children, next child index)
        let mut stack: Vec<(String, Vec<String>, usize)> = Vec::new();

        marks.insert(root.to_string(), Mark::Open);
        stack.push((root.to_string(), edges(root)?, 0));

        while let Some((node, children, idx)) = stack.last_mut() {
            if let Some(child) = children.get(*idx).cloned() {
                *idx += 1;
                match marks.get(&child) {
                    Some(Mark::Closed) => continue,
                    Some(Mark::Open) => return Err(ScmError::DependencyCycle(child)),
                    None => {}
                }
                let grandchildren = edges(&child)?;
                marks.insert(child.clone(), Mark::Open);
                stack.push((child, grandchildren, 0));
            } else {
                let node = node.clone();
                stack.pop();
                marks.insert(node.clone(), Mark::Closed);
                order.push(node);
            }
        }
        Ok(order)
    }
}
