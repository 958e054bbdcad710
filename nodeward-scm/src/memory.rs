// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ScmError;
use crate::manager::{ServiceConfig, ServiceManager, ServiceStatus};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// A mutating call observed by [`MemoryManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    UpdateConfig(String),
    Start(String),
    Stop(String),
    Delete(String),
}

impl Call {
    pub fn service(&self) -> &str {
        match self {
            Call::Create(n) | Call::UpdateConfig(n) | Call::Start(n) | Call::Stop(n) | Call::Delete(n) => n,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    config: ServiceConfig,
    status: ServiceStatus,
    /// Status queries left before a pending state settles.
    settle_after: u32,
    /// Never leaves a pending state.
    hung: bool,
}

#[derive(Default)]
struct State {
    services: BTreeMap<String, Record>,
    calls: Vec<Call>,
    transition_polls: u32,
    hung: HashSet<String>,
}

/// Deterministic in-process service manager. Enforces the same refusals the
/// Windows SCM does: no stopping a service with running dependents, no
/// starting a service with stopped or missing dependencies, no starting a
/// running service, no deleting a service that has not stopped.
#[derive(Default)]
pub struct MemoryManager {
    state: Mutex<State>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start and stop requests report a pending state for `polls` status
    /// queries before settling.
    pub fn with_transition_polls(polls: u32) -> Self {
        let mgr = Self::default();
        mgr.lock().transition_polls = polls;
        mgr
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a service directly, bypassing the call log.
    pub fn seed(&self, name: &str, config: ServiceConfig, status: ServiceStatus) {
        self.lock().services.insert(
            name.to_string(),
            Record {
                config,
                status,
                settle_after: 0,
                hung: false,
            },
        );
    }

    /// Transitions of `name` never settle from now on.
    pub fn hang(&self, name: &str) {
        self.lock().hung.insert(name.to_string());
    }

    pub fn snapshot(&self, name: &str) -> Option<(ServiceConfig, ServiceStatus)> {
        self.lock()
            .services
            .get(name)
            .map(|r| (r.config.clone(), r.status))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn settled(record: &Record) -> ServiceStatus {
        match record.status {
            ServiceStatus::StartPending => ServiceStatus::Running,
            ServiceStatus::StopPending => ServiceStatus::Stopped,
            other => other,
        }
    }
}

impl State {
    fn record(&self, name: &str) -> Result<&Record, ScmError> {
        self.services
            .get(name)
            .ok_or_else(|| ScmError::NotFound(name.to_string()))
    }

    fn record_mut(&mut self, name: &str) -> Result<&mut Record, ScmError> {
        self.services
            .get_mut(name)
            .ok_or_else(|| ScmError::NotFound(name.to_string()))
    }

    fn transition(&mut self, name: &str, pending: ServiceStatus, settled: ServiceStatus) -> Result<(), ScmError> {
        let polls = self.transition_polls;
        let hung = self.hung.contains(name);
        let record = self.record_mut(name)?;
        record.hung = hung;
        if polls == 0 && !hung {
            record.status = settled;
        } else {
            record.status = pending;
            record.settle_after = polls;
        }
        Ok(())
    }
}

impl ServiceManager for MemoryManager {
    fn list(&self) -> Result<HashSet<String>, ScmError> {
        Ok(self.lock().services.keys().cloned().collect())
    }

    fn create(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        let mut state = self.lock();
        if state.services.contains_key(name) {
            return Err(ScmError::AlreadyExists(name.to_string()));
        }
        state.services.insert(
            name.to_string(),
            Record {
                config: config.clone(),
                status: ServiceStatus::Stopped,
                settle_after: 0,
                hung: false,
            },
        );
        state.calls.push(Call::Create(name.to_string()));
        Ok(())
    }

    fn status(&self, name: &str) -> Result<ServiceStatus, ScmError> {
        let mut state = self.lock();
        let record = state.record_mut(name)?;
        if record.status.is_pending() && !record.hung {
            if record.settle_after == 0 {
                let settled = Self::settled(record);
                record.status = settled;
            } else {
                record.settle_after -= 1;
            }
        }
        Ok(record.status)
    }

    fn config(&self, name: &str) -> Result<ServiceConfig, ScmError> {
        Ok(self.lock().record(name)?.config.clone())
    }

    fn update_config(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        let mut state = self.lock();
        state.record_mut(name)?.config = config.clone();
        state.calls.push(Call::UpdateConfig(name.to_string()));
        Ok(())
    }

    fn start(&self, name: &str) -> Result<(), ScmError> {
        let mut state = self.lock();
        let record = state.record(name)?;
        if matches!(record.status, ServiceStatus::Running | ServiceStatus::StartPending) {
            return Err(ScmError::AlreadyRunning(name.to_string()));
        }
        for dep in &record.config.dependencies {
            match state.services.get(dep) {
                None => {
                    return Err(ScmError::DependencyMissing {
                        service: name.to_string(),
                        dependency: dep.clone(),
                    })
                }
                Some(d) if d.status != ServiceStatus::Running => {
                    return Err(ScmError::DependencyNotRunning {
                        service: name.to_string(),
                        dependency: dep.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        state.transition(name, ServiceStatus::StartPending, ServiceStatus::Running)?;
        state.calls.push(Call::Start(name.to_string()));
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), ScmError> {
        let mut state = self.lock();
        if state.record(name)?.status == ServiceStatus::Stopped {
            return Err(ScmError::NotRunning(name.to_string()));
        }
        let running_dependent = state.services.iter().find(|(_, r)| {
            r.status != ServiceStatus::Stopped && r.config.dependencies.iter().any(|d| d == name)
        });
        if let Some((dependent, _)) = running_dependent {
            return Err(ScmError::DependentRunning {
                service: name.to_string(),
                dependent: dependent.clone(),
            });
        }
        state.transition(name, ServiceStatus::StopPending, ServiceStatus::Stopped)?;
        state.calls.push(Call::Stop(name.to_string()));
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), ScmError> {
        let mut state = self.lock();
        if state.record(name)?.status != ServiceStatus::Stopped {
            return Err(ScmError::StillRunning(name.to_string()));
        }
        state.services.remove(name);
        state.calls.push(Call::Delete(name.to_string()));
        Ok(())
    }

    fn dependents(&self, name: &str) -> Result<Vec<String>, ScmError> {
        let state = self.lock();
        state.record(name)?;
        Ok(state
            .services
            .iter()
            .filter(|(_, r)| r.config.dependencies.iter().any(|d| d == name))
            .map(|(n, _)| n.clone())
            .collect())
    }
}
