// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ScmError;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceStatus {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl ServiceStatus {
    /// Maps the numeric `SERVICE_STATUS.dwCurrentState` value.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Stopped),
            2 => Some(Self::StartPending),
            3 => Some(Self::StopPending),
            4 => Some(Self::Running),
            5 => Some(Self::ContinuePending),
            6 => Some(Self::PausePending),
            7 => Some(Self::Paused),
            _ => None,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::StartPending | Self::StopPending | Self::ContinuePending | Self::PausePending
        )
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Stopped => write!(f, "Stopped"),
            ServiceStatus::StartPending => write!(f, "StartPending"),
            ServiceStatus::StopPending => write!(f, "StopPending"),
            ServiceStatus::Running => write!(f, "Running"),
            ServiceStatus::ContinuePending => write!(f, "ContinuePending"),
            ServiceStatus::PausePending => write!(f, "PausePending"),
            ServiceStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// The mutable part of a service registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Full command line, binary path first.
    pub binary_path: String,
    pub dependencies: Vec<String>,
    pub description: String,
}

impl ServiceConfig {
    pub fn new(binary_path: impl Into<String>, dependencies: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
            dependencies,
            description: description.into(),
        }
    }
}

/// Raw primitives of a host service control manager. Implementations report
/// the OS semantics as they are (a running dependent blocks a stop, a stopped
/// dependency blocks a start); ordering on top of that lives in
/// [`ServiceController`](crate::ServiceController).
pub trait ServiceManager: Send + Sync {
    /// Every service name the OS knows about.
    fn list(&self) -> Result<HashSet<String>, ScmError>;

    fn create(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError>;

    fn status(&self, name: &str) -> Result<ServiceStatus, ScmError>;

    fn config(&self, name: &str) -> Result<ServiceConfig, ScmError>;

    fn update_config(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError>;

    /// Requests a start. Returns once the request is accepted, not once running.
    fn start(&self, name: &str) -> Result<(), ScmError>;

    /// Requests a stop. Returns once the request is accepted, not once stopped.
    fn stop(&self, name: &str) -> Result<(), ScmError>;

    fn delete(&self, name: &str) -> Result<(), ScmError>;

    /// Services whose dependency list names `name` directly.
    fn dependents(&self, name: &str) -> Result<Vec<String>, ScmError>;
}

impl<T: ServiceManager + ?Sized> ServiceManager for Arc<T> {
    fn list(&self) -> Result<HashSet<String>, ScmError> {
        (**self).list()
    }
    fn create(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        (**self).create(name, config)
    }
    fn status(&self, name: &str) -> Result<ServiceStatus, ScmError> {
        (**self).status(name)
    }
    fn config(&self, name: &str) -> Result<ServiceConfig, ScmError> {
        (**self).config(name)
    }
    fn update_config(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        (**self).update_config(name, config)
    }
    fn start(&self, name: &str) -> Result<(), ScmError> {
        (**self).start(name)
    }
    fn stop(&self, name: &str) -> Result<(), ScmError> {
        (**self).stop(name)
    }
    fn delete(&self, name: &str) -> Result<(), ScmError> {
        (**self).delete(name)
    }
    fn dependents(&self, name: &str) -> Result<Vec<String>, ScmError> {
        (**self).dependents(name)
    }
}
