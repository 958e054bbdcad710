// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::manager::ServiceStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScmError {
    #[error("service {0:?} does not exist")]
    NotFound(String),
    #[error("service {0:?} already exists")]
    AlreadyExists(String),
    #[error("service {0:?} is already running")]
    AlreadyRunning(String),
    #[error("service {0:?} is not running")]
    NotRunning(String),
    #[error("service {0:?} must be stopped before it can be deleted")]
    StillRunning(String),
    #[error("cannot stop {service:?}: dependent service {dependent:?} is running")]
    DependentRunning { service: String, dependent: String },
    #[error("cannot start {service:?}: dependency {dependency:?} is not running")]
    DependencyNotRunning { service: String, dependency: String },
    #[error("service {service:?} depends on missing service {dependency:?}")]
    DependencyMissing { service: String, dependency: String },
    #[error("dependency cycle through service {0:?}")]
    DependencyCycle(String),
    #[error("timed out after {timeout:?} waiting for {service:?} to reach {state}")]
    Timeout {
        service: String,
        state: ServiceStatus,
        timeout: Duration,
    },
    #[error("cancelled while waiting for {0:?}")]
    Cancelled(String),
    #[error("service manager call {op} failed: {message}")]
    Backend { op: &'static str, message: String },
}
