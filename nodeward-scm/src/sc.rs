// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ScmError;
use crate::manager::{ServiceConfig, ServiceManager, ServiceStatus};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

// Win32 error codes sc.exe returns as its exit status.
const ERROR_DEPENDENT_SERVICES_RUNNING: i32 = 1051;
const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
const ERROR_SERVICE_DEPENDENCY_FAIL: i32 = 1068;
const ERROR_SERVICE_EXISTS: i32 = 1073;

const BUFFER_SIZE: &str = "8192";

/// Drives the Windows service control manager through `sc.exe`. Failures are
/// classified by exit code and fields are read by their fixed keys, so nothing
/// depends on the display language of the host.
pub struct ScManager {
    sc_path: PathBuf,
}

impl Default for ScManager {
    fn default() -> Self {
        Self::new("sc.exe")
    }
}

impl ScManager {
    pub fn new(sc_path: impl Into<PathBuf>) -> Self {
        Self { sc_path: sc_path.into() }
    }

    fn run(&self, op: &'static str, name: Option<&str>, args: &[&str]) -> Result<String, ScmError> {
        debug!(op, ?args, "invoking sc.exe");
        let output = Command::new(&self.sc_path)
            .args(args)
            .output()
            .map_err(|e| ScmError::Backend {
                op,
                message: format!("failed to run {}: {}", self.sc_path.display(), e),
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let service = name.unwrap_or_default().to_string();
        let err = match output.status.code() {
            Some(ERROR_SERVICE_DOES_NOT_EXIST) => ScmError::NotFound(service),
            Some(ERROR_SERVICE_EXISTS) => ScmError::AlreadyExists(service),
            Some(ERROR_SERVICE_ALREADY_RUNNING) => ScmError::AlreadyRunning(service),
            Some(ERROR_SERVICE_NOT_ACTIVE) => ScmError::NotRunning(service),
            Some(ERROR_DEPENDENT_SERVICES_RUNNING) => ScmError::DependentRunning {
                service,
                dependent: "<unknown>".to_string(),
            },
            Some(ERROR_SERVICE_DEPENDENCY_FAIL) => ScmError::DependencyNotRunning {
                service,
                dependency: "<unknown>".to_string(),
            },
            code => ScmError::Backend {
                op,
                message: format!(
                    "exit code {:?}: {}{}",
                    code,
                    stdout.trim(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            },
        };
        Err(err)
    }

    fn set_description(&self, name: &str, description: &str) -> Result<(), ScmError> {
        self.run("description", Some(name), &["description", name, description])?;
        Ok(())
    }
}

fn depend_arg(dependencies: &[String]) -> String {
    if dependencies.is_empty() {
        // sc.exe clears the list when given a lone separator.
        "/".to_string()
    } else {
        dependencies.join("/")
    }
}

/// Value of `KEY : value` lines in sc.exe output.
fn field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim() == key).then(|| v.trim())
    })
}

fn service_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("SERVICE_NAME:"))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

fn parse_state(output: &str) -> Option<ServiceStatus> {
    let raw = field(output, "STATE")?;
    let code = raw.split_whitespace().next()?.parse().ok()?;
    ServiceStatus::from_code(code)
}

/// DEPENDENCIES continues on following lines that carry only `: value`.
fn parse_dependencies(output: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_block = false;
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some((k, v)) = trimmed.split_once(':') {
            let key = k.trim();
            if key == "DEPENDENCIES" {
                in_block = true;
            } else if !key.is_empty() {
                in_block = false;
            }
            if in_block {
                let dep = v.trim();
                // Group dependencies are prefixed with '+'.
                if !dep.is_empty() && !dep.starts_with('+') {
                    deps.push(dep.to_string());
                }
            }
        } else {
            in_block = false;
        }
    }
    deps
}

impl ServiceManager for ScManager {
    fn list(&self) -> Result<HashSet<String>, ScmError> {
        let out = self.run("list", None, &["query", "type=", "service", "state=", "all", "bufsize=", "65536"])?;
        Ok(service_names(&out).into_iter().collect())
    }

    fn create(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        let depend = depend_arg(&config.dependencies);
        self.run(
            "create",
            Some(name),
            &[
                "create",
                name,
                "binPath=",
                &config.binary_path,
                "start=",
                "auto",
                "depend=",
                &depend,
                "DisplayName=",
                name,
            ],
        )?;
        self.set_description(name, &config.description)
    }

    fn status(&self, name: &str) -> Result<ServiceStatus, ScmError> {
        let out = self.run("status", Some(name), &["query", name])?;
        parse_state(&out).ok_or_else(|| ScmError::Backend {
            op: "status",
            message: format!("no STATE field for {:?}", name),
        })
    }

    fn config(&self, name: &str) -> Result<ServiceConfig, ScmError> {
        let qc = self.run("config", Some(name), &["qc", name, BUFFER_SIZE])?;
        let desc = self.run("config", Some(name), &["qdescription", name, BUFFER_SIZE])?;
        Ok(ServiceConfig {
            binary_path: field(&qc, "BINARY_PATH_NAME").unwrap_or_default().to_string(),
            dependencies: parse_dependencies(&qc),
            description: field(&desc, "DESCRIPTION").unwrap_or_default().to_string(),
        })
    }

    fn update_config(&self, name: &str, config: &ServiceConfig) -> Result<(), ScmError> {
        let depend = depend_arg(&config.dependencies);
        self.run(
            "update_config",
            Some(name),
            &["config", name, "binPath=", &config.binary_path, "depend=", &depend],
        )?;
        self.set_description(name, &config.description)
    }

    fn start(&self, name: &str) -> Result<(), ScmError> {
        self.run("start", Some(name), &["start", name]).map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<(), ScmError> {
        self.run("stop", Some(name), &["stop", name]).map(|_| ())
    }

    fn delete(&self, name: &str) -> Result<(), ScmError> {
        self.run("delete", Some(name), &["delete", name]).map(|_| ())
    }

    fn dependents(&self, name: &str) -> Result<Vec<String>, ScmError> {
        let out = self.run("dependents", Some(name), &["enumdepend", name, BUFFER_SIZE])?;
        Ok(service_names(&out))
    }
}
