// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::error::ValidationError;
use crate::MANAGED_TAG;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One native service the node should run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceDefinition {
    pub name: String,

    /// Command line template. Placeholders are replaced literally.
    pub command: String,

    /// Placeholders filled from the node identity record.
    #[serde(default)]
    pub node_variables: Vec<NodeVariable>,

    /// Placeholders filled from the output of local scripts.
    #[serde(default)]
    pub pre_script_variables: Vec<PreScriptVariable>,

    /// Services that must be running before this one starts. Names that are
    /// not part of the document are assumed to be managed elsewhere.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Set for services that must run before a Node object exists.
    #[serde(default)]
    pub bootstrap: bool,

    /// Lower values are created and started first.
    pub priority: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeVariable {
    /// Placeholder token as it appears in the command.
    pub name: String,
    /// Path query evaluated against the node record, e.g. `{.metadata.name}`.
    pub node_object_json_path: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreScriptVariable {
    /// Placeholder token. Empty means the script runs only for its side effects.
    #[serde(default)]
    pub variable_name: String,
    pub path: String,
}

impl ServiceDefinition {
    pub fn new(name: impl Into<String>, command: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            node_variables: Vec::new(),
            pre_script_variables: Vec::new(),
            dependencies: Vec::new(),
            bootstrap: false,
            priority,
        }
    }

    /// Description written to the OS service manager for this service.
    pub fn description(&self) -> String {
        managed_description(&self.name)
    }
}

pub fn managed_description(name: &str) -> String {
    format!("{} {}", MANAGED_TAG, name)
}

/// Orders services by ascending priority, keeping document order on ties.
pub fn sort_by_priority(services: &mut [ServiceDefinition]) {
    services.sort_by_key(|s| s.priority);
}

/// Checks the invariants a desired-state document must hold.
pub fn validate_services(services: &[ServiceDefinition]) -> Result<(), ValidationError> {
    let mut by_name: HashMap<&str, &ServiceDefinition> = HashMap::new();
    for svc in services {
        if svc.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if by_name.insert(svc.name.as_str(), svc).is_some() {
            return Err(ValidationError::DuplicateName(svc.name.clone()));
        }
    }

    for svc in services.iter().filter(|s| s.bootstrap) {
        if let Some(var) = svc.node_variables.first() {
            return Err(ValidationError::BootstrapNodeVariable {
                service: svc.name.clone(),
                variable: var.name.clone(),
            });
        }
        for dep in &svc.dependencies {
            if by_name.get(dep.as_str()).is_some_and(|d| !d.bootstrap) {
                return Err(ValidationError::BootstrapDependsOnService {
                    service: svc.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    check_priority_partition(services)?;
    check_acyclic(services, &by_name)
}

fn check_priority_partition(services: &[ServiceDefinition]) -> Result<(), ValidationError> {
    let highest_bootstrap = services
        .iter()
        .filter(|s| s.bootstrap)
        .max_by_key(|s| s.priority);
    let lowest_regular = services
        .iter()
        .filter(|s| !s.bootstrap)
        .min_by_key(|s| s.priority);

    match (highest_bootstrap, lowest_regular) {
        (Some(b), Some(r)) if b.priority >= r.priority => Err(ValidationError::PriorityPartition {
            bootstrap: b.name.clone(),
            bootstrap_priority: b.priority,
            service: r.name.clone(),
            priority: r.priority,
        }),
        _ => Ok(()),
    }
}

fn check_acyclic(
    services: &[ServiceDefinition],
    by_name: &HashMap<&str, &ServiceDefinition>,
) -> Result<(), ValidationError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&str, &'a ServiceDefinition>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), ValidationError> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(name.to_string());
                return Err(ValidationError::DependencyCycle(cycle));
            }
            None => {}
        }
        let Some(svc) = by_name.get(name) else {
            // External dependency.
            return Ok(());
        };
        marks.insert(name, Mark::Visiting);
        path.push(name);
        for dep in &svc.dependencies {
            visit(dep.as_str(), by_name, marks, path)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    for svc in services {
        visit(svc.name.as_str(), by_name, &mut marks, &mut path)?;
    }
    Ok(())
}

/// Union of two service lists by name. Entries of `primary` win on collision and
/// its order is kept; entries only in `secondary` follow in their own order.
pub fn merge_services(
    primary: &[ServiceDefinition],
    secondary: &[ServiceDefinition],
) -> Vec<ServiceDefinition> {
    let mut seen = HashSet::new();
    primary
        .iter()
        .chain(secondary.iter())
        .filter(|svc| seen.insert(svc.name.clone()))
        .cloned()
        .collect()
}
