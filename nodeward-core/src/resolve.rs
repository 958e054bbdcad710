// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use crate::jsonpath;
use crate::runner::CommandRunner;
use nodeward_model::ServiceDefinition;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("service {service:?}: variable {variable:?} needs a node record and none is available")]
    NoNodeIdentity { service: String, variable: String },
    #[error("service {service:?}: path {path:?} for {variable:?} is invalid: {reason}")]
    InvalidPath {
        service: String,
        variable: String,
        path: String,
        reason: String,
    },
    #[error("service {service:?}: path {path:?} for {variable:?} matched nothing")]
    NoMatch {
        service: String,
        variable: String,
        path: String,
    },
    #[error("service {service:?}: path {path:?} for {variable:?} matched {count} values, expected exactly one")]
    MultipleMatches {
        service: String,
        variable: String,
        path: String,
        count: usize,
    },
    #[error("service {service:?}: path {path:?} for {variable:?} is not a string")]
    NotAString {
        service: String,
        variable: String,
        path: String,
    },
    #[error("service {service:?}: pre-script {path:?} for {variable:?} failed: {message}")]
    PreScript {
        service: String,
        variable: String,
        path: String,
        message: String,
    },
}

/// Turns a command template into the concrete command line for this node.
pub struct CommandResolver {
    runner: Arc<dyn CommandRunner>,
}

impl CommandResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Resolves every variable first and only then substitutes, so a single
    /// failure leaves nothing half-applied. Node variables are substituted
    /// before pre-script variables, each in declaration order.
    pub fn resolve(&self, def: &ServiceDefinition, node: Option<&Value>) -> Result<String, ResolveError> {
        let mut substitutions = Vec::new();

        for var in &def.node_variables {
            let value = resolve_node_variable(def, &var.name, &var.node_object_json_path, node)?;
            substitutions.push((var.name.as_str(), value));
        }

        for var in def.pre_script_variables.iter().filter(|v| !v.variable_name.is_empty()) {
            let output = self.runner.run(&var.path).map_err(|e| ResolveError::PreScript {
                service: def.name.clone(),
                variable: var.variable_name.clone(),
                path: var.path.clone(),
                message: format!("{:#}", e),
            })?;
            substitutions.push((var.variable_name.as_str(), output.trim().to_string()));
        }

        let mut command = def.command.clone();
        for (token, value) in substitutions {
            command = command.replace(token, &value);
        }
        Ok(command)
    }
}

fn resolve_node_variable(
    def: &ServiceDefinition,
    variable: &str,
    path: &str,
    node: Option<&Value>,
) -> Result<String, ResolveError> {
    let node = node.ok_or_else(|| ResolveError::NoNodeIdentity {
        service: def.name.clone(),
        variable: variable.to_string(),
    })?;

    let matches = jsonpath::evaluate(path, node).map_err(|reason| ResolveError::InvalidPath {
        service: def.name.clone(),
        variable: variable.to_string(),
        path: path.to_string(),
        reason,
    })?;

    match matches.as_slice() {
        [] => Err(ResolveError::NoMatch {
            service: def.name.clone(),
            variable: variable.to_string(),
            path: path.to_string(),
        }),
        [Value::String(s)] => Ok(s.clone()),
        [_] => Err(ResolveError::NotAString {
            service: def.name.clone(),
            variable: variable.to_string(),
            path: path.to_string(),
        }),
        many => Err(ResolveError::MultipleMatches {
            service: def.name.clone(),
            variable: variable.to_string(),
            path: path.to_string(),
            count: many.len(),
        }),
    }
}
