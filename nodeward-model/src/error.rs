// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("document is missing required key {0:?}")]
    MissingKey(&'static str),
    #[error("document contains unrecognized key {0:?}")]
    UnknownKey(String),
    #[error("document key {key:?} is malformed")]
    Malformed {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("service definition has an empty name")]
    EmptyName,
    #[error("service {0:?} is defined more than once")]
    DuplicateName(String),
    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error(
        "bootstrap service {bootstrap:?} (priority {bootstrap_priority}) must have a lower priority \
         than service {service:?} (priority {priority})"
    )]
    PriorityPartition {
        bootstrap: String,
        bootstrap_priority: u32,
        service: String,
        priority: u32,
    },
    #[error("bootstrap service {service:?} cannot use node variable {variable:?}")]
    BootstrapNodeVariable { service: String, variable: String },
    #[error("bootstrap service {service:?} depends on non-bootstrap service {dependency:?}")]
    BootstrapDependsOnService { service: String, dependency: String },
}
