// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

pub mod agent;
pub mod bootstrap;
pub mod cluster;
pub mod envvars;
pub mod files;
pub mod host;
pub mod jsonpath;
pub mod reconcile;
pub mod resolve;
pub mod retry;
pub mod runner;
pub mod teardown;

pub use agent::{AgentOptions, NodeAgent};
pub use cluster::{ClusterStore, FileClusterStore, LookupError};
pub use envvars::{reconcile_env, EnvStore, RegistryEnvStore};
pub use host::{local_ipv4_addrs, ProcessReaper, SysinfoReaper};
pub use reconcile::Reconciler;
pub use resolve::{CommandResolver, ResolveError};
pub use retry::RetryPolicy;
pub use teardown::RemovalPlan;
pub use runner::{CommandRunner, PowershellRunner};

pub use nodeward_model as model;
pub use nodeward_scm as scm;
