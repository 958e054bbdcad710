// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

//! Deterministic stand-ins for the cluster, the registry, pre-scripts and the
//! process table, plus a [`Harness`] wiring them into a [`NodeAgent`].

mod cluster;
mod host;

pub use cluster::{node_record, MemoryClusterStore};
pub use host::{MemoryEnvStore, RecordingReaper, ScriptedRunner};

use nodeward_core::{AgentOptions, NodeAgent, RetryPolicy};
use nodeward_scm::{MemoryManager, PollConfig};
use std::sync::{Arc, Once};
use std::time::Duration;

/// Address every harness host reports for itself.
pub const HOST_ADDR: &str = "10.0.0.10";

static LOGGING: Once = Once::new();

/// Routes `tracing` output through the test writer. `RUST_LOG` applies.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Options with millisecond polling and retries so tests never sleep long.
pub fn fast_options(namespace: &str) -> AgentOptions {
    AgentOptions {
        namespace: namespace.to_string(),
        poll: PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(200),
        },
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
            budget: Duration::from_millis(100),
        },
        resync_interval: Duration::from_millis(5),
        shim_process_names: vec!["containerd-shim-runhcs-v1.exe".to_string()],
        local_addrs: HOST_ADDR.parse().ok().map(|a| vec![a]),
        ..AgentOptions::default()
    }
}

/// One simulated host and cluster.
pub struct Harness {
    pub manager: Arc<MemoryManager>,
    pub store: Arc<MemoryClusterStore>,
    pub env: Arc<MemoryEnvStore>,
    pub runner: Arc<ScriptedRunner>,
    pub reaper: Arc<RecordingReaper>,
    pub agent: NodeAgent,
}

impl Harness {
    pub fn new(namespace: &str) -> Self {
        Self::with_options(fast_options(namespace))
    }

    pub fn with_options(options: AgentOptions) -> Self {
        Self::with_manager(MemoryManager::new(), options)
    }

    pub fn with_manager(manager: MemoryManager, options: AgentOptions) -> Self {
        init_test_logging();
        let manager = Arc::new(manager);
        let store = Arc::new(MemoryClusterStore::new());
        let env = Arc::new(MemoryEnvStore::new());
        let runner = Arc::new(ScriptedRunner::new());
        let reaper = Arc::new(RecordingReaper::new());
        let agent = NodeAgent::new(store.clone(), manager.clone(), options)
            .with_runner(runner.clone())
            .with_env_store(env.clone())
            .with_reaper(reaper.clone());
        Self {
            manager,
            store,
            env,
            runner,
            reaper,
            agent,
        }
    }
}
