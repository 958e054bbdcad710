// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{Context, Result};
use nodeward_core::host::DEFAULT_SHIM_PROCESS;
use nodeward_core::{AgentOptions, RetryPolicy};
use nodeward_scm::PollConfig;
use serde::{Deserialize, Deserializer};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Daemon settings. Layered as defaults, then the TOML file, then
/// `NODEWARD_*` environment variables, then command-line flags.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub namespace: String,

    /// Root of the file-backed cluster store.
    pub cluster_dir: PathBuf,

    /// Explicit node identity. Looked up by interface address when unset.
    pub node_name: Option<String>,

    #[serde(deserialize_with = "duration")]
    pub poll_interval: Duration,
    #[serde(deserialize_with = "duration")]
    pub state_timeout: Duration,

    pub retry_attempts: u32,
    #[serde(deserialize_with = "duration")]
    pub retry_budget: Duration,

    #[serde(deserialize_with = "duration")]
    pub resync_interval: Duration,

    pub sc_path: PathBuf,
    pub powershell_path: PathBuf,
    pub shim_process_names: Vec<String>,
    pub log_json: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        let retry = RetryPolicy::default();
        Self {
            namespace: "kube-system".to_string(),
            cluster_dir: PathBuf::from(r"C:\ProgramData\nodeward\cluster"),
            node_name: None,
            poll_interval: poll.interval,
            state_timeout: poll.timeout,
            retry_attempts: retry.max_attempts,
            retry_budget: retry.budget,
            resync_interval: Duration::from_secs(30),
            sc_path: PathBuf::from("sc.exe"),
            powershell_path: PathBuf::from("powershell.exe"),
            shim_process_names: vec![DEFAULT_SHIM_PROCESS.to_string()],
            log_json: false,
        }
    }
}

fn duration<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(de)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl DaemonConfig {
    /// Reads `path` when given, then applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Overrides fields from `NODEWARD_*` variables supplied by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_duration = |key: &str| -> Result<Option<Duration>> {
            lookup(key)
                .map(|v| humantime::parse_duration(v.trim()).with_context(|| format!("{} must be a duration", key)))
                .transpose()
        };

        if let Some(v) = lookup("NODEWARD_NAMESPACE") {
            self.namespace = v;
        }
        if let Some(v) = lookup("NODEWARD_CLUSTER_DIR") {
            self.cluster_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NODEWARD_NODE_NAME") {
            self.node_name = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = parse_duration("NODEWARD_POLL_INTERVAL")? {
            self.poll_interval = v;
        }
        if let Some(v) = parse_duration("NODEWARD_STATE_TIMEOUT")? {
            self.state_timeout = v;
        }
        if let Some(v) = lookup("NODEWARD_RETRY_ATTEMPTS") {
            self.retry_attempts = v
                .trim()
                .parse()
                .context("NODEWARD_RETRY_ATTEMPTS must be a u32 integer")?;
        }
        if let Some(v) = parse_duration("NODEWARD_RETRY_BUDGET")? {
            self.retry_budget = v;
        }
        if let Some(v) = parse_duration("NODEWARD_RESYNC_INTERVAL")? {
            self.resync_interval = v;
        }
        if let Some(v) = lookup("NODEWARD_SC_PATH") {
            self.sc_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NODEWARD_POWERSHELL_PATH") {
            self.powershell_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NODEWARD_SHIM_PROCESSES") {
            self.shim_process_names = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("NODEWARD_LOG_JSON") {
            self.log_json = parse_bool(&v).with_context(|| format!("NODEWARD_LOG_JSON: {:?} is not a boolean", v))?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            budget: self.retry_budget,
            ..RetryPolicy::default()
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            namespace: self.namespace.clone(),
            poll: PollConfig {
                interval: self.poll_interval,
                timeout: self.state_timeout,
            },
            retry: self.retry_policy(),
            resync_interval: self.resync_interval,
            shim_process_names: self.shim_process_names.clone(),
            ..AgentOptions::default()
        }
    }
}
