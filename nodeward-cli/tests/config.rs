// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use nodeward_cli::DaemonConfig;
use serial_test::serial;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_match_the_engine_defaults() {
    let config = DaemonConfig::default();
    assert_eq!(config.poll_interval, Duration::from_secs(15));
    assert_eq!(config.state_timeout, Duration::from_secs(120));
    assert_eq!(config.retry_attempts, 20);
    assert_eq!(config.retry_budget, Duration::from_secs(600));
    assert_eq!(config.resync_interval, Duration::from_secs(30));

    let options = config.agent_options();
    assert_eq!(options.namespace, "kube-system");
    assert_eq!(options.poll.timeout, Duration::from_secs(120));
    assert_eq!(options.retry.max_attempts, 20);
    assert_eq!(options.shim_process_names, vec!["containerd-shim-runhcs-v1.exe".to_string()]);
}

#[test]
fn file_values_use_humantime_durations() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nodeward.toml");
    std::fs::write(
        &path,
        r#"
namespace = "nodes"
cluster_dir = "/var/lib/nodeward"
poll_interval = "2s"
state_timeout = "1m 30s"
retry_budget = "5m"
shim_process_names = []
"#,
    )?;

    let config = DaemonConfig::from_file(&path)?;
    assert_eq!(config.namespace, "nodes");
    assert_eq!(config.cluster_dir, PathBuf::from("/var/lib/nodeward"));
    assert_eq!(config.poll_interval, Duration::from_secs(2));
    assert_eq!(config.state_timeout, Duration::from_secs(90));
    assert_eq!(config.retry_budget, Duration::from_secs(300));
    assert!(config.shim_process_names.is_empty());
    // Unset keys keep their defaults.
    assert_eq!(config.retry_attempts, 20);
    assert_eq!(config.sc_path, PathBuf::from("sc.exe"));
    Ok(())
}

#[test]
fn unknown_or_malformed_file_keys_are_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let typo = dir.path().join("typo.toml");
    std::fs::write(&typo, "namespce = \"x\"\n")?;
    assert!(DaemonConfig::from_file(&typo).is_err());

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "poll_interval = \"soon\"\n")?;
    assert!(DaemonConfig::from_file(&bad).is_err());
    Ok(())
}

#[test]
fn environment_overrides_file_values() -> anyhow::Result<()> {
    let mut config = DaemonConfig {
        namespace: "from-file".into(),
        ..DaemonConfig::default()
    };
    config.apply_env(lookup(&[
        ("NODEWARD_NAMESPACE", "from-env"),
        ("NODEWARD_NODE_NAME", "win-7"),
        ("NODEWARD_RESYNC_INTERVAL", "45s"),
        ("NODEWARD_RETRY_ATTEMPTS", "3"),
        ("NODEWARD_SHIM_PROCESSES", "a.exe, b.exe,,"),
        ("NODEWARD_LOG_JSON", "yes"),
    ]))?;

    assert_eq!(config.namespace, "from-env");
    assert_eq!(config.node_name.as_deref(), Some("win-7"));
    assert_eq!(config.resync_interval, Duration::from_secs(45));
    assert_eq!(config.retry_policy().max_attempts, 3);
    assert_eq!(config.shim_process_names, vec!["a.exe".to_string(), "b.exe".to_string()]);
    assert!(config.log_json);
    Ok(())
}

#[test]
fn malformed_environment_values_are_errors() {
    for (key, value) in [
        ("NODEWARD_POLL_INTERVAL", "fast"),
        ("NODEWARD_RETRY_ATTEMPTS", "-1"),
        ("NODEWARD_LOG_JSON", "maybe"),
    ] {
        let mut config = DaemonConfig::default();
        assert!(config.apply_env(lookup(&[(key, value)])).is_err(), "{key}={value}");
    }
}

#[test]
#[serial]
fn load_reads_the_process_environment() -> anyhow::Result<()> {
    std::env::set_var("NODEWARD_NAMESPACE", "env-ns");
    std::env::set_var("NODEWARD_STATE_TIMEOUT", "10s");
    let loaded = DaemonConfig::load(None);
    std::env::remove_var("NODEWARD_NAMESPACE");
    std::env::remove_var("NODEWARD_STATE_TIMEOUT");

    let config = loaded?;
    assert_eq!(config.namespace, "env-ns");
    assert_eq!(config.state_timeout, Duration::from_secs(10));
    Ok(())
}

#[test]
#[serial]
fn load_without_environment_is_default() -> anyhow::Result<()> {
    for key in ["NODEWARD_NAMESPACE", "NODEWARD_STATE_TIMEOUT", "NODEWARD_LOG_JSON"] {
        std::env::remove_var(key);
    }
    let config = DaemonConfig::load(None)?;
    assert_eq!(config.namespace, "kube-system");
    assert!(!config.log_json);
    Ok(())
}
