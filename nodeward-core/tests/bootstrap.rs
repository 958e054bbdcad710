// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::Result;
use nodeward_core::LookupError;
use nodeward_model::*;
use nodeward_scm::{Call, ServiceStatus};
use nodeward_test_support::{fast_options, Harness};
use std::collections::BTreeMap;
use std::time::Duration;

const NS: &str = "kube-system";

fn document() -> Result<ConfigurationDocument> {
    let mut containerd = ServiceDefinition::new("containerd", "containerd --config CONFIG", 0);
    containerd.bootstrap = true;
    containerd.pre_script_variables = vec![
        PreScriptVariable {
            variable_name: "CONFIG".to_string(),
            path: "C:\\k\\containerd-config.ps1".to_string(),
        },
        PreScriptVariable {
            variable_name: String::new(),
            path: "C:\\k\\unused.ps1".to_string(),
        },
    ];

    let mut kubelet = ServiceDefinition::new("kubelet", "kubelet --hostname-override=NAME", 10);
    kubelet.dependencies = vec!["containerd".to_string()];
    kubelet.node_variables = vec![NodeVariable {
        name: "NAME".to_string(),
        node_object_json_path: "{.metadata.name}".to_string(),
    }];

    Ok(ConfigurationDocument::new("1.2.0", vec![kubelet, containerd])?)
}

#[tokio::test]
async fn only_bootstrap_services_are_started() -> Result<()> {
    let h = Harness::new(NS);
    h.store.put_document(NS, &document()?);
    h.runner.respond("C:\\k\\containerd-config.ps1", "  C:\\k\\containerd.toml\n");

    h.agent.bootstrap("1.2.0").await?;

    assert_eq!(
        h.manager.calls(),
        vec![
            Call::Create("containerd".into()),
            Call::UpdateConfig("containerd".into()),
            Call::Start("containerd".into()),
        ]
    );
    let (config, status) = h.manager.snapshot("containerd").expect("containerd created");
    assert_eq!(config.binary_path, "containerd --config C:\\k\\containerd.toml");
    assert_eq!(status, ServiceStatus::Running);
    assert!(h.manager.snapshot("kubelet").is_none());
    // Empty placeholders are skipped.
    assert_eq!(h.runner.calls(), vec!["C:\\k\\containerd-config.ps1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn bootstrap_needs_the_exact_version() -> Result<()> {
    let h = Harness::new(NS);
    h.store.put_document(NS, &document()?);

    let err = h.agent.bootstrap("1.3.0").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LookupError>(),
        Some(LookupError::DocumentNotFound { .. })
    ));
    assert!(h.manager.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn bootstrap_then_reconcile_completes_the_node() -> Result<()> {
    let h = Harness::new(NS);
    h.store.put_document(NS, &document()?);
    h.runner.respond("C:\\k\\containerd-config.ps1", "C:\\k\\containerd.toml");
    h.agent.bootstrap("1.2.0").await?;

    h.store.put_node(nodeward_test_support::node_record(
        "win-1",
        &[nodeward_test_support::HOST_ADDR],
        &[(DESIRED_VERSION_ANNOTATION, "1.2.0")],
    ));
    h.manager.clear_calls();
    h.agent.reconcile_node("win-1").await?;

    assert_eq!(
        h.manager.calls(),
        vec![
            Call::Create("kubelet".into()),
            Call::UpdateConfig("kubelet".into()),
            Call::Start("kubelet".into()),
        ]
    );
    assert_eq!(
        h.manager.snapshot("kubelet").map(|s| s.0.binary_path),
        Some("kubelet --hostname-override=win-1".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn malformed_document_fails_without_refetching() -> Result<()> {
    let mut options = fast_options(NS);
    options.retry.max_attempts = 5;
    options.retry.budget = Duration::from_secs(5);
    let h = Harness::with_options(options);
    let data: BTreeMap<String, String> = [
        ("services".to_string(), r#"[{"name":"containerd","priority":0,"bootstrap":true}]"#.to_string()),
        ("files".to_string(), "[]".to_string()),
    ]
    .into_iter()
    .collect();
    h.store.put_raw_document(NS, "services-1.2.0", data);

    let err = h.agent.bootstrap("1.2.0").await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::Malformed { key: "services", .. })
    ));
    assert_eq!(h.store.document_reads(), 1);
    assert!(h.manager.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn absent_document_is_fetched_until_attempts_run_out() -> Result<()> {
    let mut options = fast_options(NS);
    options.retry.max_attempts = 3;
    options.retry.budget = Duration::from_secs(5);
    let h = Harness::with_options(options);

    let err = h.agent.bootstrap("1.2.0").await.unwrap_err();

    assert!(err.downcast_ref::<LookupError>().is_some());
    assert_eq!(h.store.document_reads(), 3);
    Ok(())
}
