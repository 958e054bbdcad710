// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::Result;
use nodeward_core::LookupError;
use nodeward_model::*;
use nodeward_scm::{Call, ServiceConfig, ServiceStatus};
use nodeward_test_support::{fast_options, node_record, Harness, HOST_ADDR};

const NS: &str = "kube-system";

fn svc(name: &str, priority: u32, deps: &[&str]) -> ServiceDefinition {
    let mut s = ServiceDefinition::new(name, name, priority);
    s.dependencies = deps.iter().map(|d| d.to_string()).collect();
    s
}

fn seed_running(h: &Harness, name: &str, deps: &[&str]) {
    h.manager.seed(
        name,
        ServiceConfig::new(name, deps.iter().map(|d| d.to_string()).collect(), managed_description(name)),
        ServiceStatus::Running,
    );
}

fn deleted(h: &Harness) -> Vec<String> {
    h.manager
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Delete(n) => Some(n),
            _ => None,
        })
        .collect()
}

/// Host runs svc1 <- svc2 <- svc3 plus two services owned by other software.
/// The node applied 1.0.0 (svc1, svc2); 2.0.0 (svc2, svc3) is the latest.
fn host_with_managed_and_foreign_services(h: &Harness) -> Result<()> {
    seed_running(h, "svc1", &[]);
    seed_running(h, "svc2", &["svc1"]);
    seed_running(h, "svc3", &["svc2"]);
    seed_running(h, "foreign-a", &[]);
    seed_running(h, "foreign-b", &["svc1"]);

    h.store.put_document(
        NS,
        &ConfigurationDocument::new("1.0.0", vec![svc("svc1", 1, &[]), svc("svc2", 2, &["svc1"])])?,
    );
    h.store.put_document(
        NS,
        &ConfigurationDocument::new("2.0.0", vec![svc("svc2", 2, &["svc1"]), svc("svc3", 3, &["svc2"])])?,
    );
    Ok(())
}

#[tokio::test]
async fn removes_exactly_the_managed_services_in_reverse_order() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.store
        .put_node(node_record("node", &[HOST_ADDR], &[(VERSION_ANNOTATION, "1.0.0")]));

    h.agent.deconfigure(NS).await?;

    assert_eq!(deleted(&h), vec!["svc3", "svc2", "svc1"]);
    assert!(h.manager.snapshot("foreign-a").is_some());
    assert!(h.manager.snapshot("foreign-b").is_some());
    assert_eq!(h.reaper.requests(), vec!["containerd-shim-runhcs-v1.exe".to_string()]);

    let node = h.store.node("node").expect("node exists");
    assert!(node["metadata"]["annotations"].get(VERSION_ANNOTATION).is_none());
    Ok(())
}

#[tokio::test]
async fn dependents_are_stopped_before_their_dependencies() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.store
        .put_node(node_record("node", &[HOST_ADDR], &[(VERSION_ANNOTATION, "1.0.0")]));

    h.agent.deconfigure(NS).await?;

    // foreign-b depends on svc1, so it has to come down before svc1 does.
    let stops: Vec<String> = h
        .manager
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Stop(n) => Some(n),
            _ => None,
        })
        .collect();
    let pos = |name: &str| stops.iter().position(|n| n == name);
    assert!(pos("svc3") < pos("svc2"));
    assert!(pos("svc2") < pos("svc1"));
    assert!(pos("foreign-b") < pos("svc1"));
    assert_eq!(h.manager.snapshot("foreign-b").map(|s| s.1), Some(ServiceStatus::Stopped));
    Ok(())
}

#[tokio::test]
async fn unknown_host_falls_back_to_latest_document() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.store.put_node(node_record("elsewhere", &["10.9.9.9"], &[(VERSION_ANNOTATION, "1.0.0")]));

    h.agent.deconfigure(NS).await?;

    // Only the latest document is known, so svc1 survives.
    assert_eq!(deleted(&h), vec!["svc3", "svc2"]);
    assert!(h.manager.snapshot("svc1").is_some());
    let other = h.store.node("elsewhere").expect("node exists");
    assert_eq!(other["metadata"]["annotations"][VERSION_ANNOTATION], "1.0.0");
    Ok(())
}

#[tokio::test]
async fn missing_applied_document_falls_back_to_latest() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.store
        .put_node(node_record("node", &[HOST_ADDR], &[(VERSION_ANNOTATION, "0.9.0")]));

    h.agent.deconfigure(NS).await?;
    assert_eq!(deleted(&h), vec!["svc3", "svc2"]);
    Ok(())
}

#[tokio::test]
async fn no_documents_is_fatal() -> Result<()> {
    let h = Harness::new(NS);
    seed_running(&h, "svc1", &[]);
    h.store.put_node(node_record("node", &[HOST_ADDR], &[]));

    let err = h.agent.deconfigure(NS).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<LookupError>(), Some(LookupError::NoDocuments(_))));
    assert!(h.manager.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn node_listing_failure_is_fatal() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.store.fail_node_listing();

    assert!(h.agent.deconfigure(NS).await.is_err());
    assert!(h.manager.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn shim_cleanup_failure_is_tolerated() -> Result<()> {
    let h = Harness::new(NS);
    host_with_managed_and_foreign_services(&h)?;
    h.reaper.fail_always();

    h.agent.deconfigure(NS).await?;
    assert_eq!(deleted(&h), vec!["svc3", "svc2"]);
    assert_eq!(h.reaper.requests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn owned_environment_is_cleared_and_reboot_requested() -> Result<()> {
    let h = Harness::new(NS);
    let mut doc = ConfigurationDocument::new("1.0.0", vec![svc("svc1", 1, &[])])?;
    doc.environment_vars.insert("HTTP_PROXY".into(), "http://proxy:3128".into());
    doc.watched_environment_vars = vec!["NO_PROXY".into()];
    h.store.put_document(NS, &doc);
    h.store
        .put_node(node_record("node", &[HOST_ADDR], &[(VERSION_ANNOTATION, "1.0.0")]));
    seed_running(&h, "svc1", &[]);
    h.env.insert("HTTP_PROXY", "http://proxy:3128");
    h.env.insert("NO_PROXY", "localhost");
    h.env.insert("PATH", "C:\\Windows");

    h.agent.deconfigure(NS).await?;

    let env = h.env.snapshot();
    assert_eq!(env.keys().collect::<Vec<_>>(), vec!["PATH"]);
    let node = h.store.node("node").expect("node exists");
    assert_eq!(node["metadata"]["annotations"][REBOOT_ANNOTATION], "true");
    Ok(())
}

#[tokio::test]
async fn repeated_teardown_is_harmless() -> Result<()> {
    let mut options = fast_options(NS);
    options.shim_process_names.clear();
    let h = Harness::with_options(options);
    host_with_managed_and_foreign_services(&h)?;

    h.agent.deconfigure(NS).await?;
    h.manager.clear_calls();
    h.agent.deconfigure(NS).await?;

    assert!(h.manager.calls().is_empty());
    assert!(h.reaper.requests().is_empty());
    Ok(())
}
