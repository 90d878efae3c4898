use crate::helpers::{drain_bus, harness};
use chrono::{Duration, Utc};
use testexec_engine::cluster::{JobSummary, NodeSummary, PodSummary};
use testexec_engine::io_models::message::PlatformMsgPayload;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cluster_sweep_tallies_and_load() {
    let mut harness = harness();
    let cancel = CancellationToken::new();

    {
        let mut state = harness.cluster.state.lock().unwrap();
        state.namespaces.insert("testexec-acme".to_string());
        state.namespaces.insert("testexec-globex".to_string());
        state.namespaces.insert("kube-system".to_string());

        state.pods.insert(
            "testexec-acme".to_string(),
            vec![
                PodSummary { name: "p1".to_string(), phase: "Running".to_string() },
                PodSummary { name: "p2".to_string(), phase: "Running".to_string() },
                PodSummary { name: "p3".to_string(), phase: "Pending".to_string() },
            ],
        );
        state.pods.insert(
            "testexec-globex".to_string(),
            vec![PodSummary { name: "p4".to_string(), phase: "Failed".to_string() }],
        );

        state.jobs.insert(
            ("testexec-acme".to_string(), "j1".to_string()),
            JobSummary { name: "j1".to_string(), active: 1, succeeded: 0, failed: 0, completion_time: None },
        );
        state.jobs.insert(
            ("testexec-globex".to_string(), "j2".to_string()),
            JobSummary { name: "j2".to_string(), active: 0, succeeded: 0, failed: 1, completion_time: Some(Utc::now()) },
        );

        state.nodes = vec![
            NodeSummary { name: "n1".to_string(), ready: true },
            NodeSummary { name: "n2".to_string(), ready: true },
            NodeSummary { name: "n3".to_string(), ready: false },
        ];
    }

    let snapshot = harness.platform.monitor().collect_cluster_metrics(&cancel).await.unwrap();
    // kube-system does not match the lob prefix
    assert_eq!(snapshot.namespaces, 2);
    assert_eq!(snapshot.running_pods, 2);
    assert_eq!(snapshot.pending_pods, 1);
    assert_eq!(snapshot.failed_pods, 1);
    assert_eq!(snapshot.active_jobs, 1);
    assert_eq!(snapshot.failed_jobs, 1);
    assert_eq!(snapshot.ready_nodes, 2);
    assert_eq!(snapshot.total_nodes, 3);
    assert!((snapshot.cluster_load - 2.0 / 20.0).abs() < 1e-9);

    let events = drain_bus(&mut harness.bus);
    let metric = |name: &str| {
        events.iter().find_map(|msg| match &msg.payload {
            PlatformMsgPayload::Metric(point) if point.name == name => Some(point.clone()),
            _ => None,
        })
    };
    assert_eq!(metric("Cluster.RunningPods").unwrap().value, 2.0);
    assert_eq!(metric("Cluster.ReadyNodes").unwrap().value, 2.0);
    let namespaced = metric("Namespace.RunningPods").unwrap();
    assert!(namespaced.dimensions.contains_key("namespace"));
}

#[tokio::test]
async fn test_completed_jobs_cleanup_honors_the_policy_gate() {
    let harness = harness();
    let cancel = CancellationToken::new();

    {
        let mut state = harness.cluster.state.lock().unwrap();
        state.namespaces.insert("testexec-acme".to_string());
        state.jobs.insert(
            ("testexec-acme".to_string(), "old".to_string()),
            JobSummary {
                name: "old".to_string(),
                active: 0,
                succeeded: 1,
                failed: 0,
                completion_time: Some(Utc::now() - Duration::hours(48)),
            },
        );
        state.jobs.insert(
            ("testexec-acme".to_string(), "fresh".to_string()),
            JobSummary {
                name: "fresh".to_string(),
                active: 0,
                succeeded: 1,
                failed: 0,
                completion_time: Some(Utc::now() - Duration::hours(1)),
            },
        );
        state.jobs.insert(
            ("testexec-acme".to_string(), "running".to_string()),
            JobSummary { name: "running".to_string(), active: 1, succeeded: 0, failed: 0, completion_time: None },
        );
    }

    // gate closed: nothing happens
    let mut admin = harness.platform.policy().get_admin_configuration(true).await.unwrap();
    admin.resource_management.auto_cleanup_jobs = false;
    harness.platform.policy().save_admin_configuration(&admin).await.unwrap();
    assert_eq!(
        harness.platform.monitor().cleanup_completed_jobs(Utc::now(), &cancel).await.unwrap(),
        0
    );
    assert_eq!(harness.cluster.job_names().len(), 3);

    // gate open: only the stale terminal workload goes away
    admin.resource_management.auto_cleanup_jobs = true;
    harness.platform.policy().save_admin_configuration(&admin).await.unwrap();
    assert_eq!(
        harness.platform.monitor().cleanup_completed_jobs(Utc::now(), &cancel).await.unwrap(),
        1
    );
    let mut remaining = harness.cluster.job_names();
    remaining.sort();
    assert_eq!(remaining, vec!["fresh".to_string(), "running".to_string()]);
}

#[tokio::test]
async fn test_health_reports_components() {
    let harness = harness();
    let cancel = CancellationToken::new();

    let components = harness.platform.health(&cancel).await;
    assert_eq!(components.len(), 2);
    assert!(components.iter().all(|component| component.healthy));
}
