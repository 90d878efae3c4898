pub mod alerting;

use crate::cluster::ClusterBackend;
use crate::dispatch::MsgPublisher;
use crate::errors::EngineError;
use crate::io_models::message::{MetricPoint, PlatformMsg, PlatformMsgPayload};
use crate::monitoring::alerting::AlertManager;
use crate::policy::PolicyStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const METRIC_TEST_EXECUTION_DURATION: &str = "TestExecution.Duration";
pub const METRIC_TEST_EXECUTION_FAIL_RATE: &str = "TestExecution.FailRate";
pub const METRIC_TEST_EXECUTION_FAILED: &str = "TestExecution.Failed";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub namespaces: u32,
    pub running_pods: u32,
    pub pending_pods: u32,
    pub failed_pods: u32,
    pub active_jobs: u32,
    pub succeeded_jobs: u32,
    pub failed_jobs: u32,
    pub ready_nodes: u32,
    pub total_nodes: u32,
    pub cluster_load: f64,
}

/// Periodic cluster sweep: tallies pods, jobs and nodes across the lob
/// namespaces, emits the tallies as metrics, and feeds every metric to alert
/// evaluation.
pub struct ClusterMonitor {
    backend: Arc<dyn ClusterBackend>,
    policy: Arc<PolicyStore>,
    alerts: Arc<AlertManager>,
    publisher: Arc<MsgPublisher>,
}

impl ClusterMonitor {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        policy: Arc<PolicyStore>,
        alerts: Arc<AlertManager>,
        publisher: Arc<MsgPublisher>,
    ) -> Self {
        ClusterMonitor {
            backend,
            policy,
            alerts,
            publisher,
        }
    }

    async fn emit(&self, name: &str, value: f64, dimensions: BTreeMap<String, String>) {
        self.publisher.dispatch(PlatformMsg::new(
            name.to_string(),
            PlatformMsgPayload::Metric(MetricPoint::new(name, value, dimensions.clone())),
        ));
        self.alerts.evaluate_metric(name, value, &dimensions).await;
    }

    pub async fn collect_cluster_metrics(&self, cancel: &CancellationToken) -> Result<ClusterSnapshot, EngineError> {
        let admin = self.policy.get_admin_configuration(true).await?;
        let prefix = admin.cluster.lob_namespace_prefix;

        let namespaces = self.backend.list_namespaces(Some(&prefix), cancel).await?;
        let mut snapshot = ClusterSnapshot {
            namespaces: namespaces.len() as u32,
            ..Default::default()
        };

        for namespace in &namespaces {
            let pods = self.backend.list_pods(namespace, None, cancel).await?;
            let mut running = 0u32;
            let mut pending = 0u32;
            let mut failed = 0u32;
            for pod in &pods {
                match pod.phase.as_str() {
                    "Running" => running += 1,
                    "Pending" => pending += 1,
                    "Failed" => failed += 1,
                    _ => {}
                }
            }

            let jobs = self.backend.list_jobs(namespace, None, cancel).await?;
            let active = jobs.iter().filter(|job| job.active > 0).count() as u32;
            let succeeded = jobs.iter().filter(|job| job.succeeded > 0).count() as u32;
            let failed_jobs = jobs.iter().filter(|job| job.failed > 0).count() as u32;

            snapshot.running_pods += running;
            snapshot.pending_pods += pending;
            snapshot.failed_pods += failed;
            snapshot.active_jobs += active;
            snapshot.succeeded_jobs += succeeded;
            snapshot.failed_jobs += failed_jobs;

            let mut dimensions = BTreeMap::new();
            dimensions.insert("namespace".to_string(), namespace.clone());
            self.emit("Namespace.RunningPods", f64::from(running), dimensions.clone()).await;
            self.emit("Namespace.PendingPods", f64::from(pending), dimensions.clone()).await;
            self.emit("Namespace.FailedPods", f64::from(failed), dimensions.clone()).await;
            self.emit("Namespace.ActiveJobs", f64::from(active), dimensions.clone()).await;
            self.emit("Namespace.FailedJobs", f64::from(failed_jobs), dimensions).await;
        }

        let nodes = self.backend.list_nodes(cancel).await?;
        snapshot.total_nodes = nodes.len() as u32;
        snapshot.ready_nodes = nodes.iter().filter(|node| node.ready).count() as u32;

        // coarse utilization heuristic: ten pods per ready node
        snapshot.cluster_load = f64::from(snapshot.running_pods) / f64::from((snapshot.ready_nodes * 10).max(1));

        self.emit("Cluster.RunningPods", f64::from(snapshot.running_pods), BTreeMap::new()).await;
        self.emit("Cluster.PendingPods", f64::from(snapshot.pending_pods), BTreeMap::new()).await;
        self.emit("Cluster.FailedPods", f64::from(snapshot.failed_pods), BTreeMap::new()).await;
        self.emit("Cluster.ActiveJobs", f64::from(snapshot.active_jobs), BTreeMap::new()).await;
        self.emit("Cluster.SucceededJobs", f64::from(snapshot.succeeded_jobs), BTreeMap::new()).await;
        self.emit("Cluster.FailedJobs", f64::from(snapshot.failed_jobs), BTreeMap::new()).await;
        self.emit("Cluster.ReadyNodes", f64::from(snapshot.ready_nodes), BTreeMap::new()).await;
        self.emit("Cluster.Load", snapshot.cluster_load, BTreeMap::new()).await;

        info!(
            "Cluster sweep: {} namespaces, {} running pods, {}/{} ready nodes, load {:.2}",
            snapshot.namespaces, snapshot.running_pods, snapshot.ready_nodes, snapshot.total_nodes, snapshot.cluster_load
        );
        Ok(snapshot)
    }

    /// Delete terminal workloads older than the configured age, across every
    /// lob namespace. A no-op when auto cleanup is disabled.
    pub async fn cleanup_completed_jobs(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<u32, EngineError> {
        let admin = self.policy.get_admin_configuration(true).await?;
        if !admin.resource_management.auto_cleanup_jobs {
            debug!("Auto cleanup is disabled, skipping completed-jobs pass");
            return Ok(0);
        }

        let cutoff = now - Duration::hours(i64::from(admin.resource_management.cleanup_after_hours));
        let namespaces = self
            .backend
            .list_namespaces(Some(&admin.cluster.lob_namespace_prefix), cancel)
            .await?;

        let mut deleted = 0;
        for namespace in &namespaces {
            deleted += self.backend.cleanup_completed_jobs(namespace, cutoff, cancel).await?;
        }
        Ok(deleted)
    }
}
