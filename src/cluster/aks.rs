use crate::cluster::kube::KubeWorkloads;
use crate::cluster::{
    ClusterBackend, ClusterError, JobSummary, Kind, NodeSummary, PodSummary, TestJobSpec,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// AKS-flavoured backend. Authentication goes through the az-CLI-managed
/// kubeconfig (kubelogin exec plugin); workloads are tagged with the
/// provider annotation.
pub struct AksClusterBackend {
    workloads: KubeWorkloads,
}

impl AksClusterBackend {
    pub async fn new(kubeconfig_path: Option<&str>) -> Result<Self, ClusterError> {
        Ok(AksClusterBackend {
            workloads: KubeWorkloads::from_kubeconfig(kubeconfig_path).await?,
        })
    }

    pub fn with_client(client: kube::Client) -> Self {
        AksClusterBackend {
            workloads: KubeWorkloads::new(client),
        }
    }

    fn provider_annotations() -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert("testexec.io/provider".to_string(), "aks".to_string());
        annotations.insert("kubernetes.azure.com/scalesetpriority".to_string(), "regular".to_string());
        annotations
    }
}

#[async_trait]
impl ClusterBackend for AksClusterBackend {
    fn kind(&self) -> Kind {
        Kind::Aks
    }

    async fn create_test_job(&self, spec: &TestJobSpec, cancel: &CancellationToken) -> Result<String, ClusterError> {
        self.workloads
            .create_test_job(spec, &Self::provider_annotations(), cancel)
            .await
    }

    async fn get_job(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<JobSummary, ClusterError> {
        self.workloads.get_job(job_name, namespace, cancel).await
    }

    async fn get_job_logs(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClusterError> {
        self.workloads.get_job_logs(job_name, namespace, cancel).await
    }

    async fn delete_job(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        self.workloads.delete_job(job_name, namespace, cancel).await
    }

    async fn create_namespace_if_not_exists(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        self.workloads.create_namespace_if_not_exists(name, cancel).await
    }

    async fn list_namespaces(
        &self,
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClusterError> {
        self.workloads.list_namespaces(prefix, cancel).await
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PodSummary>, ClusterError> {
        self.workloads.list_pods(namespace, label_selector, cancel).await
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobSummary>, ClusterError> {
        self.workloads.list_jobs(namespace, label_selector, cancel).await
    }

    async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<NodeSummary>, ClusterError> {
        self.workloads.list_nodes(cancel).await
    }

    async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<u32, ClusterError> {
        self.workloads.cleanup_completed_jobs(namespace, cutoff, cancel).await
    }
}
