pub mod aks;
pub mod kube;
pub mod namespace;
pub mod openshift;

use crate::io_models::config::ContainerLimits;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Aks,
    OpenShift,
}

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum ClusterError {
    #[error("Resource `{name:?}` not found: {raw_error_message:?}.")]
    NotFound { name: String, raw_error_message: String },
    #[error("Conflict on resource `{name:?}`: {raw_error_message:?}.")]
    Conflict { name: String, raw_error_message: String },
    #[error("Cluster unavailable: {raw_error_message:?}.")]
    Unavailable { raw_error_message: String },
    #[error("Cluster error on resource `{name:?}`: {raw_error_message:?}.")]
    Other { name: String, raw_error_message: String },
    #[error("Cluster operation canceled.")]
    Canceled,
}

impl ClusterError {
    pub fn from_kube(name: &str, error: ::kube::Error) -> Self {
        match &error {
            ::kube::Error::Api(response) => match response.code {
                404 => ClusterError::NotFound {
                    name: name.to_string(),
                    raw_error_message: response.message.clone(),
                },
                409 => ClusterError::Conflict {
                    name: name.to_string(),
                    raw_error_message: response.message.clone(),
                },
                code if (500..=599).contains(&code) => ClusterError::Unavailable {
                    raw_error_message: response.message.clone(),
                },
                _ => ClusterError::Other {
                    name: name.to_string(),
                    raw_error_message: response.message.clone(),
                },
            },
            // non-API failures are transport-level
            _ => ClusterError::Unavailable {
                raw_error_message: error.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Everything the cluster needs to run one test workload.
#[derive(Clone, Debug)]
pub struct TestJobSpec {
    pub job_name: String,
    pub image: String,
    pub repo_url: String,
    pub namespace: String,
    pub active_deadline_seconds: i64,
    pub limits: ContainerLimits,
    pub env: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobSummary {
    pub name: String,
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub completion_time: Option<DateTime<Utc>>,
}

impl JobSummary {
    /// A workload is terminal once the cluster reports at least one
    /// succeeded or one failed pod.
    pub fn is_terminal(&self) -> bool {
        self.succeeded >= 1 || self.failed >= 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PodSummary {
    pub name: String,
    pub phase: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
}

pub const RUNNER_APP_LABEL: &str = "testexec-runner";
pub const NO_POD_FOR_JOB_MESSAGE: &str = "No pods found for this job; logs are not available.";

/// Capability set over the container orchestrator. Backend variants differ
/// in authentication and provider annotations only; nothing behind this
/// trait leaks provider types to the rest of the platform.
#[async_trait]
pub trait ClusterBackend: Send + Sync {
    fn kind(&self) -> Kind;

    /// Create a one-shot workload and return its name.
    async fn create_test_job(&self, spec: &TestJobSpec, cancel: &CancellationToken) -> Result<String, ClusterError>;

    async fn get_job(&self, job_name: &str, namespace: &str, cancel: &CancellationToken)
    -> Result<JobSummary, ClusterError>;

    async fn is_job_completed(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ClusterError> {
        Ok(self.get_job(job_name, namespace, cancel).await?.is_terminal())
    }

    /// Full log stream of the first pod labelled `job-name=<job_name>`, or a
    /// sentinel message when no pod exists. Never fails on a missing pod.
    async fn get_job_logs(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClusterError>;

    /// Cascade-delete the workload and its pods (background propagation).
    async fn delete_job(&self, job_name: &str, namespace: &str, cancel: &CancellationToken)
    -> Result<(), ClusterError>;

    /// Idempotent: a not-found read followed by create; losing the create
    /// race is success.
    async fn create_namespace_if_not_exists(&self, name: &str, cancel: &CancellationToken)
    -> Result<(), ClusterError>;

    async fn list_namespaces(
        &self,
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClusterError>;

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PodSummary>, ClusterError>;

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobSummary>, ClusterError>;

    async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<NodeSummary>, ClusterError>;

    /// Delete terminal jobs whose completion time precedes `cutoff`; returns
    /// the number of deleted workloads.
    async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<u32, ClusterError>;
}
