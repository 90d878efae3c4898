use crate::cluster::{
    ClusterError, JobSummary, NO_POD_FOR_JOB_MESSAGE, NodeSummary, PodSummary, RUNNER_APP_LABEL, TestJobSpec,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, Namespace, Node, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Race a kube call against the caller's cancellation token.
pub(crate) async fn with_cancel<T>(
    cancel: &CancellationToken,
    resource_name: &str,
    fut: impl Future<Output = Result<T, kube::Error>>,
) -> Result<T, ClusterError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClusterError::Canceled),
        result = fut => result.map_err(|e| ClusterError::from_kube(resource_name, e)),
    }
}

/// Shared kube implementation behind both backend variants. Provider
/// annotations are the only per-variant input.
pub struct KubeWorkloads {
    client: kube::Client,
}

impl KubeWorkloads {
    pub fn new(client: kube::Client) -> Self {
        KubeWorkloads { client }
    }

    pub async fn from_kubeconfig(kubeconfig_path: Option<&str>) -> Result<Self, ClusterError> {
        let config = match kubeconfig_path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| ClusterError::Other {
                    name: path.to_string(),
                    raw_error_message: e.to_string(),
                })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ClusterError::Other {
                        name: path.to_string(),
                        raw_error_message: e.to_string(),
                    })?
            }
            None => kube::Config::infer().await.map_err(|e| ClusterError::Other {
                name: "kubeconfig".to_string(),
                raw_error_message: e.to_string(),
            })?,
        };

        let client = kube::Client::try_from(config).map_err(|e| ClusterError::from_kube("client", e))?;
        Ok(KubeWorkloads::new(client))
    }

    pub async fn in_cluster() -> Result<Self, ClusterError> {
        let config = kube::Config::incluster().map_err(|e| ClusterError::Other {
            name: "incluster".to_string(),
            raw_error_message: e.to_string(),
        })?;
        let client = kube::Client::try_from(config).map_err(|e| ClusterError::from_kube("client", e))?;
        Ok(KubeWorkloads::new(client))
    }

    fn job_manifest(&self, spec: &TestJobSpec, annotations: &BTreeMap<String, String>) -> Job {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), RUNNER_APP_LABEL.to_string());

        let env = spec
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                value_from: None,
            })
            .collect::<Vec<_>>();

        let limits: BTreeMap<String, Quantity> = [
            ("cpu".to_string(), Quantity(spec.limits.cpu_limit.clone())),
            ("memory".to_string(), Quantity(spec.limits.memory_limit.clone())),
        ]
        .into();
        let requests: BTreeMap<String, Quantity> = [
            ("cpu".to_string(), Quantity(spec.limits.cpu_request.clone())),
            ("memory".to_string(), Quantity(spec.limits.memory_request.clone())),
        ]
        .into();

        Job {
            metadata: ObjectMeta {
                name: Some(spec.job_name.clone()),
                labels: Some(labels.clone()),
                annotations: if annotations.is_empty() {
                    None
                } else {
                    Some(annotations.clone())
                },
                ..Default::default()
            },
            spec: Some(JobSpec {
                active_deadline_seconds: Some(spec.active_deadline_seconds),
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers: vec![Container {
                            name: "test-runner".to_string(),
                            image: Some(spec.image.clone()),
                            command: Some(vec!["/bin/sh".to_string(), "-c".to_string(), "/run-tests.sh".to_string()]),
                            env: Some(env),
                            resources: Some(ResourceRequirements {
                                limits: Some(limits),
                                requests: Some(requests),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub async fn create_test_job(
        &self,
        spec: &TestJobSpec,
        annotations: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<String, ClusterError> {
        info!("Creating k8s Job {} in {}", spec.job_name, spec.namespace);

        let api: Api<Job> = Api::namespaced(self.client.clone(), &spec.namespace);
        let manifest = self.job_manifest(spec, annotations);
        with_cancel(cancel, &spec.job_name, api.create(&PostParams::default(), &manifest)).await?;

        Ok(spec.job_name.clone())
    }

    pub async fn get_job(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<JobSummary, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let job = with_cancel(cancel, job_name, api.get(job_name)).await?;
        Ok(job_summary(&job))
    }

    pub async fn get_job_logs(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ClusterError> {
        let selector = format!("job-name={job_name}");
        debug!("Getting k8s Pod logs from selector {}", selector);

        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = with_cancel(
            cancel,
            job_name,
            pod_api.list(&ListParams::default().labels(&selector)),
        )
        .await?;

        let Some(pod_name) = pods.items.first().and_then(|pod| pod.metadata.name.clone()) else {
            return Ok(NO_POD_FOR_JOB_MESSAGE.to_string());
        };

        with_cancel(cancel, &pod_name, pod_api.logs(&pod_name, &LogParams::default())).await
    }

    pub async fn delete_job(
        &self,
        job_name: &str,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        info!("Deleting k8s Job {} from {}", job_name, namespace);

        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        with_cancel(cancel, job_name, api.delete(job_name, &DeleteParams::background())).await?;
        Ok(())
    }

    pub async fn create_namespace_if_not_exists(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if with_cancel(cancel, name, api.get_opt(name)).await?.is_some() {
            return Ok(());
        }

        info!("Creating k8s Namespace {}", name);
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match with_cancel(cancel, name, api.create(&PostParams::default(), &namespace)).await {
            Ok(_) => Ok(()),
            // another creator won the race
            Err(ClusterError::Conflict { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn list_namespaces(
        &self,
        prefix: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = with_cancel(cancel, "namespaces", api.list(&ListParams::default())).await?;
        Ok(namespaces
            .items
            .into_iter()
            .filter_map(|namespace| namespace.metadata.name)
            .filter(|name| prefix.is_none_or(|prefix| name.starts_with(prefix)))
            .collect())
    }

    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PodSummary>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let pods = with_cancel(cancel, namespace, api.list(&params)).await?;
        Ok(pods
            .items
            .into_iter()
            .map(|pod| PodSummary {
                phase: pod
                    .status
                    .as_ref()
                    .and_then(|status| status.phase.clone())
                    .unwrap_or_default(),
                name: pod.metadata.name.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<JobSummary>, ClusterError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let jobs = with_cancel(cancel, namespace, api.list(&params)).await?;
        Ok(jobs.items.iter().map(job_summary).collect())
    }

    pub async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<NodeSummary>, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = with_cancel(cancel, "nodes", api.list(&ListParams::default())).await?;
        Ok(nodes
            .items
            .into_iter()
            .map(|node| NodeSummary {
                ready: node
                    .status
                    .as_ref()
                    .and_then(|status| status.conditions.as_ref())
                    .map(|conditions| {
                        conditions
                            .iter()
                            .any(|condition| condition.type_ == "Ready" && condition.status == "True")
                    })
                    .unwrap_or(false),
                name: node.metadata.name.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<u32, ClusterError> {
        let jobs = self.list_jobs(namespace, None, cancel).await?;
        let mut deleted = 0;
        for job in jobs {
            if !job.is_terminal() {
                continue;
            }
            let Some(completed_at) = job.completion_time else {
                continue;
            };
            if completed_at < cutoff {
                self.delete_job(&job.name, namespace, cancel).await?;
                deleted += 1;
            }
        }

        info!("Deleted {} completed k8s Jobs from {}", deleted, namespace);
        Ok(deleted)
    }
}

fn job_summary(job: &Job) -> JobSummary {
    let status = job.status.as_ref();
    // failed workloads carry no completion_time; fall back to the terminal
    // condition's transition time
    let completion_time = status
        .and_then(|s| s.completion_time.as_ref())
        .map(|time| time.0)
        .or_else(|| {
            status
                .and_then(|s| s.conditions.as_ref())
                .and_then(|conditions| {
                    conditions
                        .iter()
                        .filter(|condition| condition.type_ == "Complete" || condition.type_ == "Failed")
                        .filter_map(|condition| condition.last_transition_time.as_ref())
                        .map(|time| time.0)
                        .max()
                })
        });

    JobSummary {
        name: job.metadata.name.clone().unwrap_or_default(),
        active: status.and_then(|s| s.active).unwrap_or(0).max(0) as u32,
        succeeded: status.and_then(|s| s.succeeded).unwrap_or(0).max(0) as u32,
        failed: status.and_then(|s| s.failed).unwrap_or(0).max(0) as u32,
        completion_time,
    }
}
