use crate::cluster::namespace::NamespaceResolver;
use crate::cluster::{ClusterBackend, TestJobSpec};
use crate::dispatch::{JobQueue, MsgPublisher};
use crate::errors::EngineError;
use crate::io_models::job::{JobRequest, runner_environment};
use crate::io_models::message::{PlatformMsg, PlatformMsgPayload, QueueMessage};
use crate::metrics_registry::{MetricsRegistry, StepName, StepOutcome, StepTimer};
use crate::policy::PolicyStore;
use rand::Rng;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(crate) fn generate_workload_name() -> String {
    let suffix: u128 = rand::rng().random();
    format!("test-job-{suffix:032x}")
}

/// Translates a validated job request into a cluster workload and re-derives
/// workload state from the cluster on every call; it never caches job state
/// and never touches the database.
pub struct JobOrchestrator {
    backend: Arc<dyn ClusterBackend>,
    namespaces: Arc<NamespaceResolver>,
    policy: Arc<PolicyStore>,
    metrics: Arc<dyn MetricsRegistry>,
    publisher: Arc<MsgPublisher>,
    queue: Arc<JobQueue>,
    container_registry: String,
}

impl JobOrchestrator {
    pub fn new(
        backend: Arc<dyn ClusterBackend>,
        namespaces: Arc<NamespaceResolver>,
        policy: Arc<PolicyStore>,
        metrics: Arc<dyn MetricsRegistry>,
        publisher: Arc<MsgPublisher>,
        queue: Arc<JobQueue>,
        container_registry: String,
    ) -> Self {
        JobOrchestrator {
            backend,
            namespaces,
            policy,
            metrics,
            publisher,
            queue,
            container_registry,
        }
    }

    /// Submit the workload for `request`. `job_id` is the persisted job row
    /// id, used to correlate duration metrics.
    pub async fn create_test_job(
        &self,
        request: &JobRequest,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        request.validate()?;

        let timer = StepTimer::start(self.metrics.as_ref(), job_id, StepName::SubmitWorkload);
        let result = self.submit(request, job_id, cancel).await;
        match &result {
            Ok(workload_name) => {
                timer.finish(StepOutcome::Success);
                self.publisher.dispatch(PlatformMsg::new(
                    workload_name.clone(),
                    PlatformMsgPayload::TestJobCreated {
                        namespace: self.namespaces.namespace_for_lob_sync(&request.lob_id),
                        image_type: request.test_image_type.clone(),
                        lob_id: request.lob_id.clone(),
                    },
                ));
            }
            Err(EngineError::Canceled) => timer.finish(StepOutcome::Canceled),
            Err(err) => {
                timer.finish(StepOutcome::Error);
                error!(
                    image_type = %request.test_image_type,
                    lob = %request.lob_id,
                    "Cannot create test job: {err}"
                );
            }
        }

        result
    }

    async fn submit(
        &self,
        request: &JobRequest,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let timer = StepTimer::start(self.metrics.as_ref(), job_id, StepName::EnsureNamespace);
        let namespace = match self.namespaces.ensure_namespace_exists(&request.lob_id, cancel).await {
            Ok(namespace) => {
                timer.finish(StepOutcome::Success);
                namespace
            }
            Err(EngineError::Canceled) => {
                timer.finish(StepOutcome::Canceled);
                return Err(EngineError::Canceled);
            }
            Err(err) => {
                timer.finish(StepOutcome::Error);
                return Err(err);
            }
        };

        let admin = self.policy.get_admin_configuration(true).await?;
        let timeout_minutes = request
            .timeout_minutes
            .unwrap_or(admin.resource_management.default_job_timeout_minutes);

        let spec = TestJobSpec {
            job_name: generate_workload_name(),
            image: format!(
                "{}/{}:latest",
                self.container_registry,
                request.test_image_type.to_lowercase()
            ),
            repo_url: request.repo_url.clone(),
            namespace,
            active_deadline_seconds: i64::from(timeout_minutes) * 60,
            limits: admin.resource_management.default_container_limits.clone(),
            env: runner_environment(request),
        };

        let workload_name = self.backend.create_test_job(&spec, cancel).await?;
        info!(
            namespace = %spec.namespace,
            image_type = %request.test_image_type,
            lob = %request.lob_id,
            "Created test workload {workload_name}"
        );
        Ok(workload_name)
    }

    pub async fn is_job_completed(
        &self,
        job_name: &str,
        lob_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, EngineError> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await?;
        Ok(self.backend.is_job_completed(job_name, &namespace, cancel).await?)
    }

    /// Raw runner output (the report XML is part of the log stream).
    pub async fn get_test_results(
        &self,
        job_name: &str,
        lob_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await?;
        Ok(self.backend.get_job_logs(job_name, &namespace, cancel).await?)
    }

    /// Tear the workload down. A missing workload is a success; any other
    /// failure is handed to the queue so an external consumer can re-drive
    /// the deletion.
    pub async fn cleanup_test_job(
        &self,
        job_name: &str,
        lob_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let namespace = self.namespaces.namespace_for_lob(lob_id).await?;
        match self.backend.delete_job(job_name, &namespace, cancel).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => {
                warn!("Cannot delete workload {job_name} from {namespace}: {err}");
                self.queue.dispatch(QueueMessage::CleanupJob {
                    job_name: job_name.to_string(),
                    lob_id: lob_id.to_string(),
                });
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_name_shape() {
        let name = generate_workload_name();
        let suffix = name.strip_prefix("test-job-").expect("workload name prefix");
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(generate_workload_name(), generate_workload_name());
    }
}
