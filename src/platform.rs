use crate::cluster::ClusterBackend;
use crate::cluster::namespace::NamespaceResolver;
use crate::dispatch::{JobQueue, MsgPublisher};
use crate::errors::EngineError;
use crate::io_models::context::PlatformContext;
use crate::io_models::job::{JobRequest, TestJobStatus};
use crate::io_models::message::QueueMessage;
use crate::metrics_registry::{MetricsRegistry, StdMetricsRegistry};
use crate::monitoring::ClusterMonitor;
use crate::monitoring::alerting::{AlertManager, EmailTransport, WebhookTransport};
use crate::object_storage::ObjectStorage;
use crate::orchestrator::JobOrchestrator;
use crate::policy::PolicyStore;
use crate::reporting::ReportingService;
use crate::repository::{ConfigRepository, JobRepository, ScheduleRepository};
use crate::scheduler::ScheduleEngine;
use crate::tracker::JobTracker;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct JobSubmission {
    pub job_id: Uuid,
    pub workload_name: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Composition root: constructs every component once and hands references
/// down. Nothing in the core reaches for globals.
pub struct Platform {
    context: PlatformContext,
    policy: Arc<PolicyStore>,
    namespaces: Arc<NamespaceResolver>,
    orchestrator: Arc<JobOrchestrator>,
    tracker: Arc<JobTracker>,
    scheduler: Arc<ScheduleEngine>,
    monitor: Arc<ClusterMonitor>,
    alerts: Arc<AlertManager>,
    reporting: Arc<ReportingService>,
    backend: Arc<dyn ClusterBackend>,
}

impl Platform {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: PlatformContext,
        backend: Arc<dyn ClusterBackend>,
        job_repository: Arc<dyn JobRepository>,
        schedule_repository: Arc<dyn ScheduleRepository>,
        config_repository: Arc<dyn ConfigRepository>,
        storage: Arc<dyn ObjectStorage>,
        publisher: Arc<MsgPublisher>,
        queue: Arc<JobQueue>,
        email: Arc<dyn EmailTransport>,
        webhooks: Arc<dyn WebhookTransport>,
    ) -> Platform {
        let metrics: Arc<dyn MetricsRegistry> = Arc::new(StdMetricsRegistry::new(publisher.clone()));

        let policy = Arc::new(PolicyStore::new(config_repository));
        let alerts = Arc::new(AlertManager::new(policy.clone(), email, webhooks));
        let namespaces = Arc::new(NamespaceResolver::new(policy.clone(), backend.clone()));
        let orchestrator = Arc::new(JobOrchestrator::new(
            backend.clone(),
            namespaces.clone(),
            policy.clone(),
            metrics.clone(),
            publisher.clone(),
            queue.clone(),
            context.kubernetes.container_registry.clone(),
        ));
        let tracker = Arc::new(JobTracker::new(
            job_repository.clone(),
            storage,
            publisher.clone(),
            alerts.clone(),
            policy.clone(),
            metrics,
            queue.clone(),
        ));
        let scheduler = Arc::new(ScheduleEngine::new(schedule_repository, queue));
        let monitor = Arc::new(ClusterMonitor::new(
            backend.clone(),
            policy.clone(),
            alerts.clone(),
            publisher,
        ));
        let reporting = Arc::new(ReportingService::new(job_repository));

        Platform {
            context,
            policy,
            namespaces,
            orchestrator,
            tracker,
            scheduler,
            monitor,
            alerts,
            reporting,
            backend,
        }
    }

    pub fn context(&self) -> &PlatformContext {
        &self.context
    }

    pub fn policy(&self) -> &PolicyStore {
        &self.policy
    }

    pub fn namespaces(&self) -> &NamespaceResolver {
        &self.namespaces
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    pub fn scheduler(&self) -> &ScheduleEngine {
        &self.scheduler
    }

    pub fn monitor(&self) -> &ClusterMonitor {
        &self.monitor
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn reporting(&self) -> &ReportingService {
        &self.reporting
    }

    /// One user or scheduled submission end to end: persist the Running row
    /// under quota, then hand the workload to the cluster. The orchestrator
    /// never mutates the database, so a cluster-side failure converges the
    /// row to Failed here.
    pub async fn submit_job(&self, request: &JobRequest, cancel: &CancellationToken) -> Result<JobSubmission, EngineError> {
        let job_id = self.tracker.create_job(request).await?;
        match self.orchestrator.create_test_job(request, job_id, cancel).await {
            Ok(workload_name) => Ok(JobSubmission {
                job_id,
                message: format!("Test job created and running: {workload_name}"),
                workload_name,
            }),
            Err(err) => {
                if let Err(complete_err) = self
                    .tracker
                    .complete_job(job_id, TestJobStatus::Failed, "", None, cancel)
                    .await
                {
                    error!("Cannot mark job {job_id} as failed after submission error: {complete_err}");
                }
                Err(err)
            }
        }
    }

    /// Consume one queue message. Failures are logged; the queue consumer
    /// loop never dies on a poisoned message.
    pub async fn process_queue_message(&self, message: QueueMessage, cancel: &CancellationToken) {
        match message {
            QueueMessage::RunJob(request) => match self.submit_job(&request, cancel).await {
                Ok(submission) => {
                    info!(
                        "Scheduled job {} submitted as workload {}",
                        submission.job_id, submission.workload_name
                    );
                }
                Err(err) => error!("Cannot submit scheduled job: {err}"),
            },
            QueueMessage::CleanupJob { job_name, lob_id } => {
                if let Err(err) = self.orchestrator.cleanup_test_job(&job_name, &lob_id, cancel).await {
                    error!("Queue-driven cleanup of {job_name} failed: {err}");
                }
            }
            QueueMessage::ReingestArtifacts { job_id } => {
                // re-driven by the external queue consumer, not in-process
                debug!("Artifact reingestion requested for job {job_id}");
            }
        }
    }

    pub async fn health(&self, cancel: &CancellationToken) -> Vec<ComponentHealth> {
        let cluster = match self.backend.list_nodes(cancel).await {
            Ok(nodes) => ComponentHealth {
                name: "cluster".to_string(),
                healthy: true,
                detail: Some(format!("{} nodes", nodes.len())),
            },
            Err(err) => ComponentHealth {
                name: "cluster".to_string(),
                healthy: false,
                detail: Some(err.to_string()),
            },
        };

        let policy = match self.policy.get_admin_configuration(true).await {
            Ok(_) => ComponentHealth {
                name: "policy".to_string(),
                healthy: true,
                detail: None,
            },
            Err(err) => ComponentHealth {
                name: "policy".to_string(),
                healthy: false,
                detail: Some(err.to_string()),
            },
        };

        vec![cluster, policy]
    }
}
