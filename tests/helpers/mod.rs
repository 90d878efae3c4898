use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use testexec_engine::cluster::{
    ClusterBackend, ClusterError, JobSummary, Kind, NO_POD_FOR_JOB_MESSAGE, NodeSummary, PodSummary, TestJobSpec,
};
use testexec_engine::io_models::context::PlatformContext;
use testexec_engine::io_models::job::JobRequest;
use testexec_engine::io_models::message::{PlatformMsg, QueueMessage};
use testexec_engine::monitoring::alerting::{ReqwestWebhookTransport, StdEmailTransport};
use testexec_engine::object_storage::in_memory::InMemoryObjectStorage;
use testexec_engine::platform::Platform;
use testexec_engine::repository::in_memory::InMemoryRepository;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FakeClusterState {
    pub created: Vec<TestJobSpec>,
    pub namespaces: BTreeSet<String>,
    pub jobs: HashMap<(String, String), JobSummary>,
    pub pods: HashMap<String, Vec<PodSummary>>,
    pub logs: HashMap<(String, String), String>,
    pub nodes: Vec<NodeSummary>,
}

/// Records every workload handed to it and serves canned cluster state, so
/// scenarios can assert on deadlines, env and limits without a live cluster.
pub struct FakeClusterBackend {
    pub state: Mutex<FakeClusterState>,
    pub fail_create: AtomicBool,
}

impl FakeClusterBackend {
    pub fn new() -> Self {
        FakeClusterBackend {
            state: Mutex::new(FakeClusterState::default()),
            fail_create: AtomicBool::new(false),
        }
    }

    pub fn created_specs(&self) -> Vec<TestJobSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn namespaces(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().namespaces.clone()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.state.lock().unwrap().jobs.keys().map(|(_, name)| name.clone()).collect()
    }
}

#[async_trait]
impl ClusterBackend for FakeClusterBackend {
    fn kind(&self) -> Kind {
        Kind::Aks
    }

    async fn create_test_job(&self, spec: &TestJobSpec, _cancel: &CancellationToken) -> Result<String, ClusterError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClusterError::Unavailable {
                raw_error_message: "induced failure".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.created.push(spec.clone());
        state.jobs.insert(
            (spec.namespace.clone(), spec.job_name.clone()),
            JobSummary {
                name: spec.job_name.clone(),
                active: 1,
                succeeded: 0,
                failed: 0,
                completion_time: None,
            },
        );
        Ok(spec.job_name.clone())
    }

    async fn get_job(
        &self,
        job_name: &str,
        namespace: &str,
        _cancel: &CancellationToken,
    ) -> Result<JobSummary, ClusterError> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .get(&(namespace.to_string(), job_name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                name: job_name.to_string(),
                raw_error_message: "no such job".to_string(),
            })
    }

    async fn get_job_logs(
        &self,
        job_name: &str,
        namespace: &str,
        _cancel: &CancellationToken,
    ) -> Result<String, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .logs
            .get(&(namespace.to_string(), job_name.to_string()))
            .cloned()
            .unwrap_or_else(|| NO_POD_FOR_JOB_MESSAGE.to_string()))
    }

    async fn delete_job(
        &self,
        job_name: &str,
        namespace: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        let removed = self
            .state
            .lock()
            .unwrap()
            .jobs
            .remove(&(namespace.to_string(), job_name.to_string()));
        match removed {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                name: job_name.to_string(),
                raw_error_message: "no such job".to_string(),
            }),
        }
    }

    async fn create_namespace_if_not_exists(
        &self,
        name: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        self.state.lock().unwrap().namespaces.insert(name.to_string());
        Ok(())
    }

    async fn list_namespaces(
        &self,
        prefix: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .namespaces
            .iter()
            .filter(|name| prefix.is_none_or(|prefix| name.starts_with(prefix)))
            .cloned()
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        _label_selector: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<PodSummary>, ClusterError> {
        Ok(self.state.lock().unwrap().pods.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        _label_selector: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Vec<JobSummary>, ClusterError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, summary)| summary.clone())
            .collect())
    }

    async fn list_nodes(&self, _cancel: &CancellationToken) -> Result<Vec<NodeSummary>, ClusterError> {
        Ok(self.state.lock().unwrap().nodes.clone())
    }

    async fn cleanup_completed_jobs(
        &self,
        namespace: &str,
        cutoff: DateTime<Utc>,
        _cancel: &CancellationToken,
    ) -> Result<u32, ClusterError> {
        let mut state = self.state.lock().unwrap();
        let expired: Vec<(String, String)> = state
            .jobs
            .iter()
            .filter(|((ns, _), summary)| {
                ns == namespace && summary.is_terminal() && summary.completion_time.is_some_and(|at| at < cutoff)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.jobs.remove(key);
        }
        Ok(expired.len() as u32)
    }
}

pub struct TestHarness {
    pub platform: Arc<Platform>,
    pub cluster: Arc<FakeClusterBackend>,
    pub repo: Arc<InMemoryRepository>,
    pub storage: Arc<InMemoryObjectStorage>,
    pub bus: UnboundedReceiver<PlatformMsg>,
    pub queue: UnboundedReceiver<QueueMessage>,
}

pub fn harness() -> TestHarness {
    let cluster = Arc::new(FakeClusterBackend::new());
    let repo = Arc::new(InMemoryRepository::new());
    let storage = Arc::new(InMemoryObjectStorage::new());
    let (bus_tx, bus_rx) = mpsc::unbounded_channel();
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    let platform = Arc::new(Platform::new(
        PlatformContext::default(),
        cluster.clone(),
        repo.clone(),
        repo.clone(),
        repo.clone(),
        storage.clone(),
        Arc::new(bus_tx),
        Arc::new(queue_tx),
        Arc::new(StdEmailTransport::new()),
        Arc::new(ReqwestWebhookTransport::new()),
    ));

    TestHarness {
        platform,
        cluster,
        repo,
        storage,
        bus: bus_rx,
        queue: queue_rx,
    }
}

pub fn job_request() -> JobRequest {
    JobRequest::new(
        "https://example.com/r.git".to_string(),
        "DotNet".to_string(),
        "acme".to_string(),
        "pay".to_string(),
        "u1".to_string(),
    )
}

pub fn drain_bus(bus: &mut UnboundedReceiver<PlatformMsg>) -> Vec<PlatformMsg> {
    let mut messages = Vec::new();
    while let Ok(message) = bus.try_recv() {
        messages.push(message);
    }
    messages
}
