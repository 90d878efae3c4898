pub mod report_parsing;

use crate::dispatch::{JobQueue, MsgPublisher};
use crate::errors::{EngineError, QuotaScope};
use crate::io_models::job::{JobRequest, TestJob, TestJobStatus, TestResult};
use crate::io_models::message::{
    MetricPoint, PlatformMsg, PlatformMsgPayload, QueueMessage, TestResultMetadataMessage,
};
use crate::metrics_registry::{MetricsRegistry, StepName, StepOutcome, StepTimer};
use crate::monitoring::alerting::AlertManager;
use crate::monitoring::{METRIC_TEST_EXECUTION_DURATION, METRIC_TEST_EXECUTION_FAILED, METRIC_TEST_EXECUTION_FAIL_RATE};
use crate::object_storage::errors::ObjectStorageError;
use crate::object_storage::{ObjectStorage, artifact_key};
use crate::policy::PolicyStore;
use crate::repository::{JobRepository, RepositoryError};
use crate::tracker::report_parsing::parse_test_results;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const RESULTS_FILE_NAME: &str = "test-results.xml";
pub const FULL_LOG_FILE_NAME: &str = "full-log.txt";

#[derive(Clone, Debug)]
pub struct CompletionOutcome {
    pub job: TestJob,
    pub artifact_uploaded: bool,
    /// Client-visible reason the artifact step was aborted (oversized file).
    pub artifact_error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub test_results_pruned: u32,
    pub jobs_pruned: u32,
    pub artifacts_deleted: u32,
}

/// Owns the persisted job lifecycle: creation under quota, the transactional
/// terminal transition with its result rows, and the post-commit fan-out to
/// storage, bus and metrics.
pub struct JobTracker {
    repo: Arc<dyn JobRepository>,
    storage: Arc<dyn ObjectStorage>,
    publisher: Arc<MsgPublisher>,
    alerts: Arc<AlertManager>,
    policy: Arc<PolicyStore>,
    metrics: Arc<dyn MetricsRegistry>,
    queue: Arc<JobQueue>,
}

impl JobTracker {
    pub fn new(
        repo: Arc<dyn JobRepository>,
        storage: Arc<dyn ObjectStorage>,
        publisher: Arc<MsgPublisher>,
        alerts: Arc<AlertManager>,
        policy: Arc<PolicyStore>,
        metrics: Arc<dyn MetricsRegistry>,
        queue: Arc<JobQueue>,
    ) -> Self {
        JobTracker {
            repo,
            storage,
            publisher,
            alerts,
            policy,
            metrics,
            queue,
        }
    }

    /// Insert a `Running` row for the request and return its id. Submission
    /// is rejected when the lob or team already runs at its concurrency cap.
    pub async fn create_job(&self, request: &JobRequest) -> Result<Uuid, EngineError> {
        request.validate()?;

        let admin = self.policy.get_admin_configuration(true).await?;
        let caps = &admin.resource_management;

        let lob_running = self.repo.count_running_jobs(&request.lob_id, None).await?;
        if lob_running >= caps.max_concurrent_jobs_per_lob {
            return Err(EngineError::QuotaExceeded {
                scope: QuotaScope::Lob,
                scope_id: request.lob_id.clone(),
                active: lob_running,
                max_allowed: caps.max_concurrent_jobs_per_lob,
            });
        }
        let team_running = self.repo.count_running_jobs(&request.lob_id, Some(&request.team_id)).await?;
        if team_running >= caps.max_concurrent_jobs_per_team {
            return Err(EngineError::QuotaExceeded {
                scope: QuotaScope::Team,
                scope_id: request.team_id.clone(),
                active: team_running,
                max_allowed: caps.max_concurrent_jobs_per_team,
            });
        }

        let job = TestJob::from_request(Uuid::new_v4(), request, Utc::now());
        let job_id = job.id;
        self.repo.insert_job(job).await?;
        info!(lob = %request.lob_id, team = %request.team_id, "Created test job {job_id}");
        Ok(job_id)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<TestJob, EngineError> {
        self.repo
            .get_job(job_id)
            .await?
            .ok_or(EngineError::JobNotFound { job_id })
    }

    pub async fn get_test_results(&self, job_id: Uuid) -> Result<Vec<TestResult>, EngineError> {
        Ok(self.repo.test_results_for_job(job_id).await?)
    }

    /// Non-terminal transition hook for external signals.
    pub async fn update_job_status(&self, job_id: Uuid, status: TestJobStatus) -> Result<(), EngineError> {
        match self.repo.update_job_status(job_id, status).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::NotFound { .. }) => Err(EngineError::JobNotFound { job_id }),
            Err(err) => Err(err.into()),
        }
    }

    /// Converge the job to its terminal state. The status transition and the
    /// result rows commit atomically; everything after the commit is
    /// best-effort and only ever logged.
    pub async fn complete_job(
        &self,
        job_id: Uuid,
        status: TestJobStatus,
        results_xml: &str,
        artifact: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<CompletionOutcome, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::invalid_request(
                "completion requires a terminal status (Succeeded or Failed)",
            ));
        }

        let timer = StepTimer::start(self.metrics.as_ref(), job_id, StepName::ParseReport);
        let parsed = match parse_test_results(results_xml) {
            Ok(tests) => {
                timer.finish(StepOutcome::Success);
                tests
            }
            Err(err) => {
                // not fatal: the job still converges, with zero counts
                timer.finish(StepOutcome::Error);
                warn!("Cannot parse test report for job {job_id}: {err}");
                Vec::new()
            }
        };

        let results: Vec<TestResult> = parsed
            .into_iter()
            .map(|test| TestResult {
                id: Uuid::new_v4(),
                job_id,
                test_name: test.name,
                status: test.status,
                duration_seconds: test.duration_seconds,
                error_message: test.error_message,
                stack_trace: test.stack_trace,
            })
            .collect();
        let results_for_log = results.clone();

        let timer = StepTimer::start(self.metrics.as_ref(), job_id, StepName::PersistResults);
        let job = match self.repo.complete_job(job_id, status, Utc::now(), results).await {
            Ok(job) => {
                timer.finish(StepOutcome::Success);
                job
            }
            Err(err) => {
                timer.finish(StepOutcome::Error);
                return match err {
                    RepositoryError::NotFound { .. } => Err(EngineError::JobNotFound { job_id }),
                    other => Err(other.into()),
                };
            }
        };

        let mut outcome = CompletionOutcome {
            job: job.clone(),
            artifact_uploaded: false,
            artifact_error: None,
        };

        if cancel.is_cancelled() {
            warn!("Completion of job {job_id} canceled after commit, skipping side effects");
            return Ok(outcome);
        }

        if let Some(bytes) = artifact {
            if !bytes.is_empty() {
                self.upload_artifacts(&job, bytes, &results_for_log, &mut outcome).await;
            }
        }

        self.emit_execution_telemetry(&job).await;
        self.publish_metadata(&job);

        Ok(outcome)
    }

    async fn upload_artifacts(
        &self,
        job: &TestJob,
        artifact: &[u8],
        results: &[TestResult],
        outcome: &mut CompletionOutcome,
    ) {
        let admin = match self.policy.get_admin_configuration(true).await {
            Ok(admin) => admin,
            Err(err) => {
                warn!("Cannot read retention policy, skipping artifact upload for job {}: {err}", job.id);
                return;
            }
        };

        let xml_key = artifact_key(&job.lob_id, &job.team_id, job.id, RESULTS_FILE_NAME);
        let max_size_in_mb = admin.retention.max_test_result_file_size_mb;
        let size_in_bytes = artifact.len() as u64;
        if size_in_bytes > u64::from(max_size_in_mb) * 1024 * 1024 {
            let err = ObjectStorageError::FileTooLarge {
                key: xml_key,
                size_in_bytes,
                max_size_in_mb,
            };
            warn!("Artifact upload aborted for job {}: {err}", job.id);
            outcome.artifact_error = Some(err.to_string());
            return;
        }

        let timer = StepTimer::start(self.metrics.as_ref(), job.id, StepName::UploadArtifacts);
        let log_key = artifact_key(&job.lob_id, &job.team_id, job.id, FULL_LOG_FILE_NAME);
        let full_log = synthesize_full_log(job, results);

        let uploads = async {
            self.storage.put(&xml_key, artifact).await?;
            self.storage.put(&log_key, full_log.as_bytes()).await
        };
        match uploads.await {
            Ok(()) => {
                timer.finish(StepOutcome::Success);
                outcome.artifact_uploaded = true;
            }
            Err(err) => {
                timer.finish(StepOutcome::Error);
                warn!("Cannot upload artifacts for job {}: {err}", job.id);
                self.queue.dispatch(QueueMessage::ReingestArtifacts { job_id: job.id });
            }
        }
    }

    async fn emit_execution_telemetry(&self, job: &TestJob) {
        let duration_seconds = job.duration_seconds().unwrap_or(0.0);
        let total_tests = job.tests_passed + job.tests_failed + job.tests_skipped;
        let (pass_rate, fail_rate) = if total_tests > 0 {
            (
                f64::from(job.tests_passed) / f64::from(total_tests) * 100.0,
                f64::from(job.tests_failed) / f64::from(total_tests) * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        let mut dimensions = BTreeMap::new();
        dimensions.insert("lob".to_string(), job.lob_id.clone());
        dimensions.insert("team".to_string(), job.team_id.clone());

        for (name, value) in [
            (METRIC_TEST_EXECUTION_DURATION, duration_seconds),
            ("TestExecution.TestsPassed", f64::from(job.tests_passed)),
            ("TestExecution.TestsFailed", f64::from(job.tests_failed)),
            ("TestExecution.TestsSkipped", f64::from(job.tests_skipped)),
            ("TestExecution.PassRate", pass_rate),
            (METRIC_TEST_EXECUTION_FAIL_RATE, fail_rate),
        ] {
            self.publisher.dispatch(PlatformMsg::new(
                job.id.to_string(),
                PlatformMsgPayload::Metric(MetricPoint::new(name, value, dimensions.clone())),
            ));
        }

        self.alerts
            .evaluate_metric(METRIC_TEST_EXECUTION_DURATION, duration_seconds, &dimensions)
            .await;
        self.alerts
            .evaluate_metric(METRIC_TEST_EXECUTION_FAIL_RATE, fail_rate, &dimensions)
            .await;
        if job.status != TestJobStatus::Succeeded {
            self.alerts
                .evaluate_metric(METRIC_TEST_EXECUTION_FAILED, 1.0, &dimensions)
                .await;
        }
    }

    fn publish_metadata(&self, job: &TestJob) {
        let timer = StepTimer::start(self.metrics.as_ref(), job.id, StepName::PublishMetadata);
        self.publisher.dispatch(PlatformMsg::new(
            job.id.to_string(),
            PlatformMsgPayload::TestResultMetadata(TestResultMetadataMessage {
                job_id: job.id,
                lob_id: job.lob_id.clone(),
                team_id: job.team_id.clone(),
                status: job.status,
                total_tests: job.tests_passed + job.tests_failed + job.tests_skipped,
                tests_passed: job.tests_passed,
                tests_failed: job.tests_failed,
                tests_skipped: job.tests_skipped,
                duration_seconds: job.duration_seconds().unwrap_or(0.0),
                completed_at: job.end_time.unwrap_or_else(Utc::now),
            }),
        ));
        timer.finish(StepOutcome::Success);
    }

    /// Drop result rows and artifacts past the results retention window, and
    /// job rows past the history retention window. Runs on the daily ticker.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<RetentionReport, EngineError> {
        let admin = self.policy.get_admin_configuration(true).await?;
        let retention = &admin.retention;

        let mut report = RetentionReport::default();
        let results_cutoff = now - Duration::days(i64::from(retention.test_results_retention_days));
        for job in self.repo.jobs_completed_before(results_cutoff).await? {
            let prefix = format!("{}/{}/{}/", job.lob_id, job.team_id, job.id);
            match self.storage.list(&prefix).await {
                Ok(keys) => {
                    for key in keys {
                        match self.storage.delete(&key).await {
                            Ok(()) => report.artifacts_deleted += 1,
                            Err(err) => warn!("Cannot delete artifact {key}: {err}"),
                        }
                    }
                }
                Err(err) => warn!("Cannot list artifacts for job {}: {err}", job.id),
            }
            report.test_results_pruned += self.repo.delete_test_results(job.id).await?;
        }

        let history_cutoff = now - Duration::days(i64::from(retention.job_history_retention_days));
        report.jobs_pruned = self.repo.delete_jobs_completed_before(history_cutoff).await?;

        info!(
            "Retention pass pruned {} result rows, {} job rows and {} artifacts",
            report.test_results_pruned, report.jobs_pruned, report.artifacts_deleted
        );
        Ok(report)
    }
}

fn synthesize_full_log(job: &TestJob, results: &[TestResult]) -> String {
    let mut log = String::new();
    let _ = writeln!(log, "=== Test Execution Log ===");
    let _ = writeln!(log, "Job: {}", job.id);
    let _ = writeln!(log, "Repository: {}", job.repo_url);
    let _ = writeln!(log, "Image type: {}", job.test_image_type);
    let _ = writeln!(log, "Status: {}", job.status);
    let _ = writeln!(log, "Started: {}", job.start_time.to_rfc3339());
    if let Some(end_time) = job.end_time {
        let _ = writeln!(log, "Completed: {}", end_time.to_rfc3339());
    }
    let _ = writeln!(
        log,
        "Totals: {} passed, {} failed, {} skipped",
        job.tests_passed, job.tests_failed, job.tests_skipped
    );
    let _ = writeln!(log);

    for result in results {
        let _ = writeln!(log, "[{}] {} ({:.3}s)", result.status, result.test_name, result.duration_seconds);
        if let Some(message) = &result.error_message {
            let _ = writeln!(log, "    message: {message}");
        }
        if let Some(stack_trace) = &result.stack_trace {
            let _ = writeln!(log, "    stack trace: {stack_trace}");
        }
    }

    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_models::job::TestResultStatus;

    #[test]
    fn test_full_log_contains_header_and_per_test_blocks() {
        let request = JobRequest::new(
            "https://example.com/r.git".to_string(),
            "DotNet".to_string(),
            "acme".to_string(),
            "pay".to_string(),
            "u1".to_string(),
        );
        let mut job = TestJob::from_request(Uuid::new_v4(), &request, Utc::now());
        job.status = TestJobStatus::Failed;
        job.end_time = Some(Utc::now());
        job.tests_passed = 1;
        job.tests_failed = 1;

        let results = vec![
            TestResult {
                id: Uuid::new_v4(),
                job_id: job.id,
                test_name: "t1".to_string(),
                status: TestResultStatus::Passed,
                duration_seconds: 0.5,
                error_message: None,
                stack_trace: None,
            },
            TestResult {
                id: Uuid::new_v4(),
                job_id: job.id,
                test_name: "t2".to_string(),
                status: TestResultStatus::Failed,
                duration_seconds: 1.2,
                error_message: Some("boom".to_string()),
                stack_trace: None,
            },
        ];

        let log = synthesize_full_log(&job, &results);
        assert!(log.starts_with("=== Test Execution Log ==="));
        assert!(log.contains(&format!("Job: {}", job.id)));
        assert!(log.contains("Totals: 1 passed, 1 failed, 0 skipped"));
        assert!(log.contains("[Passed] t1 (0.500s)"));
        assert!(log.contains("[Failed] t2 (1.200s)"));
        assert!(log.contains("message: boom"));
    }
}
