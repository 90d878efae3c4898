pub mod in_memory;

use crate::io_models::job::{TestJob, TestJobStatus, TestResult};
use crate::io_models::schedule::TestJobSchedule;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Entity `{id}` not found")]
    NotFound { id: Uuid },
    #[error("Conflicting write: {raw_error_message}")]
    Conflict { raw_error_message: String },
    #[error("Repository failure: {raw_error_message}")]
    Internal { raw_error_message: String },
}

/// Stored row of the `AdminConfigurations` table. The policy document itself
/// travels as an opaque YAML blob; the most recently created row wins.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredConfig {
    pub id: Uuid,
    pub name: String,
    pub config_yaml: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored row of the `UserConfigurations` table.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredUserConfig {
    pub id: Uuid,
    pub name: String,
    pub config_yaml: String,
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Typed filter for job listings. SQL implementations MUST translate every
/// field into a bound parameter; no filter value is ever interpolated into
/// query text.
#[derive(Clone, Debug, PartialEq)]
pub struct JobQuery {
    pub lob_id: Option<String>,
    pub team_id: Option<String>,
    pub job_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<TestJobStatus>,
    pub page_size: u32,
    pub page: u32,
}

impl Default for JobQuery {
    fn default() -> Self {
        JobQuery {
            lob_id: None,
            team_id: None,
            job_id: None,
            start: None,
            end: None,
            status: None,
            page_size: 50,
            page: 1,
        }
    }
}

impl JobQuery {
    pub fn matches(&self, job: &TestJob) -> bool {
        if let Some(lob) = &self.lob_id {
            if &job.lob_id != lob {
                return false;
            }
        }
        if let Some(team) = &self.team_id {
            if &job.team_id != team {
                return false;
            }
        }
        if let Some(id) = self.job_id {
            if job.id != id {
                return false;
            }
        }
        if let Some(start) = self.start {
            if job.start_time < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if job.start_time > end {
                return false;
            }
        }
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionSummary {
    pub total_jobs: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub average_duration_seconds: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LobExecutionSummary {
    pub lob_id: String,
    pub summary: ExecutionSummary,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FailingTest {
    pub test_name: String,
    pub failure_count: u64,
}

/// Persistence contract for jobs and their per-test children. The concrete
/// relational implementation lives outside the core.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert_job(&self, job: TestJob) -> Result<(), RepositoryError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TestJob>, RepositoryError>;

    async fn update_job_status(&self, job_id: Uuid, status: TestJobStatus) -> Result<(), RepositoryError>;

    /// Count `Running` rows for a lob, optionally narrowed to one team.
    async fn count_running_jobs(&self, lob_id: &str, team_id: Option<&str>) -> Result<u32, RepositoryError>;

    /// Transition the job to a terminal state and insert its result rows.
    /// Implementations MUST apply the status transition and the batch insert
    /// in a single transaction; the counters are derived from `results` so
    /// that `tests_passed + tests_failed + tests_skipped` always equals the
    /// number of child rows. A job already in a terminal state is a conflict.
    async fn complete_job(
        &self,
        job_id: Uuid,
        status: TestJobStatus,
        end_time: DateTime<Utc>,
        results: Vec<TestResult>,
    ) -> Result<TestJob, RepositoryError>;

    async fn test_results_for_job(&self, job_id: Uuid) -> Result<Vec<TestResult>, RepositoryError>;

    /// Terminal jobs whose `end_time` precedes the cutoff.
    async fn jobs_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestJob>, RepositoryError>;

    async fn delete_test_results(&self, job_id: Uuid) -> Result<u32, RepositoryError>;

    async fn delete_jobs_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u32, RepositoryError>;

    async fn execution_summary(
        &self,
        lob_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ExecutionSummary, RepositoryError>;

    /// Per-lob summaries ordered by total jobs, descending.
    async fn lob_execution_summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LobExecutionSummary>, RepositoryError>;

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<TestJob>, RepositoryError>;

    async fn count_jobs(&self, query: &JobQuery) -> Result<u64, RepositoryError>;

    /// Failed test rows joined to their jobs, grouped by test name, ordered
    /// by failure count descending.
    async fn top_failing_tests(
        &self,
        lob_id: Option<&str>,
        team_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FailingTest>, RepositoryError>;
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert_schedule(&self, schedule: TestJobSchedule) -> Result<(), RepositoryError>;

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Option<TestJobSchedule>, RepositoryError>;

    async fn list_schedules(&self, lob_id: &str, team_id: Option<&str>)
    -> Result<Vec<TestJobSchedule>, RepositoryError>;

    async fn list_active_schedules(&self) -> Result<Vec<TestJobSchedule>, RepositoryError>;

    async fn update_schedule(&self, schedule: TestJobSchedule) -> Result<(), RepositoryError>;

    async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Most recently created admin configuration row, if any.
    async fn latest_admin_config(&self) -> Result<Option<StoredConfig>, RepositoryError>;

    async fn upsert_admin_config(&self, config: StoredConfig) -> Result<(), RepositoryError>;

    async fn insert_user_config(&self, config: StoredUserConfig) -> Result<(), RepositoryError>;

    async fn get_user_config(&self, config_id: Uuid) -> Result<Option<StoredUserConfig>, RepositoryError>;

    async fn list_user_configs(
        &self,
        lob_id: &str,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<StoredUserConfig>, RepositoryError>;

    async fn update_user_config(&self, config: StoredUserConfig) -> Result<(), RepositoryError>;

    async fn delete_user_config(&self, config_id: Uuid) -> Result<(), RepositoryError>;
}
