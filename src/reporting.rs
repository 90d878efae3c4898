use crate::errors::EngineError;
use crate::io_models::job::TestJob;
use crate::repository::{ExecutionSummary, FailingTest, JobQuery, JobRepository, LobExecutionSummary};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_TOP_FAILING_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<TestJob>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Read-side aggregations over the job store. Owns paging defaults and
/// bounds; the queries themselves are typed repository methods so a SQL
/// implementation pushes them down with bound parameters.
pub struct ReportingService {
    repo: Arc<dyn JobRepository>,
}

impl ReportingService {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        ReportingService { repo }
    }

    pub async fn get_execution_summary(
        &self,
        lob_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ExecutionSummary, EngineError> {
        Ok(self.repo.execution_summary(lob_id, start, end).await?)
    }

    pub async fn get_lob_execution_summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LobExecutionSummary>, EngineError> {
        Ok(self.repo.lob_execution_summary(start, end).await?)
    }

    pub async fn get_jobs(&self, query: JobQuery) -> Result<JobPage, EngineError> {
        let query = JobQuery {
            page: query.page.max(1),
            page_size: query.page_size.clamp(1, MAX_PAGE_SIZE),
            ..query
        };

        let total_count = self.repo.count_jobs(&query).await?;
        let jobs = self.repo.find_jobs(&query).await?;
        Ok(JobPage {
            jobs,
            total_count,
            page: query.page,
            page_size: query.page_size,
        })
    }

    pub async fn get_jobs_count(&self, query: &JobQuery) -> Result<u64, EngineError> {
        Ok(self.repo.count_jobs(query).await?)
    }

    pub async fn get_top_failing_tests(
        &self,
        lob_id: Option<&str>,
        team_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<FailingTest>, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_TOP_FAILING_LIMIT).clamp(1, 100);
        Ok(self.repo.top_failing_tests(lob_id, team_id, start, end, limit).await?)
    }
}
