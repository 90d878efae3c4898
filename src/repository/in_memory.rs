use crate::io_models::job::{TestJob, TestJobStatus, TestResult, TestResultStatus};
use crate::io_models::schedule::TestJobSchedule;
use crate::repository::{
    ConfigRepository, ExecutionSummary, FailingTest, JobQuery, JobRepository, LobExecutionSummary, RepositoryError,
    ScheduleRepository, StoredConfig, StoredUserConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, TestJob>,
    results: HashMap<Uuid, Vec<TestResult>>,
    schedules: HashMap<Uuid, TestJobSchedule>,
    admin_configs: Vec<StoredConfig>,
    user_configs: HashMap<Uuid, StoredUserConfig>,
}

/// Process-local implementation of the persistence contracts. The single
/// mutex makes every method, notably `complete_job`, observe as one
/// transaction, which is what the SQL implementation achieves with an
/// explicit transaction scope.
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        InMemoryRepository {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        InMemoryRepository::new()
    }
}

fn summarize<'a, I: Iterator<Item = &'a TestJob>>(jobs: I) -> ExecutionSummary {
    let mut summary = ExecutionSummary::default();
    let mut duration_total = 0.0;
    let mut duration_count = 0u64;
    for job in jobs {
        summary.total_jobs += 1;
        match job.status {
            TestJobStatus::Running => summary.running += 1,
            TestJobStatus::Succeeded => summary.succeeded += 1,
            TestJobStatus::Failed => summary.failed += 1,
        }
        if let Some(duration) = job.duration_seconds() {
            duration_total += duration;
            duration_count += 1;
        }
    }
    if duration_count > 0 {
        summary.average_duration_seconds = duration_total / duration_count as f64;
    }
    summary
}

fn within_range(job: &TestJob, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
    if let Some(start) = start {
        if job.start_time < start {
            return false;
        }
    }
    if let Some(end) = end {
        if job.start_time > end {
            return false;
        }
    }
    true
}

#[async_trait]
impl JobRepository for InMemoryRepository {
    async fn insert_job(&self, job: TestJob) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.jobs.contains_key(&job.id) {
            return Err(RepositoryError::Conflict {
                raw_error_message: format!("job `{}` already exists", job.id),
            });
        }
        inner.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<TestJob>, RepositoryError> {
        Ok(self.inner.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn update_job_status(&self, job_id: Uuid, status: TestJobStatus) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.jobs.get_mut(&job_id) {
            Some(job) => {
                job.status = status;
                Ok(())
            }
            None => Err(RepositoryError::NotFound { id: job_id }),
        }
    }

    async fn count_running_jobs(&self, lob_id: &str, team_id: Option<&str>) -> Result<u32, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|job| job.status == TestJobStatus::Running && job.lob_id == lob_id)
            .filter(|job| team_id.is_none_or(|team| job.team_id == team))
            .count() as u32)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        status: TestJobStatus,
        end_time: DateTime<Utc>,
        results: Vec<TestResult>,
    ) -> Result<TestJob, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(RepositoryError::NotFound { id: job_id })?;
        if job.status.is_terminal() {
            return Err(RepositoryError::Conflict {
                raw_error_message: format!("job `{job_id}` is already in terminal state {}", job.status),
            });
        }

        job.status = status;
        job.end_time = Some(end_time);
        job.tests_passed = results.iter().filter(|r| r.status == TestResultStatus::Passed).count() as u32;
        job.tests_failed = results.iter().filter(|r| r.status == TestResultStatus::Failed).count() as u32;
        // Unknown outcomes count as skipped so the three counters sum to the row count
        job.tests_skipped = results
            .iter()
            .filter(|r| matches!(r.status, TestResultStatus::Skipped | TestResultStatus::Unknown))
            .count() as u32;
        let updated = job.clone();

        inner.results.insert(job_id, results);
        Ok(updated)
    }

    async fn test_results_for_job(&self, job_id: Uuid) -> Result<Vec<TestResult>, RepositoryError> {
        Ok(self.inner.lock().unwrap().results.get(&job_id).cloned().unwrap_or_default())
    }

    async fn jobs_completed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestJob>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|job| job.status.is_terminal() && job.end_time.is_some_and(|end| end < cutoff))
            .cloned()
            .collect())
    }

    async fn delete_test_results(&self, job_id: Uuid) -> Result<u32, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.results.remove(&job_id).map(|rows| rows.len() as u32).unwrap_or(0))
    }

    async fn delete_jobs_completed_before(&self, cutoff: DateTime<Utc>) -> Result<u32, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|job| job.status.is_terminal() && job.end_time.is_some_and(|end| end < cutoff))
            .map(|job| job.id)
            .collect();
        for job_id in &expired {
            inner.jobs.remove(job_id);
            inner.results.remove(job_id);
        }
        Ok(expired.len() as u32)
    }

    async fn execution_summary(
        &self,
        lob_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<ExecutionSummary, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(summarize(inner.jobs.values().filter(|job| {
            lob_id.is_none_or(|lob| job.lob_id == lob) && within_range(job, start, end)
        })))
    }

    async fn lob_execution_summary(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<LobExecutionSummary>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let by_lob = inner
            .jobs
            .values()
            .filter(|job| within_range(job, start, end))
            .map(|job| (job.lob_id.clone(), job))
            .into_group_map();

        Ok(by_lob
            .into_iter()
            .map(|(lob_id, jobs)| LobExecutionSummary {
                lob_id,
                summary: summarize(jobs.into_iter()),
            })
            .sorted_by(|a, b| b.summary.total_jobs.cmp(&a.summary.total_jobs))
            .collect())
    }

    async fn find_jobs(&self, query: &JobQuery) -> Result<Vec<TestJob>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let page = query.page.max(1);
        let page_size = query.page_size.max(1) as usize;
        Ok(inner
            .jobs
            .values()
            .filter(|job| query.matches(job))
            .sorted_by(|a, b| b.start_time.cmp(&a.start_time))
            .skip((page as usize - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn count_jobs(&self, query: &JobQuery) -> Result<u64, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.values().filter(|job| query.matches(job)).count() as u64)
    }

    async fn top_failing_tests(
        &self,
        lob_id: Option<&str>,
        team_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<FailingTest>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let mut counts: HashMap<String, u64> = HashMap::new();
        for (job_id, results) in &inner.results {
            let Some(job) = inner.jobs.get(job_id) else {
                continue;
            };
            if !lob_id.is_none_or(|lob| job.lob_id == lob)
                || !team_id.is_none_or(|team| job.team_id == team)
                || !within_range(job, start, end)
            {
                continue;
            }
            for result in results.iter().filter(|r| r.status == TestResultStatus::Failed) {
                *counts.entry(result.test_name.clone()).or_insert(0) += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(test_name, failure_count)| FailingTest {
                test_name,
                failure_count,
            })
            .sorted_by(|a, b| b.failure_count.cmp(&a.failure_count).then(a.test_name.cmp(&b.test_name)))
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryRepository {
    async fn insert_schedule(&self, schedule: TestJobSchedule) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.schedules.contains_key(&schedule.id) {
            return Err(RepositoryError::Conflict {
                raw_error_message: format!("schedule `{}` already exists", schedule.id),
            });
        }
        inner.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn get_schedule(&self, schedule_id: Uuid) -> Result<Option<TestJobSchedule>, RepositoryError> {
        Ok(self.inner.lock().unwrap().schedules.get(&schedule_id).cloned())
    }

    async fn list_schedules(
        &self,
        lob_id: &str,
        team_id: Option<&str>,
    ) -> Result<Vec<TestJobSchedule>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .schedules
            .values()
            .filter(|schedule| schedule.lob_id == lob_id)
            .filter(|schedule| team_id.is_none_or(|team| schedule.team_id == team))
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned()
            .collect())
    }

    async fn list_active_schedules(&self) -> Result<Vec<TestJobSchedule>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .schedules
            .values()
            .filter(|schedule| schedule.is_active)
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned()
            .collect())
    }

    async fn update_schedule(&self, schedule: TestJobSchedule) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.schedules.contains_key(&schedule.id) {
            return Err(RepositoryError::NotFound { id: schedule.id });
        }
        inner.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: Uuid) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.schedules.remove(&schedule_id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound { id: schedule_id }),
        }
    }
}

#[async_trait]
impl ConfigRepository for InMemoryRepository {
    async fn latest_admin_config(&self) -> Result<Option<StoredConfig>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.admin_configs.iter().max_by_key(|config| config.created_at).cloned())
    }

    async fn upsert_admin_config(&self, config: StoredConfig) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.admin_configs.iter_mut().find(|existing| existing.id == config.id) {
            Some(existing) => *existing = config,
            None => inner.admin_configs.push(config),
        }
        Ok(())
    }

    async fn insert_user_config(&self, config: StoredUserConfig) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.user_configs.contains_key(&config.id) {
            return Err(RepositoryError::Conflict {
                raw_error_message: format!("user configuration `{}` already exists", config.id),
            });
        }
        inner.user_configs.insert(config.id, config);
        Ok(())
    }

    async fn get_user_config(&self, config_id: Uuid) -> Result<Option<StoredUserConfig>, RepositoryError> {
        Ok(self.inner.lock().unwrap().user_configs.get(&config_id).cloned())
    }

    async fn list_user_configs(
        &self,
        lob_id: &str,
        team_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Vec<StoredUserConfig>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .user_configs
            .values()
            .filter(|config| config.lob_id == lob_id)
            .filter(|config| team_id.is_none_or(|team| config.team_id == team))
            .filter(|config| user_id.is_none_or(|user| config.user_id == user))
            .sorted_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned()
            .collect())
    }

    async fn update_user_config(&self, config: StoredUserConfig) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.user_configs.contains_key(&config.id) {
            return Err(RepositoryError::NotFound { id: config.id });
        }
        inner.user_configs.insert(config.id, config);
        Ok(())
    }

    async fn delete_user_config(&self, config_id: Uuid) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.user_configs.remove(&config_id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::NotFound { id: config_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_models::job::JobRequest;
    use chrono::Duration;

    fn job(lob: &str, team: &str, status: TestJobStatus, started_minutes_ago: i64) -> TestJob {
        let request = JobRequest::new(
            "https://example.com/r.git".to_string(),
            "DotNet".to_string(),
            lob.to_string(),
            team.to_string(),
            "u1".to_string(),
        );
        let mut job = TestJob::from_request(Uuid::new_v4(), &request, Utc::now() - Duration::minutes(started_minutes_ago));
        job.status = status;
        if status.is_terminal() {
            job.end_time = Some(job.start_time + Duration::minutes(5));
        }
        job
    }

    fn result(job_id: Uuid, name: &str, status: TestResultStatus) -> TestResult {
        TestResult {
            id: Uuid::new_v4(),
            job_id,
            test_name: name.to_string(),
            status,
            duration_seconds: 1.0,
            error_message: None,
            stack_trace: None,
        }
    }

    #[tokio::test]
    async fn test_complete_job_is_atomic_and_counts_match_rows() {
        let repo = InMemoryRepository::new();
        let job = job("acme", "pay", TestJobStatus::Running, 10);
        let job_id = job.id;
        repo.insert_job(job).await.unwrap();

        let results = vec![
            result(job_id, "t1", TestResultStatus::Passed),
            result(job_id, "t2", TestResultStatus::Failed),
            result(job_id, "t3", TestResultStatus::Unknown),
        ];
        let updated = repo
            .complete_job(job_id, TestJobStatus::Failed, Utc::now(), results)
            .await
            .unwrap();

        assert_eq!(updated.tests_passed, 1);
        assert_eq!(updated.tests_failed, 1);
        assert_eq!(updated.tests_skipped, 1);
        let rows = repo.test_results_for_job(job_id).await.unwrap();
        assert_eq!(
            (updated.tests_passed + updated.tests_failed + updated.tests_skipped) as usize,
            rows.len()
        );

        // terminal transition happens exactly once
        let again = repo.complete_job(job_id, TestJobStatus::Succeeded, Utc::now(), vec![]).await;
        assert!(matches!(again, Err(RepositoryError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_complete_job_requires_existing_row() {
        let repo = InMemoryRepository::new();
        let missing = repo
            .complete_job(Uuid::new_v4(), TestJobStatus::Succeeded, Utc::now(), vec![])
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_count_running_jobs_scoping() {
        let repo = InMemoryRepository::new();
        repo.insert_job(job("acme", "pay", TestJobStatus::Running, 1)).await.unwrap();
        repo.insert_job(job("acme", "ops", TestJobStatus::Running, 1)).await.unwrap();
        repo.insert_job(job("acme", "pay", TestJobStatus::Succeeded, 1)).await.unwrap();
        repo.insert_job(job("globex", "pay", TestJobStatus::Running, 1)).await.unwrap();

        assert_eq!(repo.count_running_jobs("acme", None).await.unwrap(), 2);
        assert_eq!(repo.count_running_jobs("acme", Some("pay")).await.unwrap(), 1);
        assert_eq!(repo.count_running_jobs("initech", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lob_summary_ordering_and_pagination() {
        let repo = InMemoryRepository::new();
        for _ in 0..3 {
            repo.insert_job(job("acme", "pay", TestJobStatus::Succeeded, 5)).await.unwrap();
        }
        repo.insert_job(job("globex", "ops", TestJobStatus::Failed, 5)).await.unwrap();

        let summaries = repo.lob_execution_summary(None, None).await.unwrap();
        assert_eq!(summaries[0].lob_id, "acme");
        assert_eq!(summaries[0].summary.total_jobs, 3);
        assert_eq!(summaries[1].lob_id, "globex");

        let query = JobQuery {
            page_size: 2,
            page: 2,
            ..Default::default()
        };
        assert_eq!(repo.find_jobs(&query).await.unwrap().len(), 2);
        assert_eq!(repo.count_jobs(&query).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_top_failing_tests_grouping() {
        let repo = InMemoryRepository::new();
        for _ in 0..3 {
            let j = job("acme", "pay", TestJobStatus::Running, 5);
            let id = j.id;
            repo.insert_job(j).await.unwrap();
            repo.complete_job(
                id,
                TestJobStatus::Failed,
                Utc::now(),
                vec![
                    result(id, "flaky_login", TestResultStatus::Failed),
                    result(id, "stable_one", TestResultStatus::Passed),
                ],
            )
            .await
            .unwrap();
        }
        let j = job("acme", "pay", TestJobStatus::Running, 5);
        let id = j.id;
        repo.insert_job(j).await.unwrap();
        repo.complete_job(
            id,
            TestJobStatus::Failed,
            Utc::now(),
            vec![result(id, "checkout_total", TestResultStatus::Failed)],
        )
        .await
        .unwrap();

        let top = repo.top_failing_tests(Some("acme"), None, None, None, 10).await.unwrap();
        assert_eq!(top[0].test_name, "flaky_login");
        assert_eq!(top[0].failure_count, 3);
        assert_eq!(top[1].test_name, "checkout_total");

        let none = repo.top_failing_tests(Some("globex"), None, None, None, 10).await.unwrap();
        assert!(none.is_empty());
    }
}
