use crate::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};
use url::Url;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Hash)]
pub enum TestJobStatus {
    Running,
    Succeeded,
    Failed,
}

impl TestJobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestJobStatus::Running)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Hash)]
pub enum TestResultStatus {
    Passed,
    Failed,
    Skipped,
    Unknown,
}

/// A validated request to run one repository's test suite. Tenancy fields are
/// always derived server-side from the auth claims, never from a client body.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub repo_url: String,
    pub test_image_type: String,
    pub lob_id: String,
    pub team_id: String,
    pub user_id: String,
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub test_filter: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl JobRequest {
    pub fn new(
        repo_url: String,
        test_image_type: String,
        lob_id: String,
        team_id: String,
        user_id: String,
    ) -> Self {
        JobRequest {
            repo_url,
            test_image_type,
            lob_id,
            team_id,
            user_id,
            schedule_id: None,
            timeout_minutes: None,
            branch: default_branch(),
            test_filter: None,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.repo_url.trim().is_empty() {
            return Err(EngineError::invalid_request("repoUrl must not be empty"));
        }
        if Url::parse(&self.repo_url).is_err() {
            return Err(EngineError::invalid_request(format!(
                "repoUrl `{}` is not a valid URL",
                self.repo_url
            )));
        }
        if self.test_image_type.trim().is_empty() {
            return Err(EngineError::invalid_request("testImageType must not be empty"));
        }
        if self.lob_id.trim().is_empty() || self.team_id.trim().is_empty() {
            return Err(EngineError::invalid_request(
                "lob and team claims are required to submit a job",
            ));
        }
        Ok(())
    }
}

/// Persisted job row. Created in `Running` at submission and transitioned to
/// a terminal state exactly once on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestJob {
    pub id: Uuid,
    pub lob_id: String,
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub status: TestJobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub tests_skipped: u32,
    pub created_by: String,
    pub schedule_id: Option<Uuid>,
}

impl TestJob {
    pub fn from_request(id: Uuid, request: &JobRequest, start_time: DateTime<Utc>) -> Self {
        TestJob {
            id,
            lob_id: request.lob_id.clone(),
            team_id: request.team_id.clone(),
            repo_url: request.repo_url.clone(),
            test_image_type: request.test_image_type.clone(),
            status: TestJobStatus::Running,
            start_time,
            end_time: None,
            tests_passed: 0,
            tests_failed: 0,
            tests_skipped: 0,
            created_by: request.user_id.clone(),
            schedule_id: request.schedule_id,
        }
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 1000.0)
    }
}

/// Persisted per-test row, child of a [`TestJob`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub test_name: String,
    pub status: TestResultStatus,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

/// Container env entries handed to the runner on top of `REPO_URL`.
pub fn runner_environment(request: &JobRequest) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("REPO_URL".to_string(), request.repo_url.clone());
    env.insert("TEST_BRANCH".to_string(), request.branch.clone());
    if let Some(filter) = &request.test_filter {
        env.insert("TEST_FILTER".to_string(), filter.clone());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_request_validation() {
        let valid = JobRequest::new(
            "https://example.com/r.git".to_string(),
            "DotNet".to_string(),
            "acme".to_string(),
            "pay".to_string(),
            "u1".to_string(),
        );
        assert!(valid.validate().is_ok());

        let mut missing_repo = valid.clone();
        missing_repo.repo_url = "".to_string();
        assert!(missing_repo.validate().is_err());

        let mut bad_url = valid.clone();
        bad_url.repo_url = "not a url".to_string();
        assert!(bad_url.validate().is_err());

        let mut missing_claims = valid.clone();
        missing_claims.team_id = "".to_string();
        assert!(missing_claims.validate().is_err());
    }

    #[test]
    fn test_runner_environment_carries_repo_url() {
        let request = JobRequest::new(
            "https://example.com/r.git".to_string(),
            "DotNet".to_string(),
            "acme".to_string(),
            "pay".to_string(),
            "u1".to_string(),
        );
        let env = runner_environment(&request);
        assert_eq!(env.get("REPO_URL").map(String::as_str), Some("https://example.com/r.git"));
        assert_eq!(env.get("TEST_BRANCH").map(String::as_str), Some("main"));
        assert!(!env.contains_key("TEST_FILTER"));
    }
}
