use crate::io_models::job::{JobRequest, TestJobStatus};
use crate::metrics_registry::StepRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Summary event published to the message bus once a job has reached a
/// terminal state. Keyed by `job_id` on the `test-results-metadata` topic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResultMetadataMessage {
    pub job_id: Uuid,
    pub lob_id: String,
    pub team_id: String,
    pub status: TestJobStatus,
    pub total_tests: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub tests_skipped: u32,
    pub duration_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

/// A single numeric observation, optionally dimensioned by tenancy or
/// namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

impl MetricPoint {
    pub fn new<S: Into<String>>(name: S, value: f64, dimensions: BTreeMap<String, String>) -> Self {
        MetricPoint {
            name: name.into(),
            value,
            dimensions,
        }
    }
}

#[derive(Clone, Debug)]
pub enum PlatformMsgPayload {
    TestResultMetadata(TestResultMetadataMessage),
    Metric(MetricPoint),
    StepMetrics(StepRecord),
    TestJobCreated {
        namespace: String,
        image_type: String,
        lob_id: String,
    },
}

/// Envelope handed to the bus publisher. `key` is the partitioning key on the
/// bus (the job id for result metadata).
#[derive(Clone, Debug)]
pub struct PlatformMsg {
    pub key: String,
    pub payload: PlatformMsgPayload,
}

impl PlatformMsg {
    pub fn new(key: String, payload: PlatformMsgPayload) -> Self {
        PlatformMsg { key, payload }
    }
}

/// Work items routed through the external queue. Scheduled jobs re-enter the
/// platform through the same pipeline as user submissions; failed teardown
/// and artifact ingestion are re-driven by an external consumer, the core
/// itself never retries.
#[derive(Clone, Debug)]
pub enum QueueMessage {
    RunJob(JobRequest),
    CleanupJob { job_name: String, lob_id: String },
    ReingestArtifacts { job_id: Uuid },
}
