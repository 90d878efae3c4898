use crate::dispatch::MsgPublisher;
use crate::io_models::message::{PlatformMsg, PlatformMsgPayload};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use strum_macros::Display;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
pub enum StepName {
    EnsureNamespace,
    SubmitWorkload,
    ParseReport,
    PersistResults,
    UploadArtifacts,
    PublishMetadata,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum StepOutcome {
    Success,
    Error,
    Canceled,
}

/// One finished measurement of a lifecycle step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    pub job_id: Uuid,
    pub step: StepName,
    pub duration: Duration,
    pub outcome: StepOutcome,
}

pub trait MetricsRegistry: Send + Sync {
    fn record(&self, record: StepRecord);
    fn records_for(&self, job_id: Uuid) -> Vec<StepRecord>;
}

/// Times one step. Consuming `finish` is the only way to report, so every
/// measurement carries an explicit outcome.
pub struct StepTimer<'a> {
    registry: &'a dyn MetricsRegistry,
    job_id: Uuid,
    step: StepName,
    started_at: Instant,
}

impl<'a> StepTimer<'a> {
    pub fn start(registry: &'a dyn MetricsRegistry, job_id: Uuid, step: StepName) -> Self {
        StepTimer {
            registry,
            job_id,
            step,
            started_at: Instant::now(),
        }
    }

    pub fn finish(self, outcome: StepOutcome) {
        self.registry.record(StepRecord {
            job_id: self.job_id,
            step: self.step,
            duration: self.started_at.elapsed(),
            outcome,
        });
    }
}

/// Keeps measurements per job and forwards each finished step to the bus.
pub struct StdMetricsRegistry {
    records: Mutex<HashMap<Uuid, Vec<StepRecord>>>,
    publisher: Arc<MsgPublisher>,
}

impl StdMetricsRegistry {
    pub fn new(publisher: Arc<MsgPublisher>) -> Self {
        StdMetricsRegistry {
            records: Mutex::new(HashMap::new()),
            publisher,
        }
    }
}

impl MetricsRegistry for StdMetricsRegistry {
    fn record(&self, record: StepRecord) {
        debug!(
            "job {} step {} finished in {:?} ({})",
            record.job_id, record.step, record.duration, record.outcome
        );
        self.publisher.dispatch(PlatformMsg::new(
            record.job_id.to_string(),
            PlatformMsgPayload::StepMetrics(record.clone()),
        ));
        self.records.lock().unwrap().entry(record.job_id).or_default().push(record);
    }

    fn records_for(&self, job_id: Uuid) -> Vec<StepRecord> {
        self.records.lock().unwrap().get(&job_id).cloned().unwrap_or_default()
    }
}
