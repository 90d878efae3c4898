use crate::dispatch::JobQueue;
use crate::errors::EngineError;
use crate::io_models::job::JobRequest;
use crate::io_models::message::QueueMessage;
use crate::io_models::schedule::{ScheduleType, TestJobSchedule};
use crate::repository::ScheduleRepository;
use chrono::{DateTime, Datelike, Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Whether `schedule` should fire at `now`. Pure in `(schedule, now)` and
/// monotone within a tick: once due, a schedule stays due until its run
/// bookkeeping is updated.
pub fn is_due(schedule: &TestJobSchedule, now: DateTime<Utc>) -> bool {
    if !schedule.is_active || schedule.is_exhausted() {
        return false;
    }

    match schedule.schedule_type {
        ScheduleType::RunOnce => {
            schedule.last_run_time.is_none() && schedule.scheduled_time.is_some_and(|at| now >= at)
        }
        ScheduleType::Interval => {
            let Some(minutes) = schedule.interval_minutes.filter(|minutes| *minutes > 0) else {
                return false;
            };
            let base = schedule.last_run_time.unwrap_or(schedule.created_at);
            now >= base + Duration::minutes(i64::from(minutes))
        }
        ScheduleType::Weekly => {
            let Some(time_of_day) = schedule.time_of_day else {
                return false;
            };
            // 0 = Sunday, matching the persisted day-of-week convention
            let weekday = now.weekday().num_days_from_sunday() as u8;
            schedule.days_of_week.contains(&weekday)
                && now.time() >= time_of_day
                && !already_fired_for_slot(schedule, now)
        }
        ScheduleType::Monthly => {
            let Some(time_of_day) = schedule.time_of_day else {
                return false;
            };
            let day_of_month = now.day() as u8;
            schedule.days_of_month.contains(&day_of_month)
                && now.time() >= time_of_day
                && !already_fired_for_slot(schedule, now)
        }
    }
}

/// A weekly/monthly slot has been consumed when the last run happened on the
/// same calendar day, at or after the slot's time of day.
fn already_fired_for_slot(schedule: &TestJobSchedule, now: DateTime<Utc>) -> bool {
    let Some(time_of_day) = schedule.time_of_day else {
        return false;
    };
    match schedule.last_run_time {
        None => false,
        Some(last_run) => last_run.date_naive() == now.date_naive() && last_run.time() >= time_of_day,
    }
}

fn job_request_from_schedule(schedule: &TestJobSchedule) -> JobRequest {
    let mut request = JobRequest::new(
        schedule.repo_url.clone(),
        schedule.test_image_type.clone(),
        schedule.lob_id.clone(),
        schedule.team_id.clone(),
        format!("schedule:{}", schedule.name),
    );
    request.schedule_id = Some(schedule.id);
    request
}

/// Evaluates due schedules on a periodic tick and hands the derived job
/// requests to the queue, so scheduled work enters the same pipeline as user
/// submissions. Missed ticks collapse: a schedule fires at most once per
/// tick regardless of how many slots were skipped.
pub struct ScheduleEngine {
    schedules: Arc<dyn ScheduleRepository>,
    queue: Arc<JobQueue>,
}

impl ScheduleEngine {
    pub fn new(schedules: Arc<dyn ScheduleRepository>, queue: Arc<JobQueue>) -> Self {
        ScheduleEngine { schedules, queue }
    }

    pub async fn create_schedule_from_yaml(
        &self,
        yaml: &str,
        lob_id: &str,
        team_id: &str,
    ) -> Result<TestJobSchedule, EngineError> {
        let mut schedule: TestJobSchedule = serde_yaml::from_str(yaml)?;
        // identity and bookkeeping are server-assigned
        schedule.id = Uuid::new_v4();
        schedule.lob_id = lob_id.to_string();
        schedule.team_id = team_id.to_string();
        schedule.created_at = Utc::now();
        schedule.run_count = 0;
        schedule.last_run_time = None;
        schedule.validate()?;

        self.schedules.insert_schedule(schedule.clone()).await?;
        info!(lob = %lob_id, team = %team_id, "Created schedule {} ({})", schedule.name, schedule.id);
        Ok(schedule)
    }

    pub async fn update_schedule_from_yaml(
        &self,
        schedule_id: Uuid,
        yaml: &str,
        lob_id: &str,
        team_id: &str,
    ) -> Result<TestJobSchedule, EngineError> {
        let existing = self.owned_schedule(schedule_id, lob_id).await?;
        if existing.team_id != team_id {
            return Err(EngineError::Forbidden);
        }

        let mut schedule: TestJobSchedule = serde_yaml::from_str(yaml)?;
        schedule.id = existing.id;
        schedule.lob_id = existing.lob_id.clone();
        schedule.team_id = existing.team_id.clone();
        schedule.created_at = existing.created_at;
        schedule.run_count = existing.run_count;
        schedule.last_run_time = existing.last_run_time;
        schedule.validate()?;

        self.schedules.update_schedule(schedule.clone()).await?;
        Ok(schedule)
    }

    pub async fn get_schedule(&self, schedule_id: Uuid, lob_id: &str) -> Result<TestJobSchedule, EngineError> {
        self.owned_schedule(schedule_id, lob_id).await
    }

    pub async fn list_schedules(
        &self,
        lob_id: &str,
        team_id: Option<&str>,
    ) -> Result<Vec<TestJobSchedule>, EngineError> {
        Ok(self.schedules.list_schedules(lob_id, team_id).await?)
    }

    pub async fn delete_schedule(&self, schedule_id: Uuid, lob_id: &str) -> Result<(), EngineError> {
        let schedule = self.owned_schedule(schedule_id, lob_id).await?;
        self.schedules.delete_schedule(schedule.id).await?;
        Ok(())
    }

    /// Evaluate every active schedule against `now`, enqueue a job request
    /// per due schedule, then update its run bookkeeping. Returns how many
    /// schedules fired.
    pub async fn process_due_schedules(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<u32, EngineError> {
        let active = self.schedules.list_active_schedules().await?;
        let mut fired = 0;

        for schedule in active {
            if cancel.is_cancelled() {
                return Err(EngineError::Canceled);
            }
            if !is_due(&schedule, now) {
                continue;
            }

            info!("Schedule {} ({}) is due, enqueueing job", schedule.name, schedule.id);
            self.queue.dispatch(QueueMessage::RunJob(job_request_from_schedule(&schedule)));

            if let Err(err) = self.update_schedule_last_run(schedule.id, &schedule.lob_id, now).await {
                // next tick re-fires this schedule; at-most-once-per-tick still holds
                error!("Cannot update run bookkeeping for schedule {}: {err}", schedule.id);
                continue;
            }
            fired += 1;
        }

        debug!("Schedule tick fired {fired} of the active schedules");
        Ok(fired)
    }

    /// Increment the run counter, stamp the last run time, and deactivate
    /// the schedule once `max_runs` is reached.
    pub async fn update_schedule_last_run(
        &self,
        schedule_id: Uuid,
        lob_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut schedule = self.owned_schedule(schedule_id, lob_id).await?;
        schedule.run_count += 1;
        schedule.last_run_time = Some(now);
        if schedule.is_exhausted() {
            info!("Schedule {} reached its max runs, deactivating", schedule.id);
            schedule.is_active = false;
        }
        self.schedules.update_schedule(schedule).await?;
        Ok(())
    }

    async fn owned_schedule(&self, schedule_id: Uuid, lob_id: &str) -> Result<TestJobSchedule, EngineError> {
        match self.schedules.get_schedule(schedule_id).await? {
            Some(schedule) if schedule.lob_id == lob_id => Ok(schedule),
            _ => Err(EngineError::ScheduleNotFound { schedule_id }),
        }
    }
}
