use crate::errors::EngineError;
use crate::io_models::default_timestamp;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
pub enum ScheduleType {
    RunOnce,
    Interval,
    Weekly,
    Monthly,
}

/// A persistent rule that fires jobs on a time pattern. Owned by
/// `(lob_id, team_id)`; mutations require matching claims.
///
/// Day-of-week values follow 0=Sunday..6=Saturday; day-of-month values are
/// 1..=31. Both sets round-trip natively through YAML sequences.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestJobSchedule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub lob_id: String,
    #[serde(default)]
    pub team_id: String,
    pub repo_url: String,
    pub test_image_type: String,
    pub schedule_type: ScheduleType,
    #[serde(default)]
    pub interval_minutes: Option<u32>,
    #[serde(default)]
    pub days_of_week: BTreeSet<u8>,
    #[serde(default)]
    pub days_of_month: BTreeSet<u8>,
    #[serde(default, with = "time_of_day_format")]
    pub time_of_day: Option<NaiveTime>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run_time: Option<DateTime<Utc>>,
}

fn default_is_active() -> bool {
    true
}

impl TestJobSchedule {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::invalid_request("schedule name must not be empty"));
        }
        if self.repo_url.trim().is_empty() || self.test_image_type.trim().is_empty() {
            return Err(EngineError::invalid_request(
                "repoUrl and testImageType must not be empty",
            ));
        }
        if let Some(day) = self.days_of_week.iter().find(|d| **d > 6) {
            return Err(EngineError::invalid_request(format!(
                "day of week `{day}` is out of range 0..=6"
            )));
        }
        if let Some(day) = self.days_of_month.iter().find(|d| **d < 1 || **d > 31) {
            return Err(EngineError::invalid_request(format!(
                "day of month `{day}` is out of range 1..=31"
            )));
        }

        match self.schedule_type {
            ScheduleType::RunOnce => {
                if self.scheduled_time.is_none() {
                    return Err(EngineError::invalid_request(
                        "a run-once schedule requires scheduledTime",
                    ));
                }
            }
            ScheduleType::Interval => match self.interval_minutes {
                Some(minutes) if minutes > 0 => {}
                _ => {
                    return Err(EngineError::invalid_request(
                        "an interval schedule requires intervalMinutes > 0",
                    ));
                }
            },
            ScheduleType::Weekly => {
                if self.days_of_week.is_empty() {
                    return Err(EngineError::invalid_request(
                        "a weekly schedule requires at least one day of week",
                    ));
                }
                if self.time_of_day.is_none() {
                    return Err(EngineError::invalid_request("a weekly schedule requires timeOfDay"));
                }
            }
            ScheduleType::Monthly => {
                if self.days_of_month.is_empty() {
                    return Err(EngineError::invalid_request(
                        "a monthly schedule requires at least one day of month",
                    ));
                }
                if self.time_of_day.is_none() {
                    return Err(EngineError::invalid_request("a monthly schedule requires timeOfDay"));
                }
            }
        }

        Ok(())
    }

    pub fn is_exhausted(&self) -> bool {
        match self.max_runs {
            Some(max) => self.run_count >= max,
            None => false,
        }
    }
}

/// `timeOfDay` travels as `"HH:MM"` (UTC) in YAML and JSON bodies.
mod time_of_day_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_some(&time.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(value) => NaiveTime::parse_from_str(&value, FORMAT)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid timeOfDay `{value}`, expected HH:MM"))),
        }
    }
}
