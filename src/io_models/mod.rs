pub mod alert;
pub mod config;
pub mod context;
pub mod job;
pub mod message;
pub mod schedule;

use chrono::{DateTime, Utc};

pub(crate) fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}
