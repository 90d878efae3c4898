#[macro_use]
extern crate tracing;

pub mod cluster;
pub mod constants;
pub mod dispatch;
pub mod errors;
pub mod io_models;
pub mod logger;
pub mod metrics_registry;
pub mod monitoring;
pub mod object_storage;
pub mod orchestrator;
pub mod platform;
pub mod policy;
pub mod reporting;
pub mod repository;
pub mod scheduler;
pub mod ticker;
pub mod tracker;
pub mod unit_conversion;
