use crate::constants::{DEFAULT_LOB_NAMESPACE_PREFIX, DEFAULT_SYSTEM_NAMESPACE};
use crate::io_models::alert::{AlertRule, AlertSeverity};
use crate::io_models::default_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// The singleton policy document bounding all tenant behavior. Persisted as a
/// YAML blob; identity and timestamps live on the configuration row and are
/// re-applied after deserialization.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfiguration {
    #[serde(skip, default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(skip)]
    pub name: String,
    #[serde(skip, default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(skip, default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub resource_management: ResourceManagement,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub rate_limits: RateLimits,
    #[serde(default)]
    pub alerts: AlertSettings,
}

impl Default for AdminConfiguration {
    fn default() -> Self {
        AdminConfiguration {
            id: Uuid::new_v4(),
            name: "default".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resource_management: ResourceManagement::default(),
            retention: RetentionPolicy::default(),
            cluster: ClusterSettings::default(),
            rate_limits: RateLimits::default(),
            alerts: AlertSettings::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceManagement {
    pub max_concurrent_jobs_per_lob: u32,
    pub max_concurrent_jobs_per_team: u32,
    pub default_job_timeout_minutes: u32,
    pub default_container_limits: ContainerLimits,
    pub auto_cleanup_jobs: bool,
    pub cleanup_after_hours: u32,
}

impl Default for ResourceManagement {
    fn default() -> Self {
        ResourceManagement {
            max_concurrent_jobs_per_lob: 10,
            max_concurrent_jobs_per_team: 5,
            default_job_timeout_minutes: 30,
            default_container_limits: ContainerLimits::default(),
            auto_cleanup_jobs: true,
            cleanup_after_hours: 24,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerLimits {
    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        ContainerLimits {
            cpu_limit: "1".to_string(),
            memory_limit: "2Gi".to_string(),
            cpu_request: "500m".to_string(),
            memory_request: "512Mi".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub test_results_retention_days: u32,
    pub job_history_retention_days: u32,
    pub max_test_result_file_size_mb: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            test_results_retention_days: 30,
            job_history_retention_days: 90,
            max_test_result_file_size_mb: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSettings {
    pub system_namespace: String,
    pub lob_namespace_prefix: String,
    #[serde(default)]
    pub node_pools: Vec<String>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        ClusterSettings {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            lob_namespace_prefix: DEFAULT_LOB_NAMESPACE_PREFIX.to_string(),
            node_pools: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertSettings {
    #[serde(default)]
    pub rules: Vec<AlertRule>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub email_enabled: bool,
    #[serde(default)]
    pub email_recipients: Vec<String>,
    pub email_min_severity: AlertSeverity,
    pub webhook_enabled: bool,
    #[serde(default)]
    pub webhook_urls: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            email_enabled: false,
            email_recipients: vec![],
            email_min_severity: AlertSeverity::Warning,
            webhook_enabled: false,
            webhook_urls: vec![],
        }
    }
}

/// Per-user job-shape overrides, scoped by `(lob_id, team_id, user_id)`.
/// Identity fields are server-assigned; a YAML body cannot forge them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserConfiguration {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub lob_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    #[serde(default)]
    pub schedule: Option<UserScheduleStub>,
}

/// Minimal schedule stub a user configuration may carry; the full schedule
/// object lives in [`crate::io_models::schedule::TestJobSchedule`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserScheduleStub {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}
