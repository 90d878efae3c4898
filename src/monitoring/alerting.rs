use crate::io_models::alert::{AlertOperator, AlertRule, AlertSeverity};
use crate::policy::PolicyStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum NotificationError {
    #[error("Cannot deliver notification: {raw_error_message:?}.")]
    Transport { raw_error_message: String },
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub dimensions: BTreeMap<String, String>,
    pub emitted_at: DateTime<Utc>,
}

/// Email delivery boundary. The SendGrid-backed transport lives outside the
/// core; this default only logs.
#[async_trait::async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, recipients: &[String], notification: &Notification) -> Result<(), NotificationError>;
}

pub struct StdEmailTransport {}

impl StdEmailTransport {
    pub fn new() -> Self {
        StdEmailTransport {}
    }
}

impl Default for StdEmailTransport {
    fn default() -> Self {
        StdEmailTransport::new()
    }
}

#[async_trait::async_trait]
impl EmailTransport for StdEmailTransport {
    async fn send(&self, recipients: &[String], notification: &Notification) -> Result<(), NotificationError> {
        debug!(
            "dropping email notification `{}` for {} recipients",
            notification.title,
            recipients.len()
        );
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, notification: &Notification) -> Result<(), NotificationError>;
}

/// JSON POST per configured URL.
pub struct ReqwestWebhookTransport {
    client: reqwest::Client,
}

impl ReqwestWebhookTransport {
    pub fn new() -> Self {
        ReqwestWebhookTransport {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestWebhookTransport {
    fn default() -> Self {
        ReqwestWebhookTransport::new()
    }
}

#[async_trait::async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn post(&self, url: &str, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotificationError::Transport {
                raw_error_message: e.to_string(),
            })?;

        response.error_for_status().map_err(|e| NotificationError::Transport {
            raw_error_message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Rule evaluation with storm deduplication: one notification per
/// `(rule, dimensions)` within half the rule's time window.
pub struct AlertManager {
    policy: Arc<PolicyStore>,
    email: Arc<dyn EmailTransport>,
    webhooks: Arc<dyn WebhookTransport>,
    recent_alerts: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertManager {
    pub fn new(policy: Arc<PolicyStore>, email: Arc<dyn EmailTransport>, webhooks: Arc<dyn WebhookTransport>) -> Self {
        AlertManager {
            policy,
            email,
            webhooks,
            recent_alerts: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every enabled rule against one emitted metric. Alerting is
    /// best-effort and never surfaces an error to the emitting path.
    pub async fn evaluate_metric(&self, name: &str, value: f64, dimensions: &BTreeMap<String, String>) {
        self.evaluate_metric_at(name, value, dimensions, Utc::now()).await
    }

    async fn evaluate_metric_at(&self, name: &str, value: f64, dimensions: &BTreeMap<String, String>, now: DateTime<Utc>) {
        let admin = match self.policy.get_admin_configuration(true).await {
            Ok(admin) => admin,
            Err(err) => {
                error!("Cannot read alert rules: {err}");
                return;
            }
        };

        for rule in admin.alerts.rules.iter().filter(|rule| rule.matches(name, dimensions)) {
            let violated = match rule.operator {
                AlertOperator::GreaterThan => value > rule.threshold,
                AlertOperator::LessThan => value < rule.threshold,
                AlertOperator::Equals => (value - rule.threshold).abs() < 1e-4,
            };
            if !violated {
                continue;
            }

            if !self.should_notify(rule.id.as_str(), rule.time_window_minutes, dimensions, now) {
                debug!("Alert `{}` suppressed by cooldown", rule.name);
                continue;
            }

            let message = format!(
                "{}: metric `{name}` is {value:.4}, threshold is {} {:.4}",
                rule.description_or_name(),
                rule.operator,
                rule.threshold,
            );
            self.send_notification(&rule.name, &message, rule.severity, dimensions.clone()).await;
        }
    }

    /// Cooldown gate: records the emission instant when it returns true.
    fn should_notify(
        &self,
        rule_id: &str,
        time_window_minutes: u32,
        dimensions: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> bool {
        let key = alert_key(rule_id, dimensions);
        let cooldown = Duration::minutes(i64::from(time_window_minutes / 2));

        let mut recent = self.recent_alerts.lock().unwrap();
        recent.retain(|_, emitted_at| now - *emitted_at < Duration::hours(24));

        if let Some(emitted_at) = recent.get(&key) {
            if now - *emitted_at < cooldown {
                return false;
            }
        }
        recent.insert(key, now);
        true
    }

    pub async fn send_notification(
        &self,
        title: &str,
        message: &str,
        severity: AlertSeverity,
        dimensions: BTreeMap<String, String>,
    ) {
        let notification = Notification {
            title: title.to_string(),
            message: message.to_string(),
            severity,
            dimensions,
            emitted_at: Utc::now(),
        };

        match severity {
            AlertSeverity::Information => info!("[alert] {}: {}", title, message),
            AlertSeverity::Warning => warn!("[alert] {}: {}", title, message),
            AlertSeverity::Critical => error!("[alert] {}: {}", title, message),
        }

        let settings = match self.policy.get_admin_configuration(true).await {
            Ok(admin) => admin.alerts.notifications,
            Err(err) => {
                error!("Cannot read notification settings: {err}");
                return;
            }
        };

        if settings.email_enabled && severity >= settings.email_min_severity {
            if let Err(err) = self.email.send(&settings.email_recipients, &notification).await {
                error!("Cannot send alert email: {err}");
            }
        }

        if settings.webhook_enabled {
            for url in &settings.webhook_urls {
                if let Err(err) = self.webhooks.post(url, &notification).await {
                    error!("Cannot post alert webhook to {url}: {err}");
                }
            }
        }
    }

    /// Manual end-to-end check of the notification path (admin surface and
    /// the daily ticker).
    pub async fn send_test_notification(
        &self,
        title: Option<&str>,
        message: Option<&str>,
        severity: Option<AlertSeverity>,
    ) {
        self.send_notification(
            title.unwrap_or("Test notification"),
            message.unwrap_or("This is a test notification from the test execution platform"),
            severity.unwrap_or(AlertSeverity::Information),
            BTreeMap::new(),
        )
        .await
    }
}

fn alert_key(rule_id: &str, dimensions: &BTreeMap<String, String>) -> String {
    let mut key = rule_id.to_string();
    for (name, value) in dimensions {
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

trait RuleText {
    fn description_or_name(&self) -> &str;
}

impl RuleText for AlertRule {
    fn description_or_name(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_models::alert::{AlertOperator, AlertRule};
    use crate::io_models::config::AdminConfiguration;
    use crate::repository::in_memory::InMemoryRepository;
    use maplit::btreemap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWebhook {
        posts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl WebhookTransport for CountingWebhook {
        async fn post(&self, _url: &str, _notification: &Notification) -> Result<(), NotificationError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn manager_with_rule(rule: AlertRule) -> (AlertManager, Arc<CountingWebhook>) {
        let policy = Arc::new(PolicyStore::new(Arc::new(InMemoryRepository::new())));
        let mut admin = AdminConfiguration::default();
        admin.alerts.rules = vec![rule];
        admin.alerts.notifications.webhook_enabled = true;
        admin.alerts.notifications.webhook_urls = vec!["https://hooks.example.com/alerts".to_string()];
        policy.save_admin_configuration(&admin).await.unwrap();

        let webhook = Arc::new(CountingWebhook {
            posts: AtomicUsize::new(0),
        });
        let manager = AlertManager::new(policy, Arc::new(StdEmailTransport::new()), webhook.clone());
        (manager, webhook)
    }

    fn rule(operator: AlertOperator, threshold: f64) -> AlertRule {
        AlertRule {
            id: "r1".to_string(),
            name: "rule".to_string(),
            description: String::new(),
            metric: "TestExecution.FailRate".to_string(),
            threshold,
            operator,
            time_window_minutes: 30,
            severity: AlertSeverity::Warning,
            enabled: true,
            dimensions: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_operator_evaluation() {
        let (manager, webhook) = manager_with_rule(rule(AlertOperator::GreaterThan, 25.0)).await;
        let dimensions = btreemap! {"lob".to_string() => "acme".to_string()};

        manager.evaluate_metric("TestExecution.FailRate", 10.0, &dimensions).await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 0);

        manager.evaluate_metric("TestExecution.FailRate", 50.0, &dimensions).await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 1);

        // equality uses an epsilon
        let (manager, webhook) = manager_with_rule(rule(AlertOperator::Equals, 100.0)).await;
        manager.evaluate_metric("TestExecution.FailRate", 100.00001, &dimensions).await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_alert_storms() {
        let (manager, webhook) = manager_with_rule(rule(AlertOperator::GreaterThan, 25.0)).await;
        let dimensions = btreemap! {"lob".to_string() => "acme".to_string()};
        let now = Utc::now();

        manager
            .evaluate_metric_at("TestExecution.FailRate", 50.0, &dimensions, now)
            .await;
        // within window/2 = 15 minutes: suppressed
        manager
            .evaluate_metric_at("TestExecution.FailRate", 60.0, &dimensions, now + Duration::minutes(10))
            .await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 1);

        // past the cooldown: fires again
        manager
            .evaluate_metric_at("TestExecution.FailRate", 60.0, &dimensions, now + Duration::minutes(16))
            .await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 2);

        // different dimensions are a different alert key
        let other = btreemap! {"lob".to_string() => "globex".to_string()};
        manager
            .evaluate_metric_at("TestExecution.FailRate", 60.0, &other, now + Duration::minutes(17))
            .await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_disabled_rule_never_fires() {
        let mut disabled = rule(AlertOperator::GreaterThan, 25.0);
        disabled.enabled = false;
        let (manager, webhook) = manager_with_rule(disabled).await;

        manager
            .evaluate_metric("TestExecution.FailRate", 90.0, &BTreeMap::new())
            .await;
        assert_eq!(webhook.posts.load(Ordering::SeqCst), 0);
    }
}
