use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
pub enum AlertOperator {
    GreaterThan,
    LessThan,
    Equals,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum AlertSeverity {
    Information,
    Warning,
    Critical,
}

/// A `(metric, operator, threshold, dimensions, severity)` tuple that emits a
/// notification when satisfied, subject to cooldown.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub metric: String,
    pub threshold: f64,
    pub operator: AlertOperator,
    pub time_window_minutes: u32,
    pub severity: AlertSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    /// A rule matches a metric when names are equal and every dimension the
    /// rule declares is present with the same value in the emitted dimensions.
    pub fn matches(&self, metric: &str, dimensions: &BTreeMap<String, String>) -> bool {
        if !self.enabled || self.metric != metric {
            return false;
        }
        self.dimensions
            .iter()
            .all(|(key, value)| dimensions.get(key) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn rule() -> AlertRule {
        AlertRule {
            id: "high-fail-rate".to_string(),
            name: "High failure rate".to_string(),
            description: String::new(),
            metric: "TestExecution.FailRate".to_string(),
            threshold: 25.0,
            operator: AlertOperator::GreaterThan,
            time_window_minutes: 30,
            severity: AlertSeverity::Warning,
            enabled: true,
            dimensions: btreemap! {"lob".to_string() => "acme".to_string()},
        }
    }

    #[test]
    fn test_rule_dimension_matching() {
        let rule = rule();
        let emitted = btreemap! {
            "lob".to_string() => "acme".to_string(),
            "team".to_string() => "pay".to_string(),
        };
        assert!(rule.matches("TestExecution.FailRate", &emitted));
        assert!(!rule.matches("TestExecution.Duration", &emitted));

        let other_lob = btreemap! {"lob".to_string() => "globex".to_string()};
        assert!(!rule.matches("TestExecution.FailRate", &other_lob));
        assert!(!rule.matches("TestExecution.FailRate", &BTreeMap::new()));

        let mut disabled = rule.clone();
        disabled.enabled = false;
        assert!(!disabled.matches("TestExecution.FailRate", &emitted));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Information < AlertSeverity::Warning);
        assert!(AlertSeverity::Warning < AlertSeverity::Critical);
    }
}
