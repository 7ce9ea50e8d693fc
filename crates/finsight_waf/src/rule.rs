//! Security rules.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{FilterError, FilterResult};
use crate::statement::Statement;

/// Action taken when a rule matches, or when none does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
}

impl RuleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Allow => "allow",
            RuleAction::Block => "block",
        }
    }

    pub fn to_waf_json(&self) -> serde_json::Value {
        match self {
            RuleAction::Allow => json!({ "Allow": {} }),
            RuleAction::Block => json!({ "Block": {} }),
        }
    }
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A prioritized matcher with an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub name: String,
    /// Lower runs first; unique within a rule set
    pub priority: u32,
    pub statement: Statement,
    pub action: RuleAction,
    pub metric_name: String,
    /// Environments the rule applies to; all when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<String>>,
}

impl SecurityRule {
    /// A blocking rule whose metric is named after the rule.
    pub fn block(name: impl Into<String>, priority: u32, statement: Statement) -> Self {
        let name = name.into();
        Self {
            metric_name: name.clone(),
            name,
            priority,
            statement,
            action: RuleAction::Block,
            environments: None,
        }
    }

    pub fn with_action(mut self, action: RuleAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = metric_name.into();
        self
    }

    pub fn only_in<S: Into<String>>(mut self, environments: impl IntoIterator<Item = S>) -> Self {
        self.environments = Some(environments.into_iter().map(Into::into).collect());
        self
    }

    pub fn applies_to(&self, environment: &str) -> bool {
        self.environments
            .as_ref()
            .map_or(true, |envs| envs.iter().any(|e| e == environment))
    }

    pub fn validate(&self) -> FilterResult<()> {
        if self.name.trim().is_empty() {
            return Err(FilterError::invalid("<unnamed>", "rule name cannot be empty"));
        }
        if self.metric_name.trim().is_empty() {
            return Err(FilterError::invalid(&self.name, "metric name cannot be empty"));
        }
        if let Some(envs) = &self.environments {
            if envs.is_empty() {
                return Err(FilterError::invalid(
                    &self.name,
                    "environment predicate lists no environments",
                ));
            }
        }
        self.statement.validate(&self.name)
    }

    /// Provider rendering of the rule.
    pub fn to_waf_json(&self) -> serde_json::Value {
        json!({
            "Name": self.name,
            "Priority": self.priority,
            "Statement": self.statement.to_waf_json(),
            "Action": self.action.to_waf_json(),
            "VisibilityConfig": {
                "SampledRequestsEnabled": true,
                "CloudWatchMetricsEnabled": true,
                "MetricName": self.metric_name
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_predicate() {
        let rule = SecurityRule::block("GeoBlockRule", 2, Statement::geo_match(["JP"]));
        assert!(rule.applies_to("dev"));

        let scoped = rule.only_in(["prod"]);
        assert!(scoped.applies_to("prod"));
        assert!(!scoped.applies_to("dev"));
    }

    #[test]
    fn test_validate_empty_predicate() {
        let rule = SecurityRule::block("R", 1, Statement::rate_based(100)).only_in(Vec::<String>::new());
        assert!(matches!(rule.validate(), Err(FilterError::InvalidRule { .. })));
    }

    #[test]
    fn test_waf_rendering() {
        let rule = SecurityRule::block("RateLimitRule", 1, Statement::rate_based(2000));
        let json = rule.to_waf_json();
        assert_eq!(json["Priority"], 1);
        assert_eq!(json["Action"], json!({ "Block": {} }));
        assert_eq!(json["VisibilityConfig"]["MetricName"], "RateLimitRule");
        assert_eq!(json["Statement"]["RateBasedStatement"]["Limit"], 2000);
    }
}
