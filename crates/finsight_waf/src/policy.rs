//! Rule sets and compiled first-match policies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FilterError, FilterResult};
use crate::request::Request;
use crate::rule::{RuleAction, SecurityRule};

/// An unordered collection of rules plus the default action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub name: String,
    pub default_action: RuleAction,
    #[serde(default)]
    pub rules: Vec<SecurityRule>,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, default_action: RuleAction) -> Self {
        Self {
            name: name.into(),
            default_action,
            rules: Vec::new(),
        }
    }

    pub fn add(&mut self, rule: SecurityRule) {
        self.rules.push(rule);
    }

    pub fn with_rule(mut self, rule: SecurityRule) -> Self {
        self.add(rule);
        self
    }

    /// Validate every rule and order them for `environment`.
    ///
    /// Priorities are checked across the whole set, including rules the
    /// environment predicate later drops, so a set compiles the same way in
    /// every environment or not at all.
    pub fn compile(&self, environment: &str) -> FilterResult<CompiledPolicy> {
        let mut by_priority: BTreeMap<u32, &SecurityRule> = BTreeMap::new();

        for rule in &self.rules {
            rule.validate()?;
            if let Some(existing) = by_priority.insert(rule.priority, rule) {
                return Err(FilterError::RuleConflict {
                    rule_set: self.name.clone(),
                    priority: rule.priority,
                    first: existing.name.clone(),
                    second: rule.name.clone(),
                });
            }
        }

        let rules: Vec<SecurityRule> = by_priority
            .into_values()
            .filter(|rule| {
                let applies = rule.applies_to(environment);
                if !applies {
                    debug!("Rule {} skipped for environment {}", rule.name, environment);
                }
                applies
            })
            .cloned()
            .collect();

        Ok(CompiledPolicy {
            name: self.name.clone(),
            default_action: self.default_action,
            rules,
        })
    }
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: RuleAction,
    /// Name of the matching rule; `None` when the default action applied
    pub matched_rule: Option<String>,
}

/// Rules in strictly ascending priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledPolicy {
    pub name: String,
    pub default_action: RuleAction,
    pub rules: Vec<SecurityRule>,
}

impl CompiledPolicy {
    /// First matching rule wins; otherwise the default action.
    pub fn evaluate(&self, request: &Request) -> Decision {
        self.rules
            .iter()
            .find(|rule| rule.statement.matches(request))
            .map(|rule| Decision {
                action: rule.action,
                matched_rule: Some(rule.name.clone()),
            })
            .unwrap_or(Decision {
                action: self.default_action,
                matched_rule: None,
            })
    }

    pub fn evaluation_order(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Provider rendering of the rule list.
    pub fn rules_waf_json(&self) -> serde_json::Value {
        self.rules.iter().map(SecurityRule::to_waf_json).collect()
    }

    pub fn default_action_waf_json(&self) -> serde_json::Value {
        self.default_action.to_waf_json()
    }
}
