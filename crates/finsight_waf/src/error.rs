//! Error types for rule compilation.

use thiserror::Error;

/// Result type alias for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Rule conflict in '{rule_set}': rules '{first}' and '{second}' share priority {priority}")]
    RuleConflict {
        rule_set: String,
        priority: u32,
        first: String,
        second: String,
    },

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },
}

impl FilterError {
    pub fn invalid(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }
}
