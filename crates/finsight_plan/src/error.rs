//! Error types for plan compilation.

use thiserror::Error;

use finsight_profile::ProfileError;

/// Result type alias for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors raised while compiling a plan.
///
/// Every variant aborts compilation; no partial plan is ever returned.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Configuration invalid: {0}")]
    ConfigValidation(String),

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Unresolved reference in unit '{consumer}': {reference} ({reason})")]
    UnresolvedReference {
        consumer: String,
        reference: String,
        reason: String,
    },

    #[error("Rule conflict in '{rule_set}': rules '{first}' and '{second}' share priority {priority}")]
    RuleConflict {
        rule_set: String,
        priority: u32,
        first: String,
        second: String,
    },

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid alarm threshold for '{metric}': {reason}")]
    ThresholdConfig { metric: String, reason: String },

    #[error("Route conflict: {method} {path} declared by '{first}' and '{second}'")]
    RouteConflict {
        method: String,
        path: String,
        first: String,
        second: String,
    },

    #[error("Duplicate resource '{resource}' in unit '{unit}'")]
    DuplicateResource { unit: String, resource: String },

    #[error("Builder '{expected}' produced unit '{actual}'")]
    UnitMismatch { expected: String, actual: String },

    #[error("Builder not found: {0}")]
    BuilderNotFound(String),

    #[error("Apply failed at '{resource}': {reason}")]
    Apply { resource: String, reason: String },

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlanError {
    /// Shorthand for an unresolved reference.
    pub fn unresolved(
        consumer: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            consumer: consumer.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an inconsistent alarm template.
    pub fn threshold(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ThresholdConfig {
            metric: metric.into(),
            reason: reason.into(),
        }
    }
}
