//! # finsight_waf
//!
//! Request filtering for the FinSight API.
//!
//! A [`RuleSet`] holds prioritized [`SecurityRule`]s, each a boolean
//! [`Statement`] tree over request facets. Compiling a rule set for an
//! environment validates every rule, rejects shared priorities and yields a
//! [`CompiledPolicy`] that evaluates requests first-match-wins.
//!
//! ## Example
//!
//! ```rust
//! use finsight_waf::{standard_rule_set, Request, RuleAction};
//!
//! let policy = standard_rule_set("finsight-api-waf-dev").compile("dev").unwrap();
//! let request = Request::new("203.0.113.9", "FR");
//! let decision = policy.evaluate(&request);
//! assert_eq!(decision.action, RuleAction::Block);
//! assert_eq!(decision.matched_rule.as_deref(), Some("GeoBlockRule"));
//! ```

pub mod catalog;
pub mod error;
pub mod heuristics;
pub mod policy;
pub mod request;
pub mod rule;
pub mod statement;
pub mod transform;

pub use catalog::{
    standard_rule_set, standard_rules, ALLOWED_COUNTRIES, BOT_SIGNATURES, MAX_BODY_BYTES,
    RATE_LIMIT, USER_AGENT_HEADER,
};
pub use error::{FilterError, FilterResult};
pub use policy::{CompiledPolicy, Decision, RuleSet};
pub use request::{FieldToMatch, Request};
pub use rule::{RuleAction, SecurityRule};
pub use statement::{PositionalConstraint, SizeComparison, Statement};
pub use transform::TextTransformation;
