//! The standard API rule catalog.

use crate::request::FieldToMatch;
use crate::rule::{RuleAction, SecurityRule};
use crate::policy::RuleSet;
use crate::statement::{PositionalConstraint, SizeComparison, Statement};
use crate::transform::TextTransformation;

/// Requests per client address per five-minute window.
pub const RATE_LIMIT: u64 = 2000;

/// Countries allowed to reach the API.
pub const ALLOWED_COUNTRIES: &[&str] = &["JP", "US"];

/// Largest accepted request body in bytes.
pub const MAX_BODY_BYTES: u64 = 8192;

/// Lowercase user-agent fragments of unwanted clients.
pub const BOT_SIGNATURES: &[&str] = &["bot", "crawler"];

pub const USER_AGENT_HEADER: &str = "user-agent";

fn decode_chain() -> Vec<TextTransformation> {
    vec![TextTransformation::UrlDecode, TextTransformation::HtmlEntityDecode]
}

/// Catalog rules in priority order.
pub fn standard_rules() -> Vec<SecurityRule> {
    vec![
        SecurityRule::block("RateLimitRule", 1, Statement::rate_based(RATE_LIMIT)),
        SecurityRule::block(
            "GeoBlockRule",
            2,
            Statement::not(Statement::geo_match(ALLOWED_COUNTRIES.iter().copied())),
        ),
        SecurityRule::block(
            "SQLInjectionRule",
            3,
            Statement::or(vec![
                Statement::sqli(FieldToMatch::Body, decode_chain()),
                Statement::sqli(FieldToMatch::QueryString, decode_chain()),
            ]),
        ),
        SecurityRule::block(
            "XSSRule",
            4,
            Statement::or(vec![
                Statement::xss(FieldToMatch::Body, decode_chain()),
                Statement::xss(FieldToMatch::QueryString, decode_chain()),
            ]),
        ),
        SecurityRule::block(
            "LargeBodyRule",
            5,
            Statement::size_constraint(
                FieldToMatch::Body,
                SizeComparison::Gt,
                MAX_BODY_BYTES,
                vec![TextTransformation::None],
            ),
        ),
        SecurityRule::block(
            "BadBotRule",
            6,
            Statement::or(
                BOT_SIGNATURES
                    .iter()
                    .map(|signature| {
                        Statement::byte_match(
                            FieldToMatch::SingleHeader(USER_AGENT_HEADER.to_string()),
                            *signature,
                            PositionalConstraint::Contains,
                            vec![TextTransformation::Lowercase],
                        )
                    })
                    .collect(),
            ),
        ),
    ]
}

/// The catalog as a rule set that allows unmatched requests.
pub fn standard_rule_set(name: impl Into<String>) -> RuleSet {
    standard_rules()
        .into_iter()
        .fold(RuleSet::new(name, RuleAction::Allow), RuleSet::with_rule)
}
