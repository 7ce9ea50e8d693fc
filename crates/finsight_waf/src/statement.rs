//! Matcher expression trees.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{FilterError, FilterResult};
use crate::heuristics::{looks_like_sqli, looks_like_xss};
use crate::request::{FieldToMatch, Request};
use crate::transform::{apply_all, TextTransformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionalConstraint {
    Exactly,
    StartsWith,
    EndsWith,
    Contains,
    ContainsWord,
}

impl PositionalConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionalConstraint::Exactly => "EXACTLY",
            PositionalConstraint::StartsWith => "STARTS_WITH",
            PositionalConstraint::EndsWith => "ENDS_WITH",
            PositionalConstraint::Contains => "CONTAINS",
            PositionalConstraint::ContainsWord => "CONTAINS_WORD",
        }
    }

    fn holds(&self, text: &str, search: &str) -> bool {
        match self {
            PositionalConstraint::Exactly => text == search,
            PositionalConstraint::StartsWith => text.starts_with(search),
            PositionalConstraint::EndsWith => text.ends_with(search),
            PositionalConstraint::Contains => text.contains(search),
            PositionalConstraint::ContainsWord => text
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .any(|word| word == search),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizeComparison {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
}

impl SizeComparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeComparison::Eq => "EQ",
            SizeComparison::Ne => "NE",
            SizeComparison::Le => "LE",
            SizeComparison::Lt => "LT",
            SizeComparison::Ge => "GE",
            SizeComparison::Gt => "GT",
        }
    }

    fn holds(&self, actual: u64, size: u64) -> bool {
        match self {
            SizeComparison::Eq => actual == size,
            SizeComparison::Ne => actual != size,
            SizeComparison::Le => actual <= size,
            SizeComparison::Lt => actual < size,
            SizeComparison::Ge => actual >= size,
            SizeComparison::Gt => actual > size,
        }
    }
}

/// Boolean expression over request facets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    And {
        statements: Vec<Statement>,
    },
    Or {
        statements: Vec<Statement>,
    },
    Not {
        statement: Box<Statement>,
    },
    GeoMatch {
        country_codes: Vec<String>,
    },
    /// Requests per client address in the rate window
    RateBased {
        limit: u64,
    },
    SqliMatch {
        field: FieldToMatch,
        #[serde(default)]
        transformations: Vec<TextTransformation>,
    },
    XssMatch {
        field: FieldToMatch,
        #[serde(default)]
        transformations: Vec<TextTransformation>,
    },
    ByteMatch {
        field: FieldToMatch,
        search_string: String,
        positional_constraint: PositionalConstraint,
        #[serde(default)]
        transformations: Vec<TextTransformation>,
    },
    SizeConstraint {
        field: FieldToMatch,
        comparison: SizeComparison,
        size: u64,
        #[serde(default)]
        transformations: Vec<TextTransformation>,
    },
}

impl Statement {
    pub fn and(statements: Vec<Statement>) -> Self {
        Statement::And { statements }
    }

    pub fn or(statements: Vec<Statement>) -> Self {
        Statement::Or { statements }
    }

    pub fn not(statement: Statement) -> Self {
        Statement::Not {
            statement: Box::new(statement),
        }
    }

    pub fn geo_match<S: Into<String>>(countries: impl IntoIterator<Item = S>) -> Self {
        Statement::GeoMatch {
            country_codes: countries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rate_based(limit: u64) -> Self {
        Statement::RateBased { limit }
    }

    pub fn sqli(field: FieldToMatch, transformations: Vec<TextTransformation>) -> Self {
        Statement::SqliMatch {
            field,
            transformations,
        }
    }

    pub fn xss(field: FieldToMatch, transformations: Vec<TextTransformation>) -> Self {
        Statement::XssMatch {
            field,
            transformations,
        }
    }

    pub fn byte_match(
        field: FieldToMatch,
        search_string: impl Into<String>,
        positional_constraint: PositionalConstraint,
        transformations: Vec<TextTransformation>,
    ) -> Self {
        Statement::ByteMatch {
            field,
            search_string: search_string.into(),
            positional_constraint,
            transformations,
        }
    }

    pub fn size_constraint(
        field: FieldToMatch,
        comparison: SizeComparison,
        size: u64,
        transformations: Vec<TextTransformation>,
    ) -> Self {
        Statement::SizeConstraint {
            field,
            comparison,
            size,
            transformations,
        }
    }

    /// Evaluate against a request.
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Statement::And { statements } => statements.iter().all(|s| s.matches(request)),
            Statement::Or { statements } => statements.iter().any(|s| s.matches(request)),
            Statement::Not { statement } => !statement.matches(request),
            Statement::GeoMatch { country_codes } => country_codes
                .iter()
                .any(|code| code.eq_ignore_ascii_case(&request.country)),
            Statement::RateBased { limit } => request.recent_requests > *limit,
            Statement::SqliMatch {
                field,
                transformations,
            } => transformed(request, field, transformations)
                .map_or(false, |text| looks_like_sqli(&text)),
            Statement::XssMatch {
                field,
                transformations,
            } => transformed(request, field, transformations)
                .map_or(false, |text| looks_like_xss(&text)),
            Statement::ByteMatch {
                field,
                search_string,
                positional_constraint,
                transformations,
            } => transformed(request, field, transformations)
                .map_or(false, |text| positional_constraint.holds(&text, search_string)),
            Statement::SizeConstraint {
                field,
                comparison,
                size,
                transformations,
            } => transformed(request, field, transformations)
                .map_or(false, |text| comparison.holds(text.len() as u64, *size)),
        }
    }

    /// Reject statements that can never be evaluated meaningfully.
    pub fn validate(&self, rule: &str) -> FilterResult<()> {
        match self {
            Statement::And { statements } | Statement::Or { statements } => {
                if statements.is_empty() {
                    return Err(FilterError::invalid(rule, "AND/OR statement has no operands"));
                }
                statements.iter().try_for_each(|s| s.validate(rule))
            }
            Statement::Not { statement } => statement.validate(rule),
            Statement::GeoMatch { country_codes } => {
                if country_codes.is_empty() {
                    return Err(FilterError::invalid(rule, "geo match has no country codes"));
                }
                Ok(())
            }
            Statement::RateBased { limit } => {
                if *limit == 0 {
                    return Err(FilterError::invalid(rule, "rate limit must be greater than zero"));
                }
                Ok(())
            }
            Statement::ByteMatch { search_string, .. } => {
                if search_string.is_empty() {
                    return Err(FilterError::invalid(rule, "byte match search string is empty"));
                }
                Ok(())
            }
            Statement::SqliMatch { .. }
            | Statement::XssMatch { .. }
            | Statement::SizeConstraint { .. } => Ok(()),
        }
    }

    /// Provider rendering of the statement.
    pub fn to_waf_json(&self) -> serde_json::Value {
        match self {
            Statement::And { statements } => json!({
                "AndStatement": {
                    "Statements": statements.iter().map(Statement::to_waf_json).collect::<Vec<_>>()
                }
            }),
            Statement::Or { statements } => json!({
                "OrStatement": {
                    "Statements": statements.iter().map(Statement::to_waf_json).collect::<Vec<_>>()
                }
            }),
            Statement::Not { statement } => json!({
                "NotStatement": { "Statement": statement.to_waf_json() }
            }),
            Statement::GeoMatch { country_codes } => json!({
                "GeoMatchStatement": { "CountryCodes": country_codes }
            }),
            Statement::RateBased { limit } => json!({
                "RateBasedStatement": { "Limit": limit, "AggregateKeyType": "IP" }
            }),
            Statement::SqliMatch {
                field,
                transformations,
            } => json!({
                "SqliMatchStatement": {
                    "FieldToMatch": field_json(field),
                    "TextTransformations": transformations_json(transformations)
                }
            }),
            Statement::XssMatch {
                field,
                transformations,
            } => json!({
                "XssMatchStatement": {
                    "FieldToMatch": field_json(field),
                    "TextTransformations": transformations_json(transformations)
                }
            }),
            Statement::ByteMatch {
                field,
                search_string,
                positional_constraint,
                transformations,
            } => json!({
                "ByteMatchStatement": {
                    "SearchString": search_string,
                    "FieldToMatch": field_json(field),
                    "TextTransformations": transformations_json(transformations),
                    "PositionalConstraint": positional_constraint.as_str()
                }
            }),
            Statement::SizeConstraint {
                field,
                comparison,
                size,
                transformations,
            } => json!({
                "SizeConstraintStatement": {
                    "FieldToMatch": field_json(field),
                    "ComparisonOperator": comparison.as_str(),
                    "Size": size,
                    "TextTransformations": transformations_json(transformations)
                }
            }),
        }
    }
}

fn transformed(
    request: &Request,
    field: &FieldToMatch,
    transformations: &[TextTransformation],
) -> Option<String> {
    request
        .field(field)
        .map(|raw| apply_all(transformations, raw))
}

fn field_json(field: &FieldToMatch) -> serde_json::Value {
    match field {
        FieldToMatch::Body => json!({ "Body": {} }),
        FieldToMatch::QueryString => json!({ "QueryString": {} }),
        FieldToMatch::SingleHeader(name) => json!({ "SingleHeader": { "Name": name } }),
    }
}

fn transformations_json(transformations: &[TextTransformation]) -> serde_json::Value {
    if transformations.is_empty() {
        return json!([{ "Priority": 0, "Type": TextTransformation::None.as_str() }]);
    }
    transformations
        .iter()
        .enumerate()
        .map(|(priority, t)| json!({ "Priority": priority, "Type": t.as_str() }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use TextTransformation::{HtmlEntityDecode, Lowercase, UrlDecode};

    fn user_agent(agent: &str) -> Request {
        Request::new("198.51.100.1", "JP").with_header("User-Agent", agent)
    }

    #[test]
    fn test_byte_match_with_lowercase() {
        let statement = Statement::byte_match(
            FieldToMatch::SingleHeader("user-agent".into()),
            "bot",
            PositionalConstraint::Contains,
            vec![Lowercase],
        );
        assert!(statement.matches(&user_agent("Mozilla/5.0 (compatible; GoogleBot/2.1)")));
        assert!(!statement.matches(&user_agent("Mozilla/5.0 (Macintosh)")));
        assert!(!statement.matches(&Request::new("198.51.100.1", "JP")));
    }

    #[test]
    fn test_positional_constraints() {
        assert!(PositionalConstraint::Exactly.holds("abc", "abc"));
        assert!(PositionalConstraint::StartsWith.holds("abc", "ab"));
        assert!(PositionalConstraint::EndsWith.holds("abc", "bc"));
        assert!(PositionalConstraint::ContainsWord.holds("a bot here", "bot"));
        assert!(!PositionalConstraint::ContainsWord.holds("robots", "bot"));
    }

    #[test]
    fn test_sqli_uses_transformations() {
        let statement = Statement::sqli(FieldToMatch::QueryString, vec![UrlDecode, HtmlEntityDecode]);
        let request = Request::new("198.51.100.1", "US").with_query("id=1%20UNION%20SELECT%20pw");
        assert!(statement.matches(&request));

        let raw = Statement::sqli(FieldToMatch::QueryString, Vec::new());
        assert!(!raw.matches(&request));
    }

    #[test]
    fn test_not_geo_match() {
        let statement = Statement::not(Statement::geo_match(["JP", "US"]));
        assert!(!statement.matches(&Request::new("1.1.1.1", "jp")));
        assert!(statement.matches(&Request::new("1.1.1.1", "FR")));
    }

    #[test]
    fn test_size_constraint_counts_bytes() {
        let statement = Statement::size_constraint(FieldToMatch::Body, SizeComparison::Gt, 4, Vec::new());
        assert!(statement.matches(&Request::default().with_body("12345")));
        assert!(!statement.matches(&Request::default().with_body("1234")));
    }

    #[test]
    fn test_validate_rejects_degenerate_statements() {
        assert!(Statement::or(Vec::new()).validate("r").is_err());
        assert!(Statement::not(Statement::and(Vec::new())).validate("r").is_err());
        assert!(Statement::rate_based(0).validate("r").is_err());
        assert!(Statement::byte_match(FieldToMatch::Body, "", PositionalConstraint::Contains, Vec::new())
            .validate("r")
            .is_err());
        assert!(Statement::rate_based(10).validate("r").is_ok());
    }

    #[test]
    fn test_waf_rendering() {
        let statement = Statement::or(vec![
            Statement::xss(FieldToMatch::Body, vec![UrlDecode, HtmlEntityDecode]),
            Statement::xss(FieldToMatch::QueryString, vec![UrlDecode, HtmlEntityDecode]),
        ]);
        let json = statement.to_waf_json();
        let first = &json["OrStatement"]["Statements"][0]["XssMatchStatement"];
        assert_eq!(first["FieldToMatch"], json!({ "Body": {} }));
        assert_eq!(first["TextTransformations"][1]["Type"], "HTML_ENTITY_DECODE");
        assert_eq!(first["TextTransformations"][1]["Priority"], 1);
    }

    #[test]
    fn test_serde_snake_case() {
        let statement = Statement::not(Statement::geo_match(["JP"]));
        let json = serde_json::to_value(&statement).unwrap();
        assert_eq!(json, json!({ "not": { "statement": { "geo_match": { "country_codes": ["JP"] } } } }));
    }
}
