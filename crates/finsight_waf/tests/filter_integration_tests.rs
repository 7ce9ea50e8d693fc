//! Integration tests for rule compilation and evaluation.

use finsight_waf::{
    standard_rule_set, standard_rules, FieldToMatch, FilterError, PositionalConstraint, Request,
    RuleAction, RuleSet, SecurityRule, Statement, MAX_BODY_BYTES, RATE_LIMIT,
};

fn policy() -> finsight_waf::CompiledPolicy {
    standard_rule_set("finsight-api-waf-prod").compile("prod").unwrap()
}

fn friendly() -> Request {
    Request::new("203.0.113.10", "JP")
        .with_header("User-Agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0)")
        .with_query("month=2024-05")
        .with_body(r#"{"amount": 4200, "memo": "lunch"}"#)
}

#[test]
fn test_clean_request_gets_default_action() {
    let decision = policy().evaluate(&friendly());
    assert_eq!(decision.action, RuleAction::Allow);
    assert_eq!(decision.matched_rule, None);
}

#[test]
fn test_each_catalog_rule_fires() {
    let policy = policy();
    let cases = vec![
        ("RateLimitRule", friendly().with_recent_requests(RATE_LIMIT + 1)),
        ("GeoBlockRule", Request { country: "DE".into(), ..friendly() }),
        ("SQLInjectionRule", friendly().with_query("id=1%27%20OR%20%271%27%3D%271")),
        ("XSSRule", friendly().with_body("%3Cscript%3Ealert(1)%3C%2Fscript%3E")),
        ("LargeBodyRule", friendly().with_body("x".repeat(MAX_BODY_BYTES as usize + 1))),
        ("BadBotRule", friendly().with_header("user-agent", "AhrefsBot/7.0")),
        ("BadBotRule", friendly().with_header("user-agent", "Site CRAWLER 1.1")),
    ];

    for (expected, request) in cases {
        let decision = policy.evaluate(&request);
        assert_eq!(decision.action, RuleAction::Block, "{}", expected);
        assert_eq!(decision.matched_rule.as_deref(), Some(expected));
    }
}

#[test]
fn test_lowest_priority_match_wins() {
    // Rate limited, foreign and a bot: the rate rule has the lowest priority
    let request = Request::new("192.0.2.1", "BR")
        .with_header("user-agent", "crawler")
        .with_recent_requests(RATE_LIMIT * 2);
    let decision = policy().evaluate(&request);
    assert_eq!(decision.matched_rule.as_deref(), Some("RateLimitRule"));

    let below_limit = Request {
        recent_requests: RATE_LIMIT,
        ..request
    };
    assert_eq!(
        policy().evaluate(&below_limit).matched_rule.as_deref(),
        Some("GeoBlockRule")
    );
}

#[test]
fn test_body_at_limit_passes() {
    let request = friendly().with_body("x".repeat(MAX_BODY_BYTES as usize));
    assert_eq!(policy().evaluate(&request).action, RuleAction::Allow);
}

#[test]
fn test_shared_priority_is_rejected() {
    let mut set = standard_rule_set("acl");
    set.add(SecurityRule::block("Duplicate", 1, Statement::geo_match(["KP"])));

    match set.compile("prod") {
        Err(FilterError::RuleConflict { priority, first, second, .. }) => {
            assert_eq!(priority, 1);
            assert_eq!(first, "RateLimitRule");
            assert_eq!(second, "Duplicate");
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

#[test]
fn test_invalid_rules_are_rejected() {
    let invalid = vec![
        SecurityRule::block("EmptyOr", 10, Statement::or(Vec::new())),
        SecurityRule::block("ZeroRate", 11, Statement::rate_based(0)),
        SecurityRule::block(
            "EmptySearch",
            12,
            Statement::byte_match(FieldToMatch::Body, "", PositionalConstraint::Contains, Vec::new()),
        ),
    ];

    for rule in invalid {
        let name = rule.name.clone();
        let set = RuleSet::new("acl", RuleAction::Allow).with_rule(rule);
        match set.compile("dev") {
            Err(FilterError::InvalidRule { rule, .. }) => assert_eq!(rule, name),
            other => panic!("expected invalid rule for {}, got {:?}", name, other),
        }
    }
}

#[test]
fn test_catalog_is_environment_independent() {
    let dev = standard_rule_set("acl").compile("dev").unwrap();
    let prod = standard_rule_set("acl").compile("prod").unwrap();
    assert_eq!(dev.rules, prod.rules);
    assert_eq!(standard_rules().len(), 6);
}

#[test]
fn test_rule_set_from_json() {
    let json = r#"{
        "name": "custom",
        "defaultAction": "block",
        "rules": [
            {
                "name": "AllowHealth",
                "priority": 1,
                "action": "allow",
                "metricName": "AllowHealth",
                "statement": {
                    "byte_match": {
                        "field": "query_string",
                        "search_string": "health",
                        "positional_constraint": "CONTAINS",
                        "transformations": ["LOWERCASE"]
                    }
                }
            },
            {
                "name": "OnlyProd",
                "priority": 2,
                "action": "block",
                "metricName": "OnlyProd",
                "environments": ["prod"],
                "statement": {"not": {"statement": {"geo_match": {"country_codes": ["JP"]}}}}
            }
        ]
    }"#;
    let set: RuleSet = serde_json::from_str(json).unwrap();
    let policy = set.compile("dev").unwrap();
    assert_eq!(policy.evaluation_order(), vec!["AllowHealth"]);

    let health = Request::new("192.0.2.1", "US").with_query("check=HEALTH");
    assert_eq!(policy.evaluate(&health).action, RuleAction::Allow);

    let other = Request::new("192.0.2.1", "US").with_query("x=1");
    assert_eq!(policy.evaluate(&other).action, RuleAction::Block);
}

#[test]
fn test_bot_rule_fires_for_json_request() {
    let request: Request = serde_json::from_str(
        r#"{"headers": {"User-Agent": "AhrefsBot/7.0"}, "clientIp": "203.0.113.10", "country": "JP"}"#,
    )
    .unwrap();
    let decision = policy().evaluate(&request);
    assert_eq!(decision.action, RuleAction::Block);
    assert_eq!(decision.matched_rule.as_deref(), Some("BadBotRule"));
}
