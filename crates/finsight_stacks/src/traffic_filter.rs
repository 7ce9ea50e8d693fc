//! Web ACL compiled from the security rule catalog and bound to the API stage.

use finsight_plan::{
    BuildContext, DeployUnit, PlanError, PlanResult, Resource, ResourceKind, UnitBuilder, Value,
};
use finsight_waf::{standard_rules, CompiledPolicy, FilterError, RuleAction, RuleSet, SecurityRule};
use tracing::info;

use crate::compute::COMPUTE;

pub const TRAFFIC_FILTER: &str = "traffic-filter";

const WEB_ACL_ID: &str = "ApiWebAcl";

/// Lift a rule compilation error into the plan error taxonomy.
pub fn filter_error(err: FilterError) -> PlanError {
    match err {
        FilterError::RuleConflict {
            rule_set,
            priority,
            first,
            second,
        } => PlanError::RuleConflict {
            rule_set,
            priority,
            first,
            second,
        },
        FilterError::InvalidRule { rule, reason } => PlanError::InvalidRule { rule, reason },
    }
}

pub struct TrafficFilterEngine {
    rules: Vec<SecurityRule>,
    default_action: RuleAction,
}

impl TrafficFilterEngine {
    pub fn new(rules: Vec<SecurityRule>) -> Self {
        Self {
            rules,
            default_action: RuleAction::Allow,
        }
    }

    pub fn with_default_action(mut self, action: RuleAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    /// The rule set as it applies to `environment`.
    pub fn policy(&self, environment: &str) -> PlanResult<CompiledPolicy> {
        let set = self
            .rules
            .iter()
            .cloned()
            .fold(
                RuleSet::new(format!("finsight-api-waf-{}", environment), self.default_action),
                RuleSet::with_rule,
            );
        set.compile(environment).map_err(filter_error)
    }
}

impl Default for TrafficFilterEngine {
    fn default() -> Self {
        Self::new(standard_rules())
    }
}

impl UnitBuilder for TrafficFilterEngine {
    fn name(&self) -> &str {
        TRAFFIC_FILTER
    }

    fn description(&self) -> &str {
        "Web ACL in front of the API stage"
    }

    fn depends_on(&self) -> Vec<String> {
        vec![COMPUTE.to_string()]
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let env = ctx.environment();
        let policy = self.policy(env)?;

        let mut unit = ctx
            .new_unit("SecurityStack")
            .with_description(format!("FinSight request filtering for {}", env));

        let api_id = unit.import(COMPUTE, "apiId");
        let stage_name = unit.import(COMPUTE, "apiStageName");

        unit.add(
            Resource::new(WEB_ACL_ID, ResourceKind::WebAcl)
                .prop("Name", policy.name.as_str())
                .prop("Scope", "REGIONAL")
                .prop("DefaultAction", Value::from_json(policy.default_action_waf_json()))
                .prop("Rules", Value::from_json(policy.rules_waf_json()))
                .prop(
                    "VisibilityConfig",
                    Value::map([
                        ("SampledRequestsEnabled", Value::from(true)),
                        ("CloudWatchMetricsEnabled", Value::from(true)),
                        ("MetricName", Value::from(format!("finsight-waf-{}", env))),
                    ]),
                ),
        )?;

        unit.add(
            Resource::new("WebAclAssociation", ResourceKind::WebAclAssociation)
                .prop(
                    "ResourceArn",
                    Value::join(vec![
                        Value::from(format!("arn:aws:apigateway:{}::/restapis/", ctx.region())),
                        api_id,
                        Value::from("/stages/"),
                        stage_name,
                    ]),
                )
                .prop("WebACLArn", unit.attr(WEB_ACL_ID, "Arn"))
                .depends_on(WEB_ACL_ID),
        )?;

        let web_acl_id = unit.attr(WEB_ACL_ID, "Id");
        unit.export("webAclId", web_acl_id, "Web ACL id");
        let web_acl_arn = unit.attr(WEB_ACL_ID, "Arn");
        unit.export("webAclArn", web_acl_arn, "Web ACL ARN");
        unit.export(
            "ruleOrder",
            Value::list(policy.evaluation_order()),
            "Rule names in evaluation order",
        );

        info!(
            "Web ACL {}: {} rule(s), default {}",
            policy.name,
            policy.rules.len(),
            policy.default_action
        );
        Ok(unit)
    }
}
