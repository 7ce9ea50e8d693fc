//! Threshold alarms, the alert topic and the operations dashboard.
//!
//! Thresholds live in one [`TemplateCatalog`]. Every alarm is an instance of
//! a template applied to one resource: each fleet function, the REST API and
//! the database instance. Templates without an [`AlarmRule`] only feed the
//! dashboard.

use std::collections::BTreeMap;

use finsight_plan::{
    BuildContext, DeployUnit, PlanError, PlanResult, Resource, ResourceKind, UnitBuilder, Value,
};
use finsight_profile::ThresholdOverride;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compute::COMPUTE;
use crate::datastore::DATASTORE;

pub const ALERTING: &str = "alerting";

/// Alarm evaluation period in seconds.
pub const ALARM_PERIOD: u32 = 300;

const TOPIC_ID: &str = "AlertTopic";
const DASHBOARD_ID: &str = "FinSightDashboard";

/// What kind of resource a template is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSource {
    Function,
    Api,
    Database,
}

impl MetricSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSource::Function => "function",
            MetricSource::Api => "api",
            MetricSource::Database => "database",
        }
    }

    pub fn namespace(&self) -> &'static str {
        match self {
            MetricSource::Function => "AWS/Lambda",
            MetricSource::Api => "AWS/ApiGateway",
            MetricSource::Database => "AWS/RDS",
        }
    }

    pub fn dimension(&self) -> &'static str {
        match self {
            MetricSource::Function => "FunctionName",
            MetricSource::Api => "ApiName",
            MetricSource::Database => "DBInstanceIdentifier",
        }
    }
}

impl std::fmt::Display for MetricSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    GreaterThanOrEqualToThreshold,
    GreaterThanThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl Comparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::GreaterThanOrEqualToThreshold => "GreaterThanOrEqualToThreshold",
            Comparator::GreaterThanThreshold => "GreaterThanThreshold",
            Comparator::LessThanThreshold => "LessThanThreshold",
            Comparator::LessThanOrEqualToThreshold => "LessThanOrEqualToThreshold",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::GreaterThanOrEqualToThreshold => ">=",
            Comparator::GreaterThanThreshold => ">",
            Comparator::LessThanThreshold => "<",
            Comparator::LessThanOrEqualToThreshold => "<=",
        }
    }

    fn fires_upward(&self) -> bool {
        matches!(
            self,
            Comparator::GreaterThanOrEqualToThreshold | Comparator::GreaterThanThreshold
        )
    }
}

/// Which direction of the metric is bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Polarity {
    HigherIsWorse,
    LowerIsWorse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingData {
    NotBreaching,
    Breaching,
    Ignore,
    Missing,
}

impl MissingData {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissingData::NotBreaching => "notBreaching",
            MissingData::Breaching => "breaching",
            MissingData::Ignore => "ignore",
            MissingData::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRule {
    pub comparator: Comparator,
    pub threshold: i64,
    pub evaluation_periods: u32,
    pub polarity: Polarity,
    pub missing_data: MissingData,
}

impl AlarmRule {
    pub fn higher_is_worse(comparator: Comparator, threshold: i64, evaluation_periods: u32) -> Self {
        Self {
            comparator,
            threshold,
            evaluation_periods,
            polarity: Polarity::HigherIsWorse,
            missing_data: MissingData::NotBreaching,
        }
    }

    pub fn lower_is_worse(comparator: Comparator, threshold: i64, evaluation_periods: u32) -> Self {
        Self {
            comparator,
            threshold,
            evaluation_periods,
            polarity: Polarity::LowerIsWorse,
            missing_data: MissingData::Breaching,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricTemplate {
    pub source: MetricSource,
    pub metric: String,
    pub statistic: String,
    /// Unit suffix for the dashboard text, e.g. `ms`
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm: Option<AlarmRule>,
}

impl MetricTemplate {
    pub fn graph(source: MetricSource, metric: &str, statistic: &str) -> Self {
        Self {
            source,
            metric: metric.to_string(),
            statistic: statistic.to_string(),
            unit: String::new(),
            alarm: None,
        }
    }

    pub fn alarm(source: MetricSource, metric: &str, statistic: &str, unit: &str, rule: AlarmRule) -> Self {
        Self {
            unit: unit.to_string(),
            alarm: Some(rule),
            ..Self::graph(source, metric, statistic)
        }
    }

    /// Key used by profile overrides: `<source>.<metric>`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.source, self.metric)
    }

    /// Comparator, polarity and missing-data policy must agree.
    pub fn validate(&self) -> PlanResult<()> {
        let Some(rule) = &self.alarm else {
            return Ok(());
        };
        let key = self.key();

        if rule.evaluation_periods == 0 {
            return Err(PlanError::threshold(&key, "evaluation periods must be at least 1"));
        }
        if rule.threshold < 0 {
            return Err(PlanError::threshold(&key, "threshold cannot be negative"));
        }
        match rule.polarity {
            Polarity::HigherIsWorse => {
                if !rule.comparator.fires_upward() {
                    return Err(PlanError::threshold(
                        &key,
                        format!("{} cannot alarm on a higher-is-worse metric", rule.comparator.symbol()),
                    ));
                }
                if rule.missing_data != MissingData::NotBreaching {
                    return Err(PlanError::threshold(
                        &key,
                        "missing data must not breach a higher-is-worse metric",
                    ));
                }
            }
            Polarity::LowerIsWorse => {
                if rule.comparator.fires_upward() {
                    return Err(PlanError::threshold(
                        &key,
                        format!("{} cannot alarm on a lower-is-worse metric", rule.comparator.symbol()),
                    ));
                }
                if rule.missing_data != MissingData::Breaching {
                    return Err(PlanError::threshold(
                        &key,
                        "missing data must breach a lower-is-worse metric",
                    ));
                }
            }
        }
        Ok(())
    }

    /// `Errors >= 5 for 2 x 300s`
    pub fn describe(&self) -> String {
        match &self.alarm {
            Some(rule) => format!(
                "{} {} {}{} for {} x {}s",
                self.metric,
                rule.comparator.symbol(),
                rule.threshold,
                self.unit,
                rule.evaluation_periods,
                ALARM_PERIOD
            ),
            None => format!("{} (graph only)", self.metric),
        }
    }
}

/// The single source of alarm thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateCatalog {
    pub templates: Vec<MetricTemplate>,
}

impl TemplateCatalog {
    pub fn standard() -> Self {
        use Comparator::*;
        use MetricSource::*;

        Self {
            templates: vec![
                MetricTemplate::graph(Function, "Invocations", "Sum"),
                MetricTemplate::alarm(
                    Function,
                    "Errors",
                    "Sum",
                    "",
                    AlarmRule::higher_is_worse(GreaterThanOrEqualToThreshold, 5, 2),
                ),
                MetricTemplate::alarm(
                    Function,
                    "Duration",
                    "Average",
                    "ms",
                    AlarmRule::higher_is_worse(GreaterThanThreshold, 10_000, 3),
                ),
                MetricTemplate::graph(Api, "Count", "Sum"),
                MetricTemplate::graph(Api, "4XXError", "Sum"),
                MetricTemplate::alarm(
                    Api,
                    "5XXError",
                    "Sum",
                    "",
                    AlarmRule::higher_is_worse(GreaterThanThreshold, 10, 2),
                ),
                MetricTemplate::alarm(
                    Api,
                    "Latency",
                    "Average",
                    "ms",
                    AlarmRule::higher_is_worse(GreaterThanThreshold, 5_000, 3),
                ),
                MetricTemplate::graph(Database, "CPUUtilization", "Average"),
                MetricTemplate::alarm(
                    Database,
                    "DatabaseConnections",
                    "Average",
                    "",
                    AlarmRule::higher_is_worse(GreaterThanThreshold, 80, 2),
                ),
                MetricTemplate::alarm(
                    Database,
                    "FreeStorageSpace",
                    "Average",
                    " B",
                    AlarmRule::lower_is_worse(LessThanThreshold, 2_000_000_000, 1),
                ),
            ],
        }
    }

    pub fn validate(&self) -> PlanResult<()> {
        let mut seen = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let key = template.key();
            if seen.contains(&key) {
                return Err(PlanError::threshold(&key, "template declared twice"));
            }
            template.validate()?;
            seen.push(key);
        }
        Ok(())
    }

    /// Apply profile overrides, keyed by `<source>.<metric>` or, when the
    /// metric name is unambiguous, by the bare metric name.
    pub fn with_overrides(&self, overrides: &BTreeMap<String, ThresholdOverride>) -> PlanResult<Self> {
        let mut catalog = self.clone();

        for (name, value) in overrides {
            let matching: Vec<usize> = catalog
                .templates
                .iter()
                .enumerate()
                .filter(|(_, t)| t.key() == *name || t.metric == *name)
                .map(|(i, _)| i)
                .collect();

            let index = match matching.as_slice() {
                [index] => *index,
                [] => return Err(PlanError::threshold(name, "no metric template with this name")),
                _ => {
                    return Err(PlanError::threshold(
                        name,
                        "ambiguous metric name, use <source>.<metric>",
                    ))
                }
            };

            let template = &mut catalog.templates[index];
            let Some(rule) = template.alarm.as_mut() else {
                return Err(PlanError::threshold(name, "graph-only metric has no threshold"));
            };
            if let Some(threshold) = value.threshold {
                rule.threshold = threshold;
            }
            if let Some(periods) = value.evaluation_periods {
                rule.evaluation_periods = periods;
            }
            debug!("Threshold override {}: {}", name, template.describe());
        }

        catalog.validate()?;
        Ok(catalog)
    }

    pub fn for_source(&self, source: MetricSource) -> impl Iterator<Item = &MetricTemplate> {
        self.templates.iter().filter(move |t| t.source == source)
    }

    pub fn alarm_count(&self, source: MetricSource) -> usize {
        self.for_source(source).filter(|t| t.alarm.is_some()).count()
    }
}

fn pascal(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn graph_widget(title: String, source: MetricSource, dimension: &Value, templates: Vec<&MetricTemplate>) -> Value {
    let metrics: Vec<Value> = templates
        .into_iter()
        .map(|t| {
            Value::list(vec![
                Value::from(source.namespace()),
                Value::from(t.metric.as_str()),
                Value::from(source.dimension()),
                dimension.clone(),
                Value::map([("stat", t.statistic.as_str())]),
            ])
        })
        .collect();

    Value::map([
        ("type", Value::from("metric")),
        ("width", Value::from(12i64)),
        ("height", Value::from(6i64)),
        (
            "properties",
            Value::map([
                ("title", Value::from(title)),
                ("metrics", Value::List(metrics)),
                ("period", Value::from(ALARM_PERIOD)),
            ]),
        ),
    ])
}

pub struct AlertingEngine {
    catalog: TemplateCatalog,
}

impl AlertingEngine {
    pub fn new(catalog: TemplateCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    fn add_alarms(
        &self,
        unit: &mut DeployUnit,
        catalog: &TemplateCatalog,
        source: MetricSource,
        prefix: &str,
        target: &str,
        dimension: &Value,
        topic_arn: &Value,
    ) -> PlanResult<usize> {
        let mut count = 0;
        for template in catalog.for_source(source) {
            let Some(rule) = &template.alarm else {
                continue;
            };
            let id = format!("{}{}Alarm", prefix, template.metric);
            unit.add(
                Resource::new(&id, ResourceKind::Alarm)
                    .prop("AlarmDescription", format!("{} {}: {}", source, target, template.describe()))
                    .prop("Namespace", source.namespace())
                    .prop("MetricName", template.metric.as_str())
                    .prop(
                        "Dimensions",
                        Value::list(vec![Value::map([
                            ("Name", Value::from(source.dimension())),
                            ("Value", dimension.clone()),
                        ])]),
                    )
                    .prop("Statistic", template.statistic.as_str())
                    .prop("Period", ALARM_PERIOD)
                    .prop("Threshold", rule.threshold)
                    .prop("EvaluationPeriods", rule.evaluation_periods)
                    .prop("ComparisonOperator", rule.comparator.as_str())
                    .prop("TreatMissingData", rule.missing_data.as_str())
                    .prop("AlarmActions", Value::list(vec![topic_arn.clone()]))
                    .depends_on(TOPIC_ID),
            )?;
            count += 1;
        }
        Ok(count)
    }

    fn overview(&self, ctx: &BuildContext<'_>, catalog: &TemplateCatalog) -> Value {
        let mut lines = vec![
            "# FinSight System Overview".to_string(),
            format!("**Environment:** {}", ctx.environment()),
            format!("**Region:** {}", ctx.region()),
            String::new(),
            "## Alarm thresholds".to_string(),
        ];
        for template in catalog.templates.iter().filter(|t| t.alarm.is_some()) {
            lines.push(format!("- {}: {}", template.source, template.describe()));
        }

        Value::map([
            ("type", Value::from("text")),
            ("width", Value::from(24i64)),
            ("height", Value::from(6i64)),
            ("properties", Value::map([("markdown", lines.join("\n"))])),
        ])
    }
}

impl Default for AlertingEngine {
    fn default() -> Self {
        Self::new(TemplateCatalog::standard())
    }
}

impl UnitBuilder for AlertingEngine {
    fn name(&self) -> &str {
        ALERTING
    }

    fn description(&self) -> &str {
        "Alarms, alert topic and dashboard"
    }

    fn depends_on(&self) -> Vec<String> {
        vec![DATASTORE.to_string(), COMPUTE.to_string()]
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let catalog = self
            .catalog
            .with_overrides(&ctx.profile().monitoring.threshold_overrides)?;
        let functions = ctx.string_list(COMPUTE, "functionNames")?;
        let env = ctx.environment();

        let mut unit = ctx
            .new_unit("MonitoringStack")
            .with_description(format!("FinSight monitoring for {}", env));

        unit.add(
            Resource::new(TOPIC_ID, ResourceKind::Topic)
                .prop("TopicName", format!("finsight-alerts-{}", env))
                .prop("DisplayName", "FinSight System Alerts"),
        )?;
        let topic_arn = unit.attr(TOPIC_ID, "TopicArn");

        if !ctx.tier().is_production_like() {
            unit.add(
                Resource::new("AlertEmailSubscription", ResourceKind::Subscription)
                    .prop("TopicArn", topic_arn.clone())
                    .prop("Protocol", "email")
                    .prop("Endpoint", ctx.profile().alert_email())
                    .depends_on(TOPIC_ID),
            )?;
        }

        let mut widgets = vec![self.overview(ctx, &catalog)];
        let mut alarms = 0;

        let api_name = unit.import(COMPUTE, "apiName");
        alarms += self.add_alarms(&mut unit, &catalog, MetricSource::Api, "Api", "API", &api_name, &topic_arn)?;
        widgets.push(graph_widget(
            "API Gateway".into(),
            MetricSource::Api,
            &api_name,
            catalog.for_source(MetricSource::Api).collect(),
        ));

        let instance = unit.import(DATASTORE, "instanceId");
        alarms += self.add_alarms(
            &mut unit,
            &catalog,
            MetricSource::Database,
            "Rds",
            "database",
            &instance,
            &topic_arn,
        )?;
        widgets.push(graph_widget(
            "RDS Database".into(),
            MetricSource::Database,
            &instance,
            catalog.for_source(MetricSource::Database).collect(),
        ));

        for function in &functions {
            let function_name = unit.import(COMPUTE, &format!("function.{}.name", function));
            alarms += self.add_alarms(
                &mut unit,
                &catalog,
                MetricSource::Function,
                function,
                function,
                &function_name,
                &topic_arn,
            )?;
            widgets.push(graph_widget(
                format!("{} Function", pascal(function)),
                MetricSource::Function,
                &function_name,
                catalog.for_source(MetricSource::Function).collect(),
            ));
        }

        let dashboard_name = format!("FinSight-{}", env);
        unit.add(
            Resource::new(DASHBOARD_ID, ResourceKind::Dashboard)
                .prop("DashboardName", dashboard_name.as_str())
                .prop("DashboardBody", Value::map([("widgets", Value::List(widgets))])),
        )?;

        unit.export("alertTopicArn", topic_arn, "Alert topic ARN");
        unit.export("dashboardName", dashboard_name.as_str(), "Dashboard name");
        unit.export(
            "dashboardUrl",
            format!(
                "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}#dashboards:name={name}",
                region = ctx.region(),
                name = dashboard_name
            ),
            "Dashboard console URL",
        );

        info!(
            "Monitoring for {}: {} alarm(s) over {} function(s)",
            env,
            alarms,
            functions.len()
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use finsight_profile::EnvironmentProfile;

    use super::*;

    #[test]
    fn test_standard_catalog_is_consistent() {
        let catalog = TemplateCatalog::standard();
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.alarm_count(MetricSource::Function), 2);
        assert_eq!(catalog.alarm_count(MetricSource::Api), 2);
        assert_eq!(catalog.alarm_count(MetricSource::Database), 2);
    }

    #[test]
    fn test_inconsistent_template_rejected() {
        let mut template = MetricTemplate::alarm(
            MetricSource::Database,
            "FreeStorageSpace",
            "Average",
            "",
            AlarmRule::lower_is_worse(Comparator::LessThanThreshold, 1, 1),
        );
        assert!(template.validate().is_ok());

        if let Some(rule) = template.alarm.as_mut() {
            rule.comparator = Comparator::GreaterThanThreshold;
        }
        assert!(matches!(template.validate(), Err(PlanError::ThresholdConfig { .. })));

        let breaching_errors = MetricTemplate::alarm(
            MetricSource::Function,
            "Errors",
            "Sum",
            "",
            AlarmRule {
                missing_data: MissingData::Breaching,
                ..AlarmRule::higher_is_worse(Comparator::GreaterThanThreshold, 5, 2)
            },
        );
        assert!(breaching_errors.validate().is_err());
    }

    #[test]
    fn test_higher_is_worse_requires_not_breaching() {
        for missing_data in [MissingData::Ignore, MissingData::Missing] {
            let template = MetricTemplate::alarm(
                MetricSource::Api,
                "Latency",
                "Average",
                "ms",
                AlarmRule {
                    missing_data,
                    ..AlarmRule::higher_is_worse(Comparator::GreaterThanThreshold, 5000, 3)
                },
            );
            assert!(
                matches!(template.validate(), Err(PlanError::ThresholdConfig { .. })),
                "{}",
                missing_data.as_str()
            );
        }
    }

    #[test]
    fn test_overrides() {
        let catalog = TemplateCatalog::standard();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "Errors".to_string(),
            ThresholdOverride {
                threshold: Some(1),
                evaluation_periods: None,
            },
        );
        overrides.insert(
            "api.Latency".to_string(),
            ThresholdOverride {
                threshold: None,
                evaluation_periods: Some(5),
            },
        );

        let tuned = catalog.with_overrides(&overrides).unwrap();
        let errors = tuned.templates.iter().find(|t| t.metric == "Errors").unwrap();
        assert_eq!(errors.alarm.unwrap().threshold, 1);
        assert_eq!(errors.alarm.unwrap().evaluation_periods, 2);
        let latency = tuned.templates.iter().find(|t| t.metric == "Latency").unwrap();
        assert_eq!(latency.alarm.unwrap().evaluation_periods, 5);
    }

    #[test]
    fn test_bad_overrides() {
        let catalog = TemplateCatalog::standard();
        for (name, value) in [
            ("Throttles", ThresholdOverride { threshold: Some(1), evaluation_periods: None }),
            ("CPUUtilization", ThresholdOverride { threshold: Some(90), evaluation_periods: None }),
            ("Duration", ThresholdOverride { threshold: None, evaluation_periods: Some(0) }),
        ] {
            let mut overrides = BTreeMap::new();
            overrides.insert(name.to_string(), value);
            match catalog.with_overrides(&overrides) {
                Err(PlanError::ThresholdConfig { .. }) => {}
                other => panic!("expected threshold error for {}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_describe() {
        let catalog = TemplateCatalog::standard();
        let described: Vec<String> = catalog.for_source(MetricSource::Function).map(|t| t.describe()).collect();
        assert_eq!(
            described,
            vec![
                "Invocations (graph only)",
                "Errors >= 5 for 2 x 300s",
                "Duration > 10000ms for 3 x 300s"
            ]
        );
    }

    #[test]
    fn test_dev_subscribes_alert_email() {
        let profile = EnvironmentProfile::new("dev", "ap-northeast-1").with_alert_email("ops@finsight.local");
        let mut compute = DeployUnit::new(COMPUTE, "ApiStack-dev");
        compute.export("functionNames", Value::list(vec!["users"]), "");
        let datastore = DeployUnit::new(DATASTORE, "DatabaseStack-dev");
        let mut deps = BTreeMap::new();
        deps.insert(COMPUTE.to_string(), &compute);
        deps.insert(DATASTORE.to_string(), &datastore);
        let ctx = BuildContext::new(&profile, ALERTING, vec![DATASTORE.into(), COMPUTE.into()], deps);

        let unit = AlertingEngine::default().build(&ctx).unwrap();
        let subscription = unit.resource("AlertEmailSubscription").unwrap();
        assert_eq!(subscription.str_prop("Endpoint"), Some("ops@finsight.local"));
        assert_eq!(unit.resources_of(ResourceKind::Alarm).count(), 6);
        assert!(unit.resource("usersErrorsAlarm").is_some());
        assert_eq!(
            unit.output("dashboardUrl").and_then(Value::as_str),
            Some("https://ap-northeast-1.console.aws.amazon.com/cloudwatch/home?region=ap-northeast-1#dashboards:name=FinSight-dev")
        );
    }
}
