//! Transactional email: SES configuration set, sending identity, bounce and
//! complaint topics, and the send permission for mail-sending functions.

use finsight_plan::{BuildContext, DeployUnit, PlanResult, PolicyTable, Resource, ResourceKind, UnitBuilder, Value};
use finsight_profile::Tier;
use tracing::{info, warn};

use crate::compute::COMPUTE;
use crate::iam::send_email_policy;

pub const NOTIFICATION: &str = "notification";

/// Fleet functions allowed to send mail.
pub const SENDER_UNITS: &[&str] = &["reports", "notifications"];

const CONFIG_SET_ID: &str = "ConfigSet";
const BOUNCE_TOPIC_ID: &str = "BounceTopic";
const COMPLAINT_TOPIC_ID: &str = "ComplaintTopic";

/// Who receives bounce and complaint notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Address(String),
    /// The profile's alert email
    AlertEmail,
}

impl Recipient {
    fn resolve<'a>(&'a self, ctx: &'a BuildContext<'_>) -> &'a str {
        match self {
            Recipient::Address(address) => address,
            Recipient::AlertEmail => ctx.profile().alert_email(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientPolicy {
    pub bounce: Vec<Recipient>,
    pub complaint: Vec<Recipient>,
}

pub fn recipient_policy() -> PolicyTable<RecipientPolicy> {
    PolicyTable::new("mailRecipients")
        .with_row(
            Tier::Production,
            RecipientPolicy {
                bounce: vec![Recipient::Address("bounce-notifications@finsight.com".into())],
                complaint: vec![Recipient::Address("complaint-notifications@finsight.com".into())],
            },
        )
        .with_row(
            Tier::Development,
            RecipientPolicy {
                bounce: vec![Recipient::AlertEmail],
                complaint: vec![Recipient::AlertEmail],
            },
        )
}

pub struct NotificationChannelProvisioner {
    senders: Vec<String>,
    recipients: PolicyTable<RecipientPolicy>,
}

impl NotificationChannelProvisioner {
    pub fn new() -> Self {
        Self {
            senders: SENDER_UNITS.iter().map(|s| s.to_string()).collect(),
            recipients: recipient_policy(),
        }
    }

    pub fn with_senders<S: Into<String>>(mut self, senders: impl IntoIterator<Item = S>) -> Self {
        self.senders = senders.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_recipients(mut self, table: PolicyTable<RecipientPolicy>) -> Self {
        self.recipients = table;
        self
    }

    fn add_topic(
        &self,
        ctx: &BuildContext<'_>,
        unit: &mut DeployUnit,
        id: &str,
        kind: &str,
        recipients: &[Recipient],
    ) -> PlanResult<()> {
        unit.add(
            Resource::new(id, ResourceKind::Topic)
                .prop("TopicName", format!("finsight-{}-{}", kind.to_lowercase(), ctx.environment()))
                .prop("DisplayName", format!("FinSight Email {} Notifications", kind)),
        )?;
        for (index, recipient) in recipients.iter().enumerate() {
            unit.add(
                Resource::new(format!("{}Subscription{}", kind, index + 1), ResourceKind::Subscription)
                    .prop("TopicArn", unit.attr(id, "TopicArn"))
                    .prop("Protocol", "email")
                    .prop("Endpoint", recipient.resolve(ctx))
                    .depends_on(id),
            )?;
        }
        Ok(())
    }
}

impl Default for NotificationChannelProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitBuilder for NotificationChannelProvisioner {
    fn name(&self) -> &str {
        NOTIFICATION
    }

    fn description(&self) -> &str {
        "SES sending for reports and notifications"
    }

    fn depends_on(&self) -> Vec<String> {
        vec![COMPUTE.to_string()]
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let recipients = self.recipients.row(ctx.tier())?;
        let functions = ctx.string_list(COMPUTE, "functionNames")?;
        let ses = &ctx.profile().ses_config;
        let env = ctx.environment();
        let domain = ctx.profile().email_domain();

        let mut unit = ctx
            .new_unit("SesStack")
            .with_description(format!("FinSight email for {}", env));

        let config_set_name = format!("finsight-ses-config-{}", env);
        unit.add(
            Resource::new(CONFIG_SET_ID, ResourceKind::SesConfigurationSet)
                .prop("Name", config_set_name.as_str())
                .prop("SendingOptions", Value::map([("SendingEnabled", true)]))
                .prop(
                    "SendingQuota",
                    Value::map([
                        ("Max24HourSend", ses.sending_quota),
                        ("MaxSendRate", ses.sending_rate),
                    ]),
                ),
        )?;

        unit.add(
            Resource::new("EmailIdentity", ResourceKind::SesEmailIdentity)
                .prop("EmailIdentity", domain)
                .prop(
                    "ConfigurationSetAttributes",
                    Value::map([("ConfigurationSetName", config_set_name.as_str())]),
                )
                .depends_on(CONFIG_SET_ID),
        )?;

        self.add_topic(ctx, &mut unit, BOUNCE_TOPIC_ID, "Bounce", &recipients.bounce)?;
        self.add_topic(ctx, &mut unit, COMPLAINT_TOPIC_ID, "Complaint", &recipients.complaint)?;

        let granted: Vec<String> = self
            .senders
            .iter()
            .filter(|sender| {
                let present = functions.contains(*sender);
                if !present {
                    warn!("{}: sender '{}' is not in the fleet, no grant", env, sender);
                }
                present
            })
            .cloned()
            .collect();

        if !granted.is_empty() {
            let roles: Vec<Value> = granted
                .iter()
                .map(|name| unit.import(COMPUTE, &format!("function.{}.role", name)))
                .collect();
            unit.add(send_email_policy("SesSendPolicy", &ses.from_email, roles))?;
        }

        let bounce_arn = unit.attr(BOUNCE_TOPIC_ID, "TopicArn");
        let complaint_arn = unit.attr(COMPLAINT_TOPIC_ID, "TopicArn");
        unit.export("configurationSetName", config_set_name.as_str(), "SES configuration set");
        unit.export("bounceTopicArn", bounce_arn, "Bounce notification topic");
        unit.export("complaintTopicArn", complaint_arn, "Complaint notification topic");
        unit.export("fromEmailAddress", ses.from_email.as_str(), "Sender address");
        unit.export("emailDomain", domain, "Sending identity");
        unit.export("grantedFunctions", Value::list(granted.clone()), "Functions allowed to send");

        info!(
            "Email for {}: identity {}, {} sender(s)",
            env,
            domain,
            granted.len()
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use finsight_profile::EnvironmentProfile;

    use super::*;

    fn build(profile: &EnvironmentProfile, functions: Vec<&str>) -> DeployUnit {
        let mut compute = DeployUnit::new(COMPUTE, "ApiStack");
        compute.export("functionNames", Value::list(functions), "");
        let mut deps = BTreeMap::new();
        deps.insert(COMPUTE.to_string(), &compute);
        let ctx = BuildContext::new(profile, NOTIFICATION, vec![COMPUTE.into()], deps);
        NotificationChannelProvisioner::new().build(&ctx).unwrap()
    }

    fn granted(unit: &DeployUnit) -> Vec<&str> {
        unit.output("grantedFunctions")
            .and_then(Value::as_list)
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect()
    }

    #[test]
    fn test_only_allow_listed_senders() {
        let unit = build(
            &EnvironmentProfile::new("prod", "us-east-1"),
            vec!["users", "reports", "notifications", "authorizer"],
        );
        assert_eq!(granted(&unit), vec!["reports", "notifications"]);
        let policy = unit.resource("SesSendPolicy").unwrap();
        assert_eq!(policy.property("Roles").and_then(Value::as_list).map(|r| r.len()), Some(2));
    }

    #[test]
    fn test_no_senders_no_policy() {
        let unit = build(&EnvironmentProfile::new("prod", "us-east-1"), vec!["users", "auth"]);
        assert!(granted(&unit).is_empty());
        assert_eq!(unit.resources_of(ResourceKind::IamPolicy).count(), 0);
    }

    #[test]
    fn test_recipients_follow_tier() {
        let prod = build(&EnvironmentProfile::new("prod", "us-east-1"), vec![]);
        assert_eq!(
            prod.resource("BounceSubscription1").and_then(|r| r.str_prop("Endpoint")),
            Some("bounce-notifications@finsight.com")
        );

        let dev = build(&EnvironmentProfile::new("dev", "us-east-1"), vec![]);
        assert_eq!(
            dev.resource("ComplaintSubscription1").and_then(|r| r.str_prop("Endpoint")),
            Some("dev-alerts@finsight.local")
        );
        assert_eq!(dev.resource("BounceTopic").and_then(|r| r.str_prop("TopicName")), Some("finsight-bounce-dev"));
    }

    #[test]
    fn test_identity_uses_custom_domain() {
        let profile = EnvironmentProfile::new("prod", "us-east-1").with_custom_domain("finsight.app");
        let unit = build(&profile, vec![]);
        assert_eq!(unit.output("emailDomain").and_then(Value::as_str), Some("finsight.app"));

        let unit = build(&EnvironmentProfile::new("dev", "us-east-1"), vec![]);
        assert_eq!(unit.output("emailDomain").and_then(Value::as_str), Some("finsight.local"));
    }
}
