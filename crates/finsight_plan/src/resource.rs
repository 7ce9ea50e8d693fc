//! Typed resource nodes owned by deploy units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Provider resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "AWS::EC2::VPC")]
    Vpc,
    #[serde(rename = "AWS::EC2::Subnet")]
    Subnet,
    #[serde(rename = "AWS::EC2::NatGateway")]
    NatGateway,
    #[serde(rename = "AWS::EC2::SecurityGroup")]
    SecurityGroup,
    #[serde(rename = "AWS::EC2::SecurityGroupIngress")]
    SecurityGroupIngress,
    #[serde(rename = "AWS::SecretsManager::Secret")]
    Secret,
    #[serde(rename = "AWS::RDS::DBSubnetGroup")]
    DbSubnetGroup,
    #[serde(rename = "AWS::RDS::DBInstance")]
    DbInstance,
    #[serde(rename = "AWS::Lambda::Function")]
    Function,
    #[serde(rename = "AWS::Lambda::Permission")]
    FunctionPermission,
    #[serde(rename = "AWS::IAM::Policy")]
    IamPolicy,
    #[serde(rename = "AWS::ApiGateway::RestApi")]
    RestApi,
    #[serde(rename = "AWS::ApiGateway::Stage")]
    ApiStage,
    #[serde(rename = "AWS::ApiGateway::Authorizer")]
    ApiAuthorizer,
    #[serde(rename = "AWS::ApiGateway::Method")]
    ApiMethod,
    #[serde(rename = "AWS::WAFv2::WebACL")]
    WebAcl,
    #[serde(rename = "AWS::WAFv2::WebACLAssociation")]
    WebAclAssociation,
    #[serde(rename = "AWS::CloudWatch::Alarm")]
    Alarm,
    #[serde(rename = "AWS::CloudWatch::Dashboard")]
    Dashboard,
    #[serde(rename = "AWS::SNS::Topic")]
    Topic,
    #[serde(rename = "AWS::SNS::Subscription")]
    Subscription,
    #[serde(rename = "AWS::SES::ConfigurationSet")]
    SesConfigurationSet,
    #[serde(rename = "AWS::SES::EmailIdentity")]
    SesEmailIdentity,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "AWS::EC2::VPC",
            ResourceKind::Subnet => "AWS::EC2::Subnet",
            ResourceKind::NatGateway => "AWS::EC2::NatGateway",
            ResourceKind::SecurityGroup => "AWS::EC2::SecurityGroup",
            ResourceKind::SecurityGroupIngress => "AWS::EC2::SecurityGroupIngress",
            ResourceKind::Secret => "AWS::SecretsManager::Secret",
            ResourceKind::DbSubnetGroup => "AWS::RDS::DBSubnetGroup",
            ResourceKind::DbInstance => "AWS::RDS::DBInstance",
            ResourceKind::Function => "AWS::Lambda::Function",
            ResourceKind::FunctionPermission => "AWS::Lambda::Permission",
            ResourceKind::IamPolicy => "AWS::IAM::Policy",
            ResourceKind::RestApi => "AWS::ApiGateway::RestApi",
            ResourceKind::ApiStage => "AWS::ApiGateway::Stage",
            ResourceKind::ApiAuthorizer => "AWS::ApiGateway::Authorizer",
            ResourceKind::ApiMethod => "AWS::ApiGateway::Method",
            ResourceKind::WebAcl => "AWS::WAFv2::WebACL",
            ResourceKind::WebAclAssociation => "AWS::WAFv2::WebACLAssociation",
            ResourceKind::Alarm => "AWS::CloudWatch::Alarm",
            ResourceKind::Dashboard => "AWS::CloudWatch::Dashboard",
            ResourceKind::Topic => "AWS::SNS::Topic",
            ResourceKind::Subscription => "AWS::SNS::Subscription",
            ResourceKind::SesConfigurationSet => "AWS::SES::ConfigurationSet",
            ResourceKind::SesEmailIdentity => "AWS::SES::EmailIdentity",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happens to a resource when its unit is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Retain => "retain",
            RemovalPolicy::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed node owned by exactly one deploy unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Logical id, unique within the unit
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Ids of resources in the same unit that must exist first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: BTreeMap::new(),
            depends_on: Vec::new(),
            removal_policy: None,
        }
    }

    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.removal_policy = Some(policy);
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property value as a string, if it is a literal string.
    pub fn str_prop(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_as_provider_type() {
        let json = serde_json::to_string(&ResourceKind::DbInstance).unwrap();
        assert_eq!(json, "\"AWS::RDS::DBInstance\"");
        assert_eq!(ResourceKind::WebAcl.to_string(), "AWS::WAFv2::WebACL");
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new("Db", ResourceKind::DbInstance)
            .prop("MultiAZ", true)
            .prop("Engine", "postgres")
            .depends_on("Subnets")
            .depends_on("Subnets")
            .with_removal_policy(RemovalPolicy::Retain);

        assert_eq!(resource.str_prop("Engine"), Some("postgres"));
        assert_eq!(resource.property("MultiAZ"), Some(&Value::Bool(true)));
        assert_eq!(resource.depends_on, vec!["Subnets"]);
        assert_eq!(resource.removal_policy, Some(RemovalPolicy::Retain));
    }
}
