//! Managed PostgreSQL instance, its credential secret and the one-shot
//! schema initialization function.

use finsight_plan::{
    BuildContext, DeployUnit, PlanResult, PolicyTable, RemovalPolicy, Resource, ResourceKind,
    UnitBuilder, Value,
};
use finsight_profile::Tier;
use tracing::{info, warn};

use crate::iam::secret_read_policy;
use crate::network::{DATABASE_PORT, NETWORK};

pub const DATASTORE: &str = "datastore";
pub const DATABASE_NAME: &str = "finsight";
pub const DATABASE_USER: &str = "postgres";
pub const ENGINE_VERSION: &str = "15";

const SECRET_ID: &str = "DatabaseSecret";
const INSTANCE_ID: &str = "FinSightDatabase";
const SUBNET_GROUP_ID: &str = "DatabaseSubnetGroup";
const INIT_FUNCTION_ID: &str = "DbInitFunction";

/// Tier-dependent database shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePolicy {
    pub instance_class: String,
    pub multi_az: bool,
    pub deletion_protection: bool,
    pub removal_policy: RemovalPolicy,
    pub backup_retention_days: u32,
}

pub fn database_policy() -> PolicyTable<DatabasePolicy> {
    PolicyTable::new("database")
        .with_row(
            Tier::Production,
            DatabasePolicy {
                instance_class: "db.t3.small".into(),
                multi_az: true,
                deletion_protection: true,
                removal_policy: RemovalPolicy::Retain,
                backup_retention_days: 7,
            },
        )
        .with_row(
            Tier::Development,
            DatabasePolicy {
                instance_class: "db.t3.micro".into(),
                multi_az: false,
                deletion_protection: false,
                removal_policy: RemovalPolicy::Destroy,
                backup_retention_days: 7,
            },
        )
}

pub struct DataStoreProvisioner {
    policy: PolicyTable<DatabasePolicy>,
}

impl DataStoreProvisioner {
    pub fn new() -> Self {
        Self {
            policy: database_policy(),
        }
    }

    pub fn with_policy(mut self, table: PolicyTable<DatabasePolicy>) -> Self {
        self.policy = table;
        self
    }

    /// Log every profile field that the policy row overrides.
    fn reconcile(&self, ctx: &BuildContext<'_>, row: &DatabasePolicy) {
        let config = &ctx.profile().database_config;
        if config.instance_type != row.instance_class {
            warn!(
                "{}: databaseConfig.instanceType '{}' ignored, {} tier uses '{}'",
                ctx.environment(),
                config.instance_type,
                ctx.tier(),
                row.instance_class
            );
        }
        if config.multi_az != row.multi_az {
            warn!(
                "{}: databaseConfig.multiAz={} ignored, {} tier uses {}",
                ctx.environment(),
                config.multi_az,
                ctx.tier(),
                row.multi_az
            );
        }
        if config.deletion_protection != row.deletion_protection {
            warn!(
                "{}: databaseConfig.deletionProtection={} ignored, {} tier uses {}",
                ctx.environment(),
                config.deletion_protection,
                ctx.tier(),
                row.deletion_protection
            );
        }
    }
}

impl Default for DataStoreProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

/// `{{resolve:secretsmanager:<arn>:SecretString:<key>}}`
fn secret_field(secret_arn: Value, key: &str) -> Value {
    Value::join(vec![
        Value::from("{{resolve:secretsmanager:"),
        secret_arn,
        Value::from(format!(":SecretString:{}}}}}", key)),
    ])
}

impl UnitBuilder for DataStoreProvisioner {
    fn name(&self) -> &str {
        DATASTORE
    }

    fn description(&self) -> &str {
        "PostgreSQL instance and credentials"
    }

    fn depends_on(&self) -> Vec<String> {
        vec![NETWORK.to_string()]
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let row = self.policy.row(ctx.tier())?;
        self.reconcile(ctx, row);

        let env = ctx.environment();
        let mut unit = ctx
            .new_unit("DatabaseStack")
            .with_description(format!("FinSight database for {}", env));

        let private_subnets = unit.import(NETWORK, "privateSubnets");
        let data_acl = unit.import(NETWORK, "dataAcl");
        let compute_acl = unit.import(NETWORK, "computeAcl");

        unit.add(
            Resource::new(SECRET_ID, ResourceKind::Secret)
                .prop("Name", format!("finsight-db-credentials-{}", env))
                .prop("Description", format!("FinSight database credentials for {}", env))
                .prop(
                    "GenerateSecretString",
                    Value::map([
                        (
                            "SecretStringTemplate",
                            Value::from(format!("{{\"username\":\"{}\"}}", DATABASE_USER)),
                        ),
                        ("GenerateStringKey", Value::from("password")),
                        ("ExcludeCharacters", Value::from("\"@/\\")),
                    ]),
                )
                .with_removal_policy(row.removal_policy),
        )?;
        let secret_arn = unit.attr(SECRET_ID, "Arn");

        unit.add(
            Resource::new(SUBNET_GROUP_ID, ResourceKind::DbSubnetGroup)
                .prop("DBSubnetGroupDescription", format!("FinSight private subnets for {}", env))
                .prop("SubnetIds", private_subnets.clone()),
        )?;

        unit.add(
            Resource::new(INSTANCE_ID, ResourceKind::DbInstance)
                .prop("Engine", "postgres")
                .prop("EngineVersion", ENGINE_VERSION)
                .prop("DBInstanceClass", row.instance_class.as_str())
                .prop("DBName", DATABASE_NAME)
                .prop("MultiAZ", row.multi_az)
                .prop("DeletionProtection", row.deletion_protection)
                .prop("StorageEncrypted", true)
                .prop("BackupRetentionPeriod", row.backup_retention_days)
                .prop("Port", DATABASE_PORT)
                .prop("DBSubnetGroupName", unit.attr(SUBNET_GROUP_ID, "Ref"))
                .prop("VPCSecurityGroups", Value::list(vec![data_acl]))
                .prop("MasterUsername", secret_field(secret_arn.clone(), "username"))
                .prop("MasterUserPassword", secret_field(secret_arn.clone(), "password"))
                .with_removal_policy(row.removal_policy)
                .depends_on(SECRET_ID)
                .depends_on(SUBNET_GROUP_ID),
        )?;
        let endpoint_host = unit.attr(INSTANCE_ID, "Endpoint.Address");

        unit.add(
            Resource::new(INIT_FUNCTION_ID, ResourceKind::Function)
                .prop("FunctionName", format!("finsight-db-init-{}", env))
                .prop("Runtime", "nodejs18.x")
                .prop("Handler", "index.handler")
                .prop("Code", "lambda/db-init")
                .prop("Timeout", 300u32)
                .prop(
                    "VpcConfig",
                    Value::map([
                        ("SubnetIds", private_subnets),
                        ("SecurityGroupIds", Value::list(vec![compute_acl])),
                    ]),
                )
                .prop(
                    "Environment",
                    Value::map([(
                        "Variables",
                        Value::map([
                            ("DB_SECRET_ARN", secret_arn.clone()),
                            ("DB_ENDPOINT", endpoint_host.clone()),
                        ]),
                    )]),
                )
                .depends_on(INSTANCE_ID),
        )?;
        unit.add(secret_read_policy(
            "DbInitSecretRead",
            secret_arn.clone(),
            vec![unit.attr(INIT_FUNCTION_ID, "RoleName")],
        ))?;

        unit.export("endpointHost", endpoint_host, "Database endpoint host");
        let endpoint_port = unit.attr(INSTANCE_ID, "Endpoint.Port");
        unit.export("endpointPort", endpoint_port, "Database endpoint port");
        unit.export("credentialRef", secret_arn, "Database credentials secret ARN");
        unit.export("databaseName", DATABASE_NAME, "Database name");
        let instance_id = unit.attr(INSTANCE_ID, "DBInstanceIdentifier");
        unit.export("instanceId", instance_id, "Database instance identifier");

        info!(
            "Database for {}: {} multiAz={} deletionProtection={} removal={}",
            env, row.instance_class, row.multi_az, row.deletion_protection, row.removal_policy
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use finsight_profile::EnvironmentProfile;

    use super::*;

    fn build(profile: &EnvironmentProfile) -> PlanResult<DeployUnit> {
        let mut network = DeployUnit::new(NETWORK, "VpcStack");
        network.export("privateSubnets", Value::list(vec!["a", "b"]), "");
        network.export("dataAcl", "sg-data", "");
        network.export("computeAcl", "sg-compute", "");
        let mut deps = BTreeMap::new();
        deps.insert(NETWORK.to_string(), &network);
        let ctx = BuildContext::new(profile, DATASTORE, vec![NETWORK.into()], deps);
        DataStoreProvisioner::new().build(&ctx)
    }

    #[test]
    fn test_secret_field_reference() {
        let value = secret_field(Value::from("arn:secret"), "password");
        assert_eq!(
            value.as_str(),
            Some("{{resolve:secretsmanager:arn:secret:SecretString:password}}")
        );
    }

    #[test]
    fn test_policy_row_wins_over_profile() {
        let mut profile = EnvironmentProfile::new("dev", "us-east-1");
        profile.database_config.multi_az = true;
        profile.database_config.instance_type = "db.r5.large".into();

        let unit = build(&profile).unwrap();
        let db = unit.resource(INSTANCE_ID).unwrap();
        assert_eq!(db.str_prop("DBInstanceClass"), Some("db.t3.micro"));
        assert_eq!(db.property("MultiAZ"), Some(&Value::Bool(false)));
        assert_eq!(db.removal_policy, Some(RemovalPolicy::Destroy));
    }

    #[test]
    fn test_missing_tier_row_is_config_error() {
        let profile = EnvironmentProfile::new("dev", "us-east-1");
        let table = PolicyTable::new("database").with_row(Tier::Production, database_policy().row(Tier::Production).unwrap().clone());
        let mut network = DeployUnit::new(NETWORK, "VpcStack");
        network.export("privateSubnets", Value::list(vec!["a"]), "");
        let mut deps = BTreeMap::new();
        deps.insert(NETWORK.to_string(), &network);
        let ctx = BuildContext::new(&profile, DATASTORE, vec![NETWORK.into()], deps);

        let err = DataStoreProvisioner::new().with_policy(table).build(&ctx).unwrap_err();
        assert!(matches!(err, finsight_plan::PlanError::ConfigValidation(_)));
    }

    #[test]
    fn test_credentials_are_generated() {
        let unit = build(&EnvironmentProfile::new("prod", "us-east-1")).unwrap();
        let secret = unit.resource(SECRET_ID).unwrap();
        assert_eq!(secret.str_prop("Name"), Some("finsight-db-credentials-prod"));
        let generate = secret.property("GenerateSecretString").unwrap();
        assert_eq!(generate.get("GenerateStringKey").and_then(Value::as_str), Some("password"));
        assert_eq!(generate.get("ExcludeCharacters").and_then(Value::as_str), Some("\"@/\\"));
        assert_eq!(
            unit.output_names(),
            vec!["credentialRef", "databaseName", "endpointHost", "endpointPort", "instanceId"]
        );
    }
}
