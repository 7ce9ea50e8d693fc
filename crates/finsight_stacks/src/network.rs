//! Private network topology.
//!
//! The network unit owns the address space, one public and one private
//! subnet per availability zone, the egress gateways and the two
//! access-control groups. Only the gateway count depends on the tier.

use finsight_plan::{
    BuildContext, DeployUnit, PlanResult, PolicyTable, Resource, ResourceKind, UnitBuilder, Value,
};
use finsight_profile::Tier;
use tracing::info;

pub const NETWORK: &str = "network";

pub const VPC_CIDR: &str = "10.0.0.0/16";
pub const MAX_AZS: usize = 2;
pub const SUBNET_MASK: u32 = 24;
pub const DATABASE_PORT: i64 = 5432;

const VPC_ID: &str = "FinSightVpc";
const COMPUTE_GROUP: &str = "LambdaSecurityGroup";
const DATA_GROUP: &str = "RdsSecurityGroup";

/// NAT gateways per tier.
pub fn nat_gateway_policy() -> PolicyTable<u32> {
    PolicyTable::new("natGateways")
        .with_row(Tier::Production, 2)
        .with_row(Tier::Development, 1)
}

/// `10.0.<index>.0/24`: public subnets first, then private ones.
fn subnet_cidr(index: usize) -> String {
    format!("10.0.{}.0/{}", index, SUBNET_MASK)
}

pub struct NetworkTopologyBuilder {
    nat_gateways: PolicyTable<u32>,
}

impl NetworkTopologyBuilder {
    pub fn new() -> Self {
        Self {
            nat_gateways: nat_gateway_policy(),
        }
    }

    pub fn with_nat_policy(mut self, table: PolicyTable<u32>) -> Self {
        self.nat_gateways = table;
        self
    }

    fn add_subnets(&self, unit: &mut DeployUnit, public: bool) -> PlanResult<Vec<String>> {
        let (label, offset) = if public { ("Public", 0) } else { ("Private", MAX_AZS) };
        let mut ids = Vec::with_capacity(MAX_AZS);

        for az in 0..MAX_AZS {
            let id = format!("{}Subnet{}", label, az + 1);
            unit.add(
                Resource::new(&id, ResourceKind::Subnet)
                    .prop("VpcId", unit.attr(VPC_ID, "VpcId"))
                    .prop("CidrBlock", subnet_cidr(offset + az))
                    .prop("AvailabilityZoneIndex", az as i64)
                    .prop("MapPublicIpOnLaunch", public)
                    .prop("SubnetType", if public { "Public" } else { "PrivateWithEgress" })
                    .depends_on(VPC_ID),
            )?;
            ids.push(id);
        }
        Ok(ids)
    }
}

impl Default for NetworkTopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitBuilder for NetworkTopologyBuilder {
    fn name(&self) -> &str {
        NETWORK
    }

    fn description(&self) -> &str {
        "VPC, subnets and access-control groups"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let nat_count = (*self.nat_gateways.row(ctx.tier())? as usize).clamp(1, MAX_AZS);
        let mut unit = ctx
            .new_unit("VpcStack")
            .with_description(format!("FinSight network for {}", ctx.environment()));

        unit.add(
            Resource::new(VPC_ID, ResourceKind::Vpc)
                .prop("CidrBlock", VPC_CIDR)
                .prop("EnableDnsHostnames", true)
                .prop("EnableDnsSupport", true)
                .prop("MaxAzs", MAX_AZS as i64),
        )?;

        let public = self.add_subnets(&mut unit, true)?;

        let mut gateways = Vec::with_capacity(nat_count);
        for (index, subnet) in public.iter().take(nat_count).enumerate() {
            let id = format!("NatGateway{}", index + 1);
            unit.add(
                Resource::new(&id, ResourceKind::NatGateway)
                    .prop("SubnetId", unit.attr(subnet, "SubnetId"))
                    .depends_on(subnet),
            )?;
            gateways.push(id);
        }

        let private = self.add_subnets(&mut unit, false)?;
        // Zones without their own gateway share the last one
        for (index, subnet) in private.iter().enumerate() {
            let gateway = &gateways[index.min(gateways.len() - 1)];
            let egress = unit.attr(gateway, "NatGatewayId");
            if let Some(resource) = unit.resources.iter_mut().find(|r| &r.id == subnet) {
                resource.properties.insert("EgressVia".into(), egress);
                resource.depends_on.push(gateway.clone());
            }
        }

        unit.add(
            Resource::new(COMPUTE_GROUP, ResourceKind::SecurityGroup)
                .prop("GroupDescription", "Security group for Lambda functions")
                .prop("VpcId", unit.attr(VPC_ID, "VpcId"))
                .prop("AllowAllOutbound", true)
                .prop(
                    "SecurityGroupEgress",
                    Value::list(vec![Value::map([("CidrIp", "0.0.0.0/0"), ("IpProtocol", "-1")])]),
                ),
        )?;
        unit.add(
            Resource::new(DATA_GROUP, ResourceKind::SecurityGroup)
                .prop("GroupDescription", "Security group for RDS database")
                .prop("VpcId", unit.attr(VPC_ID, "VpcId"))
                .prop("AllowAllOutbound", false)
                .prop("SecurityGroupEgress", Value::list(Vec::<Value>::new())),
        )?;
        unit.add(
            Resource::new("RdsIngressFromLambda", ResourceKind::SecurityGroupIngress)
                .prop("GroupId", unit.attr(DATA_GROUP, "GroupId"))
                .prop("SourceSecurityGroupId", unit.attr(COMPUTE_GROUP, "GroupId"))
                .prop("IpProtocol", "tcp")
                .prop("FromPort", DATABASE_PORT)
                .prop("ToPort", DATABASE_PORT)
                .prop("Description", "Allow Lambda to access RDS")
                .depends_on(COMPUTE_GROUP)
                .depends_on(DATA_GROUP),
        )?;

        let vpc_id = unit.attr(VPC_ID, "VpcId");
        unit.export("vpcId", vpc_id, "VPC id");
        let compute_acl = unit.attr(COMPUTE_GROUP, "GroupId");
        unit.export("computeAcl", compute_acl, "Security group for compute units");
        let data_acl = unit.attr(DATA_GROUP, "GroupId");
        unit.export("dataAcl", data_acl, "Security group for the database");
        let private_subnets = Value::list(private.iter().map(|id| unit.attr(id, "SubnetId")).collect::<Vec<_>>());
        unit.export("privateSubnets", private_subnets, "Private subnets with egress");
        let public_subnets = Value::list(public.iter().map(|id| unit.attr(id, "SubnetId")).collect::<Vec<_>>());
        unit.export("publicSubnets", public_subnets, "Public subnets");

        info!(
            "Network for {}: {} zones, {} NAT gateway(s)",
            ctx.environment(),
            MAX_AZS,
            nat_count
        );
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use finsight_profile::EnvironmentProfile;

    use super::*;

    fn build(environment: &str) -> DeployUnit {
        let profile = EnvironmentProfile::new(environment, "ap-northeast-1");
        let ctx = BuildContext::new(&profile, NETWORK, Vec::new(), BTreeMap::new());
        NetworkTopologyBuilder::new().build(&ctx).unwrap()
    }

    #[test]
    fn test_nat_gateways_follow_tier() {
        assert_eq!(build("prod").resources_of(ResourceKind::NatGateway).count(), 2);
        assert_eq!(build("dev").resources_of(ResourceKind::NatGateway).count(), 1);
    }

    #[test]
    fn test_subnet_layout() {
        let unit = build("dev");
        let cidrs: Vec<&str> = unit
            .resources_of(ResourceKind::Subnet)
            .filter_map(|r| r.str_prop("CidrBlock"))
            .collect();
        assert_eq!(cidrs, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24", "10.0.3.0/24"]);

        // Both private subnets egress through the single dev gateway
        let egress = unit.resource("PrivateSubnet2").unwrap().property("EgressVia").unwrap();
        assert_eq!(egress, &Value::attr(NETWORK, "NatGateway1", "NatGatewayId"));
    }

    #[test]
    fn test_only_database_port_crosses_groups() {
        let unit = build("prod");
        let ingress: Vec<&Resource> = unit.resources_of(ResourceKind::SecurityGroupIngress).collect();
        assert_eq!(ingress.len(), 1);
        assert_eq!(ingress[0].property("FromPort"), Some(&Value::Int(5432)));
        assert_eq!(ingress[0].property("ToPort"), Some(&Value::Int(5432)));
        assert_eq!(ingress[0].str_prop("IpProtocol"), Some("tcp"));

        let data = unit.resource(DATA_GROUP).unwrap();
        assert_eq!(data.property("AllowAllOutbound"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_exports() {
        let unit = build("dev");
        assert_eq!(
            unit.output_names(),
            vec!["computeAcl", "dataAcl", "privateSubnets", "publicSubnets", "vpcId"]
        );
        assert_eq!(unit.output("privateSubnets").and_then(Value::as_list).map(|l| l.len()), Some(2));
    }
}
