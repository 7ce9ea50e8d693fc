//! # finsight_stacks
//!
//! The FinSight deploy units and the registry that wires them together.
//!
//! | unit | stack | depends on |
//! |---|---|---|
//! | `network` | `VpcStack-<env>` | |
//! | `datastore` | `DatabaseStack-<env>` | network |
//! | `compute` | `ApiStack-<env>` | network, datastore |
//! | `traffic-filter` | `SecurityStack-<env>` | compute |
//! | `alerting` | `MonitoringStack-<env>` | datastore, compute |
//! | `notification` | `SesStack-<env>` | compute |
//!
//! ## Example
//!
//! ```rust,ignore
//! use finsight_stacks::compile;
//!
//! let plan = compile(&profile)?;
//! assert_eq!(plan.unit_names()[0], "network");
//! ```

pub mod alerting;
pub mod compute;
pub mod datastore;
pub mod iam;
pub mod network;
pub mod notification;
pub mod routes;
pub mod traffic_filter;

use std::sync::Arc;

use finsight_plan::{BuilderRegistry, Plan, PlanCompiler, PlanResult};
use finsight_profile::EnvironmentProfile;
use finsight_waf::{standard_rules, SecurityRule};

pub use alerting::{
    AlarmRule, AlertingEngine, Comparator, MetricSource, MetricTemplate, MissingData, Polarity,
    TemplateCatalog, ALERTING,
};
pub use compute::{ComputeFleetProvisioner, ComputeUnitSpec, FleetCatalog, ResourceLimits, AUTHORIZER, COMPUTE};
pub use datastore::{database_policy, DataStoreProvisioner, DatabasePolicy, DATASTORE};
pub use network::{nat_gateway_policy, NetworkTopologyBuilder, NETWORK};
pub use notification::{NotificationChannelProvisioner, Recipient, RecipientPolicy, NOTIFICATION, SENDER_UNITS};
pub use routes::{crud_routes, HttpMethod, RouteEntry, RouteMatch, RouteTable};
pub use traffic_filter::{filter_error, TrafficFilterEngine, TRAFFIC_FILTER};

/// The data catalogs the builders are driven by.
#[derive(Debug, Clone)]
pub struct StackCatalogs {
    pub fleet: FleetCatalog,
    pub rules: Vec<SecurityRule>,
    pub templates: TemplateCatalog,
}

impl Default for StackCatalogs {
    fn default() -> Self {
        Self {
            fleet: FleetCatalog::standard(),
            rules: standard_rules(),
            templates: TemplateCatalog::standard(),
        }
    }
}

impl StackCatalogs {
    pub fn with_fleet(mut self, fleet: FleetCatalog) -> Self {
        self.fleet = fleet;
        self
    }

    pub fn with_rules(mut self, rules: Vec<SecurityRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_templates(mut self, templates: TemplateCatalog) -> Self {
        self.templates = templates;
        self
    }
}

/// All six builders over the given catalogs, in standard order.
pub fn registry(catalogs: StackCatalogs) -> BuilderRegistry {
    BuilderRegistry::new()
        .with(Arc::new(NetworkTopologyBuilder::new()))
        .with(Arc::new(DataStoreProvisioner::new()))
        .with(Arc::new(ComputeFleetProvisioner::new(catalogs.fleet)))
        .with(Arc::new(TrafficFilterEngine::new(catalogs.rules)))
        .with(Arc::new(AlertingEngine::new(catalogs.templates)))
        .with(Arc::new(NotificationChannelProvisioner::new()))
}

pub fn standard_registry() -> BuilderRegistry {
    registry(StackCatalogs::default())
}

/// Compile `profile` with the standard registry.
pub fn compile(profile: &EnvironmentProfile) -> PlanResult<Plan> {
    PlanCompiler::new(Arc::new(standard_registry())).compile(profile)
}
