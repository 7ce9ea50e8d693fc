//! The compute fleet and the routed endpoint in front of it.
//!
//! Every catalog entry becomes one function with the shared base
//! environment, read access to the database secret and its own routes on
//! the REST API. The authorization gate is a separate function behind a
//! TOKEN authorizer that runs before every protected route.

use std::collections::{BTreeMap, BTreeSet};

use finsight_plan::{
    BuildContext, DeployUnit, PlanError, PlanResult, Resource, ResourceKind, UnitBuilder, Value,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::datastore::DATASTORE;
use crate::iam::secret_read_policy;
use crate::network::NETWORK;
use crate::routes::{crud_routes, HttpMethod, RouteEntry, RouteTable};

pub const COMPUTE: &str = "compute";

/// Short name of the authorization gate function.
pub const AUTHORIZER: &str = "authorizer";

/// Deployment stage of the REST API.
pub const API_STAGE_NAME: &str = "prod";

pub const CORS_ALLOW_HEADERS: &[&str] = &[
    "Content-Type",
    "X-Amz-Date",
    "Authorization",
    "X-Api-Key",
    "X-Amz-Security-Token",
];

pub const CORS_ALLOW_METHODS: &[&str] = &["OPTIONS", "GET", "PUT", "POST", "DELETE", "PATCH", "HEAD"];

const API_ID: &str = "FinSightApi";
const AUTHORIZER_FUNCTION_ID: &str = "AuthorizerFunction";
const AUTHORIZER_ID: &str = "ApiAuthorizer";
const STAGE_ID: &str = "ApiStage";
const FLEET_RUNTIME: &str = "provided.al2";
const AUTHORIZER_MEMORY: u32 = 256;
const AUTHORIZER_TIMEOUT: u32 = 10;
const AUTHORIZER_CACHE_TTL: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    pub memory: u32,
    pub timeout_seconds: u32,
}

/// One named compute unit of the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeUnitSpec {
    pub name: String,
    #[serde(default)]
    pub route_entries: Vec<RouteEntry>,
    /// Overrides the profile's `lambdaConfig`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_limits: Option<ResourceLimits>,
    /// Merged over the base environment
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

impl ComputeUnitSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route_entries: Vec::new(),
            resource_limits: None,
            env: BTreeMap::new(),
        }
    }

    pub fn with_routes(mut self, routes: impl IntoIterator<Item = RouteEntry>) -> Self {
        self.route_entries.extend(routes);
        self
    }

    pub fn with_route(mut self, route: RouteEntry) -> Self {
        self.route_entries.push(route);
        self
    }

    pub fn with_limits(mut self, memory: u32, timeout_seconds: u32) -> Self {
        self.resource_limits = Some(ResourceLimits {
            memory,
            timeout_seconds,
        });
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Logical id of the unit's function resource.
    pub fn function_id(&self) -> String {
        format!("{}Function", self.name)
    }
}

/// Ordered set of compute unit specs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FleetCatalog {
    pub units: Vec<ComputeUnitSpec>,
}

impl FleetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        use HttpMethod::*;

        Self::new()
            .with_unit(ComputeUnitSpec::new("users").with_routes([
                RouteEntry::protected(Get, "users/me"),
                RouteEntry::protected(Put, "users/me"),
            ]))
            .with_unit(ComputeUnitSpec::new("accounts").with_routes(crud_routes("accounts")))
            .with_unit(ComputeUnitSpec::new("transactions").with_routes(crud_routes("transactions")))
            .with_unit(ComputeUnitSpec::new("categories").with_routes(crud_routes("categories")))
            .with_unit(ComputeUnitSpec::new("budgets").with_routes(crud_routes("budgets")))
            .with_unit(ComputeUnitSpec::new("reports").with_routes([
                RouteEntry::protected(Get, "reports"),
                RouteEntry::protected(Get, "reports/summary"),
                RouteEntry::protected(Get, "reports/budget"),
            ]))
            .with_unit(ComputeUnitSpec::new("auth").with_routes([
                RouteEntry::public(Post, "auth/callback"),
                RouteEntry::public(Post, "auth/refresh"),
                RouteEntry::protected(Post, "auth/logout"),
                RouteEntry::public(Get, "health"),
            ]))
            .with_unit(ComputeUnitSpec::new("notifications").with_routes([
                RouteEntry::protected(Get, "notifications"),
                RouteEntry::protected(Post, "notifications"),
                RouteEntry::protected(Get, "notifications/preferences"),
                RouteEntry::protected(Put, "notifications/preferences"),
            ]))
    }

    /// Add a unit, replacing any unit with the same name in place.
    pub fn with_unit(mut self, spec: ComputeUnitSpec) -> Self {
        match self.units.iter_mut().find(|u| u.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.units.push(spec),
        }
        self
    }

    pub fn without(mut self, names: &[&str]) -> Self {
        self.units.retain(|u| !names.contains(&u.name.as_str()));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ComputeUnitSpec> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Dispatch table for the whole fleet.
    pub fn route_table(&self) -> PlanResult<RouteTable> {
        let mut table = RouteTable::new();
        for spec in &self.units {
            table.mount(&spec.name, &spec.route_entries)?;
        }
        Ok(table)
    }

    fn validate(&self) -> PlanResult<()> {
        let mut seen = BTreeSet::new();
        for spec in &self.units {
            if spec.name.trim().is_empty() {
                return Err(PlanError::ConfigValidation("compute unit name cannot be empty".into()));
            }
            if spec.name.eq_ignore_ascii_case(AUTHORIZER) || spec.function_id() == AUTHORIZER_FUNCTION_ID {
                return Err(PlanError::ConfigValidation(format!(
                    "compute unit name '{}' is reserved for the authorization gate",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(PlanError::ConfigValidation(format!(
                    "compute unit '{}' is declared more than once",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// `arn:aws:apigateway:<region>:lambda:path/2015-03-31/functions/<arn>/invocations`
fn invocation_uri(region: &str, function_arn: Value) -> Value {
    Value::join(vec![
        Value::from(format!(
            "arn:aws:apigateway:{}:lambda:path/2015-03-31/functions/",
            region
        )),
        function_arn,
        Value::from("/invocations"),
    ])
}

/// `V1AccountsIdGetMethod` for `GET /v1/accounts/{id}`.
fn method_id(entry: &RouteEntry) -> String {
    let mut id = String::new();
    for segment in entry.full_path().split(|c: char| !c.is_ascii_alphanumeric()) {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            id.push(first.to_ascii_uppercase());
            id.extend(chars);
        }
    }
    let method = entry.method.as_str();
    id.push_str(&method[..1]);
    id.push_str(&method[1..].to_ascii_lowercase());
    id.push_str("Method");
    id
}

/// Method ids in table order. Routes whose readable ids coincide get a
/// digest of their method and full path appended.
fn method_ids(routes: &RouteTable) -> Vec<String> {
    let readable: Vec<String> = routes.entries().map(|(_, entry)| method_id(entry)).collect();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for id in &readable {
        *counts.entry(id.clone()).or_default() += 1;
    }

    routes
        .entries()
        .zip(readable)
        .map(|((_, entry), id)| {
            if counts.get(&id).copied().unwrap_or(0) > 1 {
                let suffix = route_digest(entry);
                format!("{}{}", id, suffix)
            } else {
                id
            }
        })
        .collect()
}

fn route_digest(entry: &RouteEntry) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(entry.full_path().as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

pub struct ComputeFleetProvisioner {
    catalog: FleetCatalog,
}

impl ComputeFleetProvisioner {
    pub fn new(catalog: FleetCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &FleetCatalog {
        &self.catalog
    }

    fn tracing_config(ctx: &BuildContext<'_>) -> Value {
        let mode = if ctx.profile().features.tracing { "Active" } else { "PassThrough" };
        Value::map([("Mode", mode)])
    }

    fn add_authorizer(&self, ctx: &BuildContext<'_>, unit: &mut DeployUnit) -> PlanResult<()> {
        let env = ctx.environment();
        let profile = ctx.profile();

        unit.add(
            Resource::new(AUTHORIZER_FUNCTION_ID, ResourceKind::Function)
                .prop("FunctionName", format!("finsight-{}-{}", AUTHORIZER, env))
                .prop("Runtime", "nodejs18.x")
                .prop("Handler", "index.handler")
                .prop("Code", "lambda/authorizer")
                .prop("MemorySize", AUTHORIZER_MEMORY)
                .prop("Timeout", AUTHORIZER_TIMEOUT)
                .prop("TracingConfig", Self::tracing_config(ctx))
                .prop(
                    "Environment",
                    Value::map([(
                        "Variables",
                        Value::map([
                            ("AUTH0_DOMAIN", profile.auth0_domain.as_str()),
                            ("AUTH0_AUDIENCE", profile.auth0_audience.as_str()),
                        ]),
                    )]),
                ),
        )?;
        let authorizer_arn = unit.attr(AUTHORIZER_FUNCTION_ID, "Arn");

        unit.add(
            Resource::new(AUTHORIZER_ID, ResourceKind::ApiAuthorizer)
                .prop("Name", format!("finsight-authorizer-{}", env))
                .prop("Type", "TOKEN")
                .prop("RestApiId", unit.attr(API_ID, "RestApiId"))
                .prop("IdentitySource", "method.request.header.Authorization")
                .prop("AuthorizerResultTtlInSeconds", AUTHORIZER_CACHE_TTL)
                .prop("AuthorizerUri", invocation_uri(ctx.region(), authorizer_arn.clone()))
                .depends_on(API_ID)
                .depends_on(AUTHORIZER_FUNCTION_ID),
        )?;

        unit.add(
            Resource::new("AuthorizerInvokePermission", ResourceKind::FunctionPermission)
                .prop("FunctionName", authorizer_arn)
                .prop("Action", "lambda:InvokeFunction")
                .prop("Principal", "apigateway.amazonaws.com")
                .prop(
                    "SourceArn",
                    Value::join(vec![unit.attr(API_ID, "ExecutionArn"), Value::from("/authorizers/*")]),
                ),
        )?;
        Ok(())
    }

    fn add_function(
        &self,
        ctx: &BuildContext<'_>,
        unit: &mut DeployUnit,
        spec: &ComputeUnitSpec,
        base_env: &BTreeMap<String, Value>,
        vpc_config: &Value,
        credential_ref: &Value,
    ) -> PlanResult<()> {
        let lambda = &ctx.profile().lambda_config;
        let limits = spec.resource_limits.unwrap_or(ResourceLimits {
            memory: lambda.memory_size,
            timeout_seconds: lambda.timeout,
        });

        let mut variables = base_env.clone();
        variables.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let function_id = spec.function_id();
        unit.add(
            Resource::new(&function_id, ResourceKind::Function)
                .prop("FunctionName", format!("finsight-{}-{}", spec.name, ctx.environment()))
                .prop("Runtime", FLEET_RUNTIME)
                .prop("Handler", "bootstrap")
                .prop("Code", format!("lambda/{}", spec.name))
                .prop("MemorySize", limits.memory)
                .prop("Timeout", limits.timeout_seconds)
                .prop("VpcConfig", vpc_config.clone())
                .prop("TracingConfig", Self::tracing_config(ctx))
                .prop("Environment", Value::map([("Variables", Value::Map(variables))])),
        )?;

        unit.add(secret_read_policy(
            &format!("{}SecretRead", spec.name),
            credential_ref.clone(),
            vec![unit.attr(&function_id, "RoleName")],
        ))?;

        unit.add(
            Resource::new(format!("{}InvokePermission", spec.name), ResourceKind::FunctionPermission)
                .prop("FunctionName", unit.attr(&function_id, "Arn"))
                .prop("Action", "lambda:InvokeFunction")
                .prop("Principal", "apigateway.amazonaws.com")
                .prop(
                    "SourceArn",
                    Value::join(vec![unit.attr(API_ID, "ExecutionArn"), Value::from("/*/*/*")]),
                ),
        )?;

        debug!(
            "Function {} ({} MB, {} s, {} route(s))",
            spec.name,
            limits.memory,
            limits.timeout_seconds,
            spec.route_entries.len()
        );
        Ok(())
    }

    fn export_function(&self, ctx: &BuildContext<'_>, unit: &mut DeployUnit, name: &str, function_id: &str) {
        unit.export(
            format!("function.{}.name", name),
            format!("finsight-{}-{}", name, ctx.environment()),
            format!("Function name of {}", name),
        );
        let arn = unit.attr(function_id, "Arn");
        unit.export(format!("function.{}.arn", name), arn, format!("Function ARN of {}", name));
        let role = unit.attr(function_id, "RoleName");
        unit.export(format!("function.{}.role", name), role, format!("Execution role of {}", name));
    }
}

impl Default for ComputeFleetProvisioner {
    fn default() -> Self {
        Self::new(FleetCatalog::standard())
    }
}

impl UnitBuilder for ComputeFleetProvisioner {
    fn name(&self) -> &str {
        COMPUTE
    }

    fn description(&self) -> &str {
        "Function fleet and REST API"
    }

    fn depends_on(&self) -> Vec<String> {
        vec![NETWORK.to_string(), DATASTORE.to_string()]
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        self.catalog.validate()?;
        let routes = self.catalog.route_table()?;

        let env = ctx.environment();
        let region = ctx.region();
        let mut unit = ctx
            .new_unit("ApiStack")
            .with_description(format!("FinSight API for {}", env));

        let private_subnets = unit.import(NETWORK, "privateSubnets");
        let compute_acl = unit.import(NETWORK, "computeAcl");
        let endpoint_host = unit.import(DATASTORE, "endpointHost");
        let credential_ref = unit.import(DATASTORE, "credentialRef");

        let api_name = format!("finsight-api-{}", env);
        unit.add(
            Resource::new(API_ID, ResourceKind::RestApi)
                .prop("Name", api_name.as_str())
                .prop("Description", format!("FinSight REST API for {}", env))
                .prop(
                    "EndpointConfiguration",
                    Value::map([("Types", Value::list(vec!["REGIONAL"]))]),
                )
                .prop(
                    "Cors",
                    Value::map([
                        ("AllowOrigins", Value::list(vec!["*"])),
                        ("AllowMethods", Value::list(CORS_ALLOW_METHODS.iter().copied())),
                        ("AllowHeaders", Value::list(CORS_ALLOW_HEADERS.iter().copied())),
                        ("AllowCredentials", Value::from(true)),
                    ]),
                ),
        )?;

        self.add_authorizer(ctx, &mut unit)?;

        let base_env: BTreeMap<String, Value> = [
            ("DB_ENDPOINT".to_string(), endpoint_host),
            ("DB_SECRET_ARN".to_string(), credential_ref.clone()),
            ("ENVIRONMENT".to_string(), Value::from(env)),
        ]
        .into_iter()
        .collect();
        let vpc_config = Value::map([
            ("SubnetIds", private_subnets),
            ("SecurityGroupIds", Value::list(vec![compute_acl])),
        ]);

        for spec in &self.catalog.units {
            self.add_function(ctx, &mut unit, spec, &base_env, &vpc_config, &credential_ref)?;
        }

        let ids = method_ids(&routes);
        for ((owner, entry), id) in routes.entries().zip(&ids) {
            let function_id = format!("{}Function", owner);
            let mut method = Resource::new(id, ResourceKind::ApiMethod)
                .prop("RestApiId", unit.attr(API_ID, "RestApiId"))
                .prop("HttpMethod", entry.method.as_str())
                .prop("ResourcePath", entry.full_path())
                .prop(
                    "Integration",
                    Value::map([
                        ("Type", Value::from("AWS_PROXY")),
                        ("IntegrationHttpMethod", Value::from("POST")),
                        ("Uri", invocation_uri(region, unit.attr(&function_id, "Arn"))),
                    ]),
                )
                .depends_on(API_ID)
                .depends_on(&function_id);
            method = if entry.auth_required {
                method
                    .prop("AuthorizationType", "CUSTOM")
                    .prop("AuthorizerId", unit.attr(AUTHORIZER_ID, "AuthorizerId"))
                    .depends_on(AUTHORIZER_ID)
            } else {
                method.prop("AuthorizationType", "NONE")
            };
            unit.add(method)?;
        }

        let mut stage = Resource::new(STAGE_ID, ResourceKind::ApiStage)
            .prop("RestApiId", unit.attr(API_ID, "RestApiId"))
            .prop("StageName", API_STAGE_NAME)
            .prop("TracingEnabled", ctx.profile().features.tracing);
        for id in &ids {
            stage = stage.depends_on(id);
        }
        unit.add(stage)?;

        let api_id = unit.attr(API_ID, "RestApiId");
        unit.export("apiId", api_id.clone(), "REST API id");
        unit.export("apiName", api_name.as_str(), "REST API name");
        unit.export(
            "apiUrl",
            Value::join(vec![
                Value::from("https://"),
                api_id.clone(),
                Value::from(format!(".execute-api.{}.amazonaws.com/{}/", region, API_STAGE_NAME)),
            ]),
            "REST API base URL",
        );
        unit.export("apiStageName", API_STAGE_NAME, "Deployment stage");
        unit.export(
            "apiArn",
            Value::join(vec![
                Value::from(format!("arn:aws:apigateway:{}::/restapis/", region)),
                api_id,
            ]),
            "REST API ARN",
        );
        let authorizer_id = unit.attr(AUTHORIZER_ID, "AuthorizerId");
        unit.export("authorizerId", authorizer_id, "TOKEN authorizer id");

        let mut function_names: Vec<String> = Vec::with_capacity(self.catalog.units.len() + 1);
        for spec in &self.catalog.units {
            self.export_function(ctx, &mut unit, &spec.name, &spec.function_id());
            function_names.push(spec.name.clone());
        }
        self.export_function(ctx, &mut unit, AUTHORIZER, AUTHORIZER_FUNCTION_ID);
        function_names.push(AUTHORIZER.to_string());
        unit.export("functionNames", Value::list(function_names), "Fleet functions in order");

        info!(
            "Compute fleet for {}: {} function(s), {} route(s)",
            env,
            self.catalog.units.len() + 1,
            routes.len()
        );
        Ok(unit)
    }
}
