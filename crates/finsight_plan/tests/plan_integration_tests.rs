//! Integration tests for plan compilation.

use std::sync::Arc;

use finsight_plan::{
    BuildContext, BuilderRegistry, DeployUnit, Executor, InMemoryExecutor, PlanCompiler,
    PlanError, PlanResult, PolicyTable, RemovalPolicy, Resource, ResourceKind, UnitBuilder, Value,
};
use finsight_profile::{EnvironmentProfile, Tier};

struct Base;

impl UnitBuilder for Base {
    fn name(&self) -> &str {
        "base"
    }

    fn description(&self) -> &str {
        "tier-shaped storage"
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let removal = PolicyTable::new("removal")
            .with_row(Tier::Production, RemovalPolicy::Retain)
            .with_row(Tier::Development, RemovalPolicy::Destroy);

        let mut unit = ctx.new_unit("BaseStack");
        unit.add(
            Resource::new("Store", ResourceKind::DbInstance)
                .prop("Name", format!("store-{}", ctx.environment()))
                .with_removal_policy(*removal.row(ctx.tier())?),
        )?;
        unit.export("storeArn", unit.attr("Store", "Arn"), "store");
        unit.export("names", Value::list(vec!["a", "b"]), "names");
        Ok(unit)
    }
}

struct Edge {
    name: &'static str,
    deps: Vec<&'static str>,
}

impl UnitBuilder for Edge {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "consumes base"
    }

    fn depends_on(&self) -> Vec<String> {
        self.deps.iter().map(|d| d.to_string()).collect()
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
        let mut unit = ctx.new_unit("EdgeStack");
        if self.deps.contains(&"base") {
            let names = ctx.string_list("base", "names")?;
            let arn = unit.import("base", "storeArn");
            for name in names {
                unit.add(
                    Resource::new(format!("Policy{}", name), ResourceKind::IamPolicy)
                        .prop("Resource", arn.clone()),
                )?;
            }
        }
        Ok(unit)
    }
}

fn profile(environment: &str) -> EnvironmentProfile {
    EnvironmentProfile::new(environment, "ap-northeast-1").with_auth0(
        "finsight.auth0.com",
        "https://api.finsight",
        "client",
    )
}

fn compiler(builders: Vec<Arc<dyn UnitBuilder>>) -> PlanCompiler {
    let mut registry = BuilderRegistry::new();
    for builder in builders {
        registry.register(builder);
    }
    PlanCompiler::new(Arc::new(registry))
}

#[test]
fn test_compilation_is_deterministic() {
    let compiler = compiler(vec![
        Arc::new(Edge { name: "edge", deps: vec!["base"] }),
        Arc::new(Base),
    ]);

    let first = compiler.compile(&profile("prod")).unwrap().to_json().unwrap();
    let second = compiler.compile(&profile("prod")).unwrap().to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_tier_policy_shapes_resources() {
    let compiler = compiler(vec![Arc::new(Base)]);

    let prod = compiler.compile(&profile("prod")).unwrap();
    let dev = compiler.compile(&profile("dev")).unwrap();

    let store = |plan: &finsight_plan::Plan| {
        plan.unit("base").unwrap().resource("Store").unwrap().removal_policy
    };
    assert_eq!(store(&prod), Some(RemovalPolicy::Retain));
    assert_eq!(store(&dev), Some(RemovalPolicy::Destroy));
}

#[test]
fn test_cycle_aborts_compilation() {
    let compiler = compiler(vec![
        Arc::new(Edge { name: "left", deps: vec!["right"] }),
        Arc::new(Edge { name: "right", deps: vec!["left"] }),
    ]);

    match compiler.compile(&profile("dev")) {
        Err(PlanError::DependencyCycle { cycle }) => {
            assert!(cycle.contains(&"left".to_string()));
            assert!(cycle.contains(&"right".to_string()));
        }
        other => panic!("expected cycle, got {:?}", other.map(|p| p.unit_names().len())),
    }
}

#[test]
fn test_dependency_on_unregistered_unit() {
    let compiler = compiler(vec![Arc::new(Edge { name: "edge", deps: vec!["base"] })]);
    assert!(matches!(
        compiler.compile(&profile("dev")),
        Err(PlanError::UnresolvedReference { .. })
    ));
}

#[test]
fn test_references_are_resolved_in_plan() {
    let compiler = compiler(vec![
        Arc::new(Base),
        Arc::new(Edge { name: "edge", deps: vec!["base"] }),
    ]);
    let plan = compiler.compile(&profile("dev")).unwrap();

    assert_eq!(plan.references.len(), 1);
    for (_, resource) in plan.resources() {
        for value in resource.properties.values() {
            assert!(value.is_resolved());
        }
    }
    let policy = plan.unit("edge").unwrap().resource("Policya").unwrap();
    assert_eq!(
        policy.property("Resource"),
        Some(&Value::attr("base", "Store", "Arn"))
    );
}

#[tokio::test]
async fn test_reapplying_unchanged_profile_is_noop() {
    let compiler = compiler(vec![
        Arc::new(Base),
        Arc::new(Edge { name: "edge", deps: vec!["base"] }),
    ]);
    let executor = InMemoryExecutor::new();

    let plan = compiler.compile(&profile("dev")).unwrap();
    let first = executor.apply(&plan).await.unwrap();
    assert!(!first.is_noop());

    let recompiled = compiler.compile(&profile("dev")).unwrap();
    let diff = executor.diff(&recompiled, &executor.state()).await.unwrap();
    assert!(diff.is_empty());
}
