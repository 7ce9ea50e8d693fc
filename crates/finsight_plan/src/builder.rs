//! Unit builders and the context they build in.
//!
//! A builder turns an environment profile into exactly one [`DeployUnit`].
//!
//! # Builder Lifecycle
//!
//! 1. **Registration**: builders are registered with a `BuilderRegistry`.
//! 2. **Ordering**: the `DependencyResolver` orders them by `depends_on()`.
//! 3. **Build**: `build` is called once with a [`BuildContext`] that exposes
//!    only the outputs of the builder's declared dependencies.
//!
//! # Example
//!
//! ```rust,ignore
//! use finsight_plan::{BuildContext, DeployUnit, PlanResult, UnitBuilder};
//!
//! struct Bucket;
//!
//! impl UnitBuilder for Bucket {
//!     fn name(&self) -> &str { "bucket" }
//!     fn description(&self) -> &str { "Static assets" }
//!
//!     fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
//!         Ok(ctx.new_unit("BucketStack"))
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use finsight_profile::{EnvironmentProfile, Tier};

use crate::error::{PlanError, PlanResult};
use crate::unit::DeployUnit;
use crate::value::Value;

/// Tag applied to every unit with the project name.
pub const PROJECT_TAG: &str = "FinSight";

/// Produces one deploy unit from a profile.
pub trait UnitBuilder: Send + Sync {
    /// Unit name, unique within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Names of units whose outputs this builder consumes.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit>;
}

/// Read-only view handed to a builder.
pub struct BuildContext<'a> {
    profile: &'a EnvironmentProfile,
    unit_name: String,
    depends_on: Vec<String>,
    dependencies: BTreeMap<String, &'a DeployUnit>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        profile: &'a EnvironmentProfile,
        unit_name: impl Into<String>,
        depends_on: Vec<String>,
        dependencies: BTreeMap<String, &'a DeployUnit>,
    ) -> Self {
        Self {
            profile,
            unit_name: unit_name.into(),
            depends_on,
            dependencies,
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        self.profile
    }

    pub fn environment(&self) -> &str {
        &self.profile.environment
    }

    pub fn region(&self) -> &str {
        &self.profile.region
    }

    pub fn tier(&self) -> Tier {
        self.profile.tier()
    }

    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    /// Start the unit for this builder: `<stack_prefix>-<env>`, declared
    /// dependencies and the standard tags.
    pub fn new_unit(&self, stack_prefix: &str) -> DeployUnit {
        let mut unit = DeployUnit::new(
            &self.unit_name,
            format!("{}-{}", stack_prefix, self.environment()),
        )
        .with_tag("Environment", self.environment())
        .with_tag("Project", PROJECT_TAG);

        for dependency in &self.depends_on {
            unit = unit.with_dependency(dependency);
        }
        unit
    }

    /// A dependency's unit, if it is declared and built.
    pub fn dependency(&self, unit: &str) -> PlanResult<&DeployUnit> {
        self.dependencies.get(unit).copied().ok_or_else(|| {
            PlanError::unresolved(
                &self.unit_name,
                unit,
                format!("'{}' is not a declared dependency", unit),
            )
        })
    }

    /// Value of an output declared by a dependency.
    ///
    /// Use this for structure the builder needs at build time (lists of
    /// names). Values wired into resources go through `DeployUnit::import`.
    pub fn output(&self, unit: &str, output: &str) -> PlanResult<&Value> {
        self.dependency(unit)?.output(output).ok_or_else(|| {
            PlanError::unresolved(
                &self.unit_name,
                format!("{}.{}", unit, output),
                format!("unit '{}' declares no output '{}'", unit, output),
            )
        })
    }

    /// A dependency output that must be a list of literal strings.
    pub fn string_list(&self, unit: &str, output: &str) -> PlanResult<Vec<String>> {
        let value = self.output(unit, output)?;
        value
            .as_list()
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(String::from))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                PlanError::unresolved(
                    &self.unit_name,
                    format!("{}.{}", unit, output),
                    "expected a list of strings",
                )
            })
    }
}
