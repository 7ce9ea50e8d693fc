//! Plan compilation.
//!
//! Compilation is one-shot and pure: validate the profile, order the
//! builders, build each unit against its dependencies' outputs, then
//! resolve the cross-reference table once. Any error aborts before a plan
//! exists.

use std::collections::BTreeMap;
use std::sync::Arc;

use finsight_profile::{EnvironmentProfile, ProfileValidator};
use tracing::{debug, info, warn};

use crate::builder::BuildContext;
use crate::error::{PlanError, PlanResult};
use crate::plan::Plan;
use crate::reference::ReferenceResolver;
use crate::registry::BuilderRegistry;
use crate::resolver::DependencyResolver;
use crate::unit::DeployUnit;

/// Compiles profiles into plans using a fixed builder set.
pub struct PlanCompiler {
    registry: Arc<BuilderRegistry>,
}

impl PlanCompiler {
    pub fn new(registry: Arc<BuilderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    pub fn compile(&self, profile: &EnvironmentProfile) -> PlanResult<Plan> {
        info!(
            "Compiling plan for '{}' ({}, {})",
            profile.environment,
            profile.region,
            profile.tier()
        );

        let validation = ProfileValidator::validate(profile);
        for warning in &validation.warnings {
            warn!("Profile {}: {}", profile.environment, warning);
        }
        if !validation.valid {
            return Err(PlanError::ConfigValidation(validation.errors.join("; ")));
        }

        let order = DependencyResolver::order(&self.registry)?;
        let mut units: Vec<DeployUnit> = Vec::with_capacity(order.len());

        for name in &order {
            let builder = self.registry.get_required(name)?;
            let declared = builder.depends_on();

            let unit = {
                let dependencies: BTreeMap<String, &DeployUnit> = units
                    .iter()
                    .filter(|u| declared.contains(&u.name))
                    .map(|u| (u.name.clone(), u))
                    .collect();
                let ctx = BuildContext::new(profile, name.as_str(), declared.clone(), dependencies);
                builder.build(&ctx)?
            };

            if unit.name != *name {
                return Err(PlanError::UnitMismatch {
                    expected: name.clone(),
                    actual: unit.name,
                });
            }

            let mut unit = unit;
            unit.depends_on = declared;
            info!(
                "Built unit {} ({} resource(s), {} output(s))",
                unit.name,
                unit.resources.len(),
                unit.outputs.len()
            );
            units.push(unit);
        }

        let references = ReferenceResolver::resolve(&mut units)?;
        debug!("Resolved {} cross reference(s)", references.len());

        let plan = Plan {
            environment: profile.environment.clone(),
            region: profile.region.clone(),
            tier: profile.tier(),
            units,
            references,
        };
        info!("{}", plan.summary().lines().next().unwrap_or_default());
        Ok(plan)
    }
}
