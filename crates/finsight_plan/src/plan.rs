//! The compiled, immutable deployment plan.

use std::collections::BTreeMap;

use finsight_profile::Tier;
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::reference::CrossReference;
use crate::resource::Resource;
use crate::unit::DeployUnit;
use crate::value::Value;

/// Ordered, fully resolved output of compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub environment: String,
    pub region: String,
    pub tier: Tier,
    /// Units in dependency order
    pub units: Vec<DeployUnit>,
    pub references: Vec<CrossReference>,
}

impl Plan {
    pub fn unit(&self, name: &str) -> Option<&DeployUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn unit_names(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.name.as_str()).collect()
    }

    /// Named exports per unit.
    pub fn exports(&self) -> BTreeMap<&str, BTreeMap<&str, &Value>> {
        self.units
            .iter()
            .map(|u| {
                let outputs = u
                    .outputs
                    .iter()
                    .map(|(k, o)| (k.as_str(), &o.value))
                    .collect();
                (u.name.as_str(), outputs)
            })
            .collect()
    }

    /// Every resource paired with its owning unit name.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.units
            .iter()
            .flat_map(|u| u.resources.iter().map(move |r| (u.name.as_str(), r)))
    }

    pub fn resource_count(&self) -> usize {
        self.units.iter().map(|u| u.resources.len()).sum()
    }

    /// Canonical JSON rendering.
    pub fn to_json(&self) -> PlanResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlanError::Serialization(e.to_string()))
    }

    pub fn from_json(json: &str) -> PlanResult<Self> {
        serde_json::from_str(json).map_err(|e| PlanError::Serialization(e.to_string()))
    }

    /// One line per unit, for terminal output.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Plan for {} ({}, {}): {} unit(s), {} resource(s), {} reference(s)",
            self.environment,
            self.region,
            self.tier,
            self.units.len(),
            self.resource_count(),
            self.references.len()
        )];
        for unit in &self.units {
            let deps = if unit.depends_on.is_empty() {
                String::new()
            } else {
                format!(" <- {}", unit.depends_on.join(", "))
            };
            lines.push(format!(
                "  {} [{}]: {} resource(s), {} output(s){}",
                unit.name,
                unit.stack_name,
                unit.resources.len(),
                unit.outputs.len(),
                deps
            ));
        }
        lines.join("\n")
    }
}
