//! Cross-unit reference table and its one-shot resolution.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::unit::{DeployUnit, OutputRef};
use crate::value::Value;

/// Consumer side of a cross reference.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsumerRef {
    pub unit: String,
    pub input: String,
}

/// A producer output bound to a consumer input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossReference {
    pub producer: OutputRef,
    pub consumer: ConsumerRef,
}

impl std::fmt::Display for CrossReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}.{}",
            self.producer, self.consumer.unit, self.consumer.input
        )
    }
}

/// Resolves every input placeholder across a dependency-ordered unit list.
pub struct ReferenceResolver;

impl ReferenceResolver {
    /// Substitute inputs in place and return the reference table.
    ///
    /// `units` must be in dependency order. Fails on the first reference
    /// that cannot be satisfied; the units are left partially rewritten in
    /// that case and must be discarded.
    pub fn resolve(units: &mut [DeployUnit]) -> PlanResult<Vec<CrossReference>> {
        let mut produced: BTreeMap<OutputRef, Value> = BTreeMap::new();
        let mut known_resources: BTreeSet<(String, String)> = BTreeSet::new();
        let mut seen_units: BTreeSet<String> = BTreeSet::new();
        let mut references = Vec::new();

        for unit in units.iter_mut() {
            let bindings = Self::bind_inputs(unit, &produced, &seen_units, &mut references)?;

            let consumer = unit.name.clone();
            let mut lookup = |name: &str| -> PlanResult<Value> {
                bindings.get(name).cloned().ok_or_else(|| {
                    PlanError::unresolved(&consumer, name, "input is not declared by the unit")
                })
            };

            for resource in unit.resources.iter_mut() {
                for value in resource.properties.values_mut() {
                    value.resolve_inputs(&mut lookup)?;
                }
            }
            for output in unit.outputs.values_mut() {
                output.value.resolve_inputs(&mut lookup)?;
            }

            for resource in &unit.resources {
                known_resources.insert((unit.name.clone(), resource.id.clone()));
            }
            Self::check_local_dependencies(unit)?;
            Self::check_attrs(unit, &known_resources)?;

            for (name, output) in &unit.outputs {
                produced.insert(OutputRef::new(&unit.name, name), output.value.clone());
            }
            seen_units.insert(unit.name.clone());
            debug!("Resolved {} input(s) of unit {}", bindings.len(), unit.name);
        }

        Ok(references)
    }

    fn bind_inputs(
        unit: &DeployUnit,
        produced: &BTreeMap<OutputRef, Value>,
        seen_units: &BTreeSet<String>,
        references: &mut Vec<CrossReference>,
    ) -> PlanResult<BTreeMap<String, Value>> {
        let mut bindings = BTreeMap::new();

        for (input, producer) in &unit.inputs {
            if !unit.depends_on.contains(&producer.unit) {
                return Err(PlanError::unresolved(
                    &unit.name,
                    producer.to_string(),
                    format!("'{}' is not a declared dependency", producer.unit),
                ));
            }
            if !seen_units.contains(&producer.unit) {
                return Err(PlanError::unresolved(
                    &unit.name,
                    producer.to_string(),
                    format!("unit '{}' is not built before '{}'", producer.unit, unit.name),
                ));
            }
            let value = produced.get(producer).ok_or_else(|| {
                PlanError::unresolved(
                    &unit.name,
                    producer.to_string(),
                    format!("unit '{}' declares no output '{}'", producer.unit, producer.output),
                )
            })?;

            bindings.insert(input.clone(), value.clone());
            references.push(CrossReference {
                producer: producer.clone(),
                consumer: ConsumerRef {
                    unit: unit.name.clone(),
                    input: input.clone(),
                },
            });
        }

        Ok(bindings)
    }

    fn check_local_dependencies(unit: &DeployUnit) -> PlanResult<()> {
        for resource in &unit.resources {
            for dependency in &resource.depends_on {
                if unit.resource(dependency).is_none() {
                    return Err(PlanError::unresolved(
                        &unit.name,
                        format!("{}/{}", unit.name, dependency),
                        format!("resource '{}' depends on an unknown resource", resource.id),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_attrs(unit: &DeployUnit, known: &BTreeSet<(String, String)>) -> PlanResult<()> {
        let values = unit
            .resources
            .iter()
            .flat_map(|r| r.properties.values())
            .chain(unit.outputs.values().map(|o| &o.value));

        for value in values {
            for attr in value.attrs() {
                if !known.contains(&(attr.unit.clone(), attr.resource.clone())) {
                    return Err(PlanError::unresolved(
                        &unit.name,
                        attr.key(),
                        "attribute names a resource that does not exist",
                    ));
                }
            }
        }
        Ok(())
    }
}
