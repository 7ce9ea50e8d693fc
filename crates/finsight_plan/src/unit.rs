//! Deploy units: named groups of owned resources with declared outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::resource::{Resource, ResourceKind};
use crate::value::Value;

/// Pointer to an output declared by a unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub unit: String,
    pub output: String,
}

impl OutputRef {
    pub fn new(unit: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            output: output.into(),
        }
    }
}

impl std::fmt::Display for OutputRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.unit, self.output)
    }
}

/// A value a unit makes visible to its dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A named, dependency-ordered group of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployUnit {
    pub name: String,
    pub stack_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Input name -> producer output
    #[serde(default)]
    pub inputs: BTreeMap<String, OutputRef>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Output>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl DeployUnit {
    pub fn new(name: impl Into<String>, stack_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_name: stack_name.into(),
            description: None,
            depends_on: Vec::new(),
            inputs: BTreeMap::new(),
            resources: Vec::new(),
            outputs: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependency(mut self, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        if !self.depends_on.contains(&unit) {
            self.depends_on.push(unit);
        }
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a resource. Resource ids are unique within a unit.
    pub fn add(&mut self, resource: Resource) -> PlanResult<()> {
        if self.resource(&resource.id).is_some() {
            return Err(PlanError::DuplicateResource {
                unit: self.name.clone(),
                resource: resource.id,
            });
        }
        debug!("{}: + {} ({})", self.name, resource.id, resource.kind);
        self.resources.push(resource);
        Ok(())
    }

    /// Declare an input bound to another unit's output and return its placeholder.
    ///
    /// The input is named `<unit>.<output>`; importing the same output twice
    /// yields the same placeholder.
    pub fn import(&mut self, unit: &str, output: &str) -> Value {
        let reference = OutputRef::new(unit, output);
        let name = reference.to_string();
        self.inputs.entry(name.clone()).or_insert(reference);
        Value::input(name)
    }

    pub fn export(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        description: impl Into<String>,
    ) {
        self.outputs.insert(
            name.into(),
            Output {
                value: value.into(),
                description: Some(description.into()),
            },
        );
    }

    /// Deferred attribute of one of this unit's resources.
    pub fn attr(&self, resource: &str, attribute: &str) -> Value {
        Value::attr(&self.name, resource, attribute)
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name).map(|o| &o.value)
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.keys().map(|k| k.as_str()).collect()
    }
}
