//! Live state snapshots and the change sets computed against them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::plan::Plan;
use crate::resource::{RemovalPolicy, ResourceKind};
use crate::value::Value;

/// An applied resource as recorded by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResource {
    pub kind: ResourceKind,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,
}

/// Snapshot of applied resources keyed by `unit/resourceId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveState {
    #[serde(default)]
    pub resources: BTreeMap<String, LiveResource>,
}

impl LiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The state a successful apply of `plan` leaves behind.
    pub fn from_plan(plan: &Plan) -> Self {
        let resources = plan
            .resources()
            .map(|(unit, resource)| {
                (
                    resource_key(unit, &resource.id),
                    LiveResource {
                        kind: resource.kind,
                        properties: resource.properties.clone(),
                        removal_policy: resource.removal_policy,
                    },
                )
            })
            .collect();
        Self { resources }
    }

    pub fn load(path: &Path) -> PlanResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            PlanError::Serialization(format!("{}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> PlanResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PlanError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

pub fn resource_key(unit: &str, resource: &str) -> String {
    format!("{}/{}", unit, resource)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    /// Dropped from the plan but kept because of its removal policy
    Retain,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
            ChangeAction::Retain => "retain",
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            ChangeAction::Create => '+',
            ChangeAction::Update => '~',
            ChangeAction::Delete => '-',
            ChangeAction::Retain => '=',
        }
    }
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChange {
    pub key: String,
    pub kind: ResourceKind,
    pub action: ChangeAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_properties: Vec<String>,
}

/// Differences between a plan and a live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<ResourceChange>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    pub fn between(plan: &Plan, live: &LiveState) -> Self {
        let desired = LiveState::from_plan(plan);
        let mut changes = Vec::new();
        let mut unchanged = Vec::new();

        for (key, want) in &desired.resources {
            match live.resources.get(key) {
                None => changes.push(ResourceChange {
                    key: key.clone(),
                    kind: want.kind,
                    action: ChangeAction::Create,
                    changed_properties: Vec::new(),
                }),
                Some(have) if have == want => unchanged.push(key.clone()),
                Some(have) => changes.push(ResourceChange {
                    key: key.clone(),
                    kind: want.kind,
                    action: ChangeAction::Update,
                    changed_properties: changed_properties(have, want),
                }),
            }
        }

        for (key, have) in &live.resources {
            if desired.resources.contains_key(key) {
                continue;
            }
            let action = match have.removal_policy {
                Some(RemovalPolicy::Retain) => ChangeAction::Retain,
                _ => ChangeAction::Delete,
            };
            changes.push(ResourceChange {
                key: key.clone(),
                kind: have.kind,
                action,
                changed_properties: Vec::new(),
            });
        }

        Self { changes, unchanged }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn report(&self) -> String {
        let mut lines: Vec<String> = self
            .changes
            .iter()
            .map(|c| {
                let detail = if c.changed_properties.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", c.changed_properties.join(", "))
                };
                format!("{} {} [{}]{}", c.action.symbol(), c.key, c.kind, detail)
            })
            .collect();
        lines.push(format!(
            "{} to create, {} to update, {} to delete, {} retained, {} unchanged",
            self.count(ChangeAction::Create),
            self.count(ChangeAction::Update),
            self.count(ChangeAction::Delete),
            self.count(ChangeAction::Retain),
            self.unchanged.len()
        ));
        lines.join("\n")
    }
}

fn changed_properties(have: &LiveResource, want: &LiveResource) -> Vec<String> {
    let keys: BTreeSet<&String> = have.properties.keys().chain(want.properties.keys()).collect();
    let mut changed: Vec<String> = keys
        .into_iter()
        .filter(|k| have.properties.get(*k) != want.properties.get(*k))
        .cloned()
        .collect();
    if have.kind != want.kind {
        changed.insert(0, "<kind>".to_string());
    }
    if have.removal_policy != want.removal_policy {
        changed.push("<removalPolicy>".to_string());
    }
    changed
}
