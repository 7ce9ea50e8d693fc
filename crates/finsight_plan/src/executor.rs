//! Executor contract and an in-memory implementation.
//!
//! An executor converges real resources to a plan. The in-memory executor
//! records applied resources in a [`LiveState`] and never calls out; it backs
//! dry runs and tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::changeset::{ChangeAction, ChangeSet, LiveState};
use crate::error::{PlanError, PlanResult};
use crate::plan::Plan;

/// Result of one apply run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub run_id: Uuid,
    pub environment: String,
    pub applied_at: DateTime<Utc>,
    pub changes: ChangeSet,
}

impl ApplyOutcome {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Converges resources to a plan.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Changes `apply` would make starting from `live`.
    async fn diff(&self, plan: &Plan, live: &LiveState) -> PlanResult<ChangeSet>;

    /// Converge to `plan`. On failure previously applied resources stay as
    /// they were and the run can be repeated.
    async fn apply(&self, plan: &Plan) -> PlanResult<ApplyOutcome>;
}

/// Executor backed by an in-memory live state.
#[derive(Clone, Default)]
pub struct InMemoryExecutor {
    state: Arc<RwLock<LiveState>>,
    history: Arc<RwLock<Vec<ApplyOutcome>>>,
    failing: Arc<RwLock<BTreeSet<String>>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: LiveState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            ..Self::default()
        }
    }

    /// Make applying the resource `unit/id` fail.
    pub fn fail_on(&self, key: impl Into<String>) {
        self.failing.write().insert(key.into());
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    pub fn state(&self) -> LiveState {
        self.state.read().clone()
    }

    pub fn history(&self) -> Vec<ApplyOutcome> {
        self.history.read().clone()
    }
}

#[async_trait]
impl Executor for InMemoryExecutor {
    async fn diff(&self, plan: &Plan, live: &LiveState) -> PlanResult<ChangeSet> {
        Ok(ChangeSet::between(plan, live))
    }

    async fn apply(&self, plan: &Plan) -> PlanResult<ApplyOutcome> {
        let current = self.state();
        let changes = ChangeSet::between(plan, &current);
        let desired = LiveState::from_plan(plan);

        // Stage every change, commit only when all succeed
        let mut staged = current;
        for change in &changes.changes {
            if self.failing.read().contains(&change.key) {
                return Err(PlanError::Apply {
                    resource: change.key.clone(),
                    reason: format!("injected failure during {}", change.action),
                });
            }
            match change.action {
                ChangeAction::Create | ChangeAction::Update => {
                    if let Some(resource) = desired.resources.get(&change.key) {
                        staged.resources.insert(change.key.clone(), resource.clone());
                    }
                }
                ChangeAction::Delete | ChangeAction::Retain => {
                    staged.resources.remove(&change.key);
                }
            }
            debug!("{} {}", change.action.symbol(), change.key);
        }

        *self.state.write() = staged;

        let outcome = ApplyOutcome {
            run_id: Uuid::new_v4(),
            environment: plan.environment.clone(),
            applied_at: Utc::now(),
            changes,
        };
        info!(
            "Applied plan for '{}' (run {}): {} change(s)",
            outcome.environment,
            outcome.run_id,
            outcome.changes.changes.len()
        );
        self.history.write().push(outcome.clone());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceKind};
    use crate::unit::DeployUnit;
    use finsight_profile::Tier;

    fn plan(multi_az: bool) -> Plan {
        let mut unit = DeployUnit::new("datastore", "DatabaseStack-dev");
        unit.add(Resource::new("Secret", ResourceKind::Secret)).unwrap();
        unit.add(Resource::new("Db", ResourceKind::DbInstance).prop("MultiAZ", multi_az))
            .unwrap();
        Plan {
            environment: "dev".into(),
            region: "ap-northeast-1".into(),
            tier: Tier::Development,
            units: vec![unit],
            references: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_apply_then_diff_is_empty() {
        let executor = InMemoryExecutor::new();
        let plan = plan(false);

        let outcome = executor.apply(&plan).await.unwrap();
        assert_eq!(outcome.changes.count(ChangeAction::Create), 2);

        let diff = executor.diff(&plan, &executor.state()).await.unwrap();
        assert!(diff.is_empty());

        let again = executor.apply(&plan).await.unwrap();
        assert!(again.is_noop());
        assert_eq!(executor.history().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_state_untouched() {
        let executor = InMemoryExecutor::new();
        executor.apply(&plan(false)).await.unwrap();
        let before = executor.state();

        executor.fail_on("datastore/Db");
        let err = executor.apply(&plan(true)).await.unwrap_err();
        assert!(matches!(err, PlanError::Apply { .. }));
        assert_eq!(executor.state(), before);

        executor.clear_failures();
        let outcome = executor.apply(&plan(true)).await.unwrap();
        assert_eq!(outcome.changes.count(ChangeAction::Update), 1);
    }
}
