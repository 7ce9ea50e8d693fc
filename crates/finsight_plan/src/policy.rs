//! Tier-keyed policy tables.
//!
//! Every environment-dependent decision is a row lookup in a table keyed by
//! [`Tier`]. A table that has no row for the profile's tier is a
//! configuration error, never a silent default.

use std::collections::BTreeMap;

use finsight_profile::Tier;

use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable<T> {
    name: String,
    rows: BTreeMap<Tier, T>,
}

impl<T> PolicyTable<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
        }
    }

    pub fn with_row(mut self, tier: Tier, row: T) -> Self {
        self.rows.insert(tier, row);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn row(&self, tier: Tier) -> PlanResult<&T> {
        self.rows.get(&tier).ok_or_else(|| {
            PlanError::ConfigValidation(format!(
                "policy table '{}' has no row for tier '{}'",
                self.name, tier
            ))
        })
    }

    /// Fail unless every tier has a row.
    pub fn ensure_total(&self) -> PlanResult<()> {
        for tier in Tier::all() {
            self.row(tier)?;
        }
        Ok(())
    }
}
