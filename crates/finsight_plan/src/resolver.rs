//! Topological ordering of registered builders.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::{PlanError, PlanResult};
use crate::registry::BuilderRegistry;

/// Orders builders so every unit comes after the units it depends on.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Return builder names in dependency order.
    ///
    /// Among units that are ready at the same time the one registered first
    /// wins, so the order is deterministic.
    pub fn order(registry: &BuilderRegistry) -> PlanResult<Vec<String>> {
        let names: Vec<String> = registry.names().into_iter().map(String::from).collect();
        let position: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        // deps[i] = positions that unit i depends on
        let mut deps: Vec<BTreeSet<usize>> = Vec::with_capacity(names.len());
        for builder in registry.builders() {
            let mut set = BTreeSet::new();
            for dependency in builder.depends_on() {
                let index = position.get(dependency.as_str()).ok_or_else(|| {
                    PlanError::unresolved(
                        builder.name(),
                        &dependency,
                        format!("'{}' depends on unregistered unit '{}'", builder.name(), dependency),
                    )
                })?;
                set.insert(*index);
            }
            deps.push(set);
        }

        let mut remaining: Vec<usize> = deps.iter().map(|d| d.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (i, set) in deps.iter().enumerate() {
            for &d in set {
                dependents[d].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..names.len()).filter(|&i| remaining[i] == 0).collect();
        let mut ordered = Vec::with_capacity(names.len());

        while let Some(next) = ready.pop_first() {
            ordered.push(next);
            for &dependent in &dependents[next] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if ordered.len() < names.len() {
            let cycle = Self::find_cycle(&deps, &remaining)
                .into_iter()
                .map(|i| names[i].clone())
                .collect();
            return Err(PlanError::DependencyCycle { cycle });
        }

        let ordered: Vec<String> = ordered.into_iter().map(|i| names[i].clone()).collect();
        debug!("Unit order: {}", ordered.join(" -> "));
        Ok(ordered)
    }

    /// Walk unresolved dependencies until a unit repeats.
    fn find_cycle(deps: &[BTreeSet<usize>], remaining: &[usize]) -> Vec<usize> {
        let start = match (0..deps.len()).find(|&i| remaining[i] > 0) {
            Some(start) => start,
            None => return Vec::new(),
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            let next = deps[current].iter().copied().find(|&d| remaining[d] > 0);
            let Some(next) = next else {
                return path;
            };
            if let Some(at) = path.iter().position(|&p| p == next) {
                let mut cycle = path.split_off(at);
                cycle.push(next);
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }
}
