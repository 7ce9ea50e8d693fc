//! Builder registry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::builder::UnitBuilder;
use crate::error::{PlanError, PlanResult};

/// Registered builders in registration order.
///
/// Registration order is the tie-break when ordering independent units.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: Vec<Arc<dyn UnitBuilder>>,
    index: HashMap<String, usize>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under its `name()`.
    ///
    /// Re-registering a name replaces the builder and keeps its position.
    pub fn register(&mut self, builder: Arc<dyn UnitBuilder>) {
        let name = builder.name().to_string();
        match self.index.get(&name) {
            Some(&position) => {
                debug!("Replacing builder: {}", name);
                self.builders[position] = builder;
            }
            None => {
                debug!("Registering builder: {}", name);
                self.index.insert(name, self.builders.len());
                self.builders.push(builder);
            }
        }
    }

    pub fn with(mut self, builder: Arc<dyn UnitBuilder>) -> Self {
        self.register(builder);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn UnitBuilder>> {
        self.index.get(name).map(|&i| Arc::clone(&self.builders[i]))
    }

    pub fn get_required(&self, name: &str) -> PlanResult<Arc<dyn UnitBuilder>> {
        self.get(name)
            .ok_or_else(|| PlanError::BuilderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Builder names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.builders.iter().map(|b| b.name()).collect()
    }

    pub fn builders(&self) -> &[Arc<dyn UnitBuilder>] {
        &self.builders
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn UnitBuilder>> {
        let position = self.index.remove(name)?;
        debug!("Unregistering builder: {}", name);
        let removed = self.builders.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("builders", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuildContext;
    use crate::unit::DeployUnit;

    struct Named(&'static str, &'static str);

    impl UnitBuilder for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        fn build(&self, ctx: &BuildContext<'_>) -> PlanResult<DeployUnit> {
            Ok(ctx.new_unit("TestStack"))
        }
    }

    #[test]
    fn test_register_keeps_order() {
        let registry = BuilderRegistry::new()
            .with(Arc::new(Named("b", "")))
            .with(Arc::new(Named("a", "")))
            .with(Arc::new(Named("c", "")));
        assert_eq!(registry.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut registry = BuilderRegistry::new()
            .with(Arc::new(Named("a", "first")))
            .with(Arc::new(Named("b", "")));
        registry.register(Arc::new(Named("a", "second")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get_required("a").unwrap().description(), "second");
    }

    #[test]
    fn test_unregister() {
        let mut registry = BuilderRegistry::new()
            .with(Arc::new(Named("a", "")))
            .with(Arc::new(Named("b", "")))
            .with(Arc::new(Named("c", "")));

        assert!(registry.unregister("a").is_some());
        assert!(registry.unregister("a").is_none());
        assert_eq!(registry.names(), vec!["b", "c"]);
        assert!(registry.get("c").is_some());
        assert!(matches!(
            registry.get_required("a"),
            Err(PlanError::BuilderNotFound(_))
        ));
    }
}
