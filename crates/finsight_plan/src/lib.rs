//! # finsight_plan
//!
//! Deploy-unit composition and plan compilation.
//!
//! This crate provides:
//! - The value, resource and deploy unit model
//! - Unit builders and their registry
//! - Dependency ordering and cross-reference resolution
//! - The plan compiler
//! - Tier policy tables
//! - Change sets and the executor contract
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use finsight_plan::{BuilderRegistry, PlanCompiler};
//!
//! let registry = BuilderRegistry::new().with(Arc::new(MyBuilder));
//! let plan = PlanCompiler::new(Arc::new(registry)).compile(&profile)?;
//! println!("{}", plan.to_json()?);
//! ```

pub mod builder;
pub mod changeset;
pub mod compiler;
pub mod error;
pub mod executor;
pub mod plan;
pub mod policy;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod unit;
pub mod value;

pub use builder::{BuildContext, UnitBuilder, PROJECT_TAG};
pub use changeset::{resource_key, ChangeAction, ChangeSet, LiveResource, LiveState, ResourceChange};
pub use compiler::PlanCompiler;
pub use error::{PlanError, PlanResult};
pub use executor::{ApplyOutcome, Executor, InMemoryExecutor};
pub use plan::Plan;
pub use policy::PolicyTable;
pub use reference::{ConsumerRef, CrossReference, ReferenceResolver};
pub use registry::BuilderRegistry;
pub use resolver::DependencyResolver;
pub use resource::{RemovalPolicy, Resource, ResourceKind};
pub use unit::{DeployUnit, Output, OutputRef};
pub use value::{AttrRef, InputRef, Join, Value};
