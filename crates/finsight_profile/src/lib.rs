//! # finsight_profile
//!
//! Environment profiles for FinSight infrastructure.
//!
//! A profile is the single input that drives plan compilation: region,
//! sizing, email settings, identity provider settings and capability flags
//! for one named environment.
//!
//! ## Example
//!
//! ```rust,no_run
//! use finsight_profile::{FileProfileLoader, ProfileLoader};
//!
//! let loader = FileProfileLoader::new("config");
//! let profile = loader.load("dev").unwrap();
//! println!("{} runs in {} ({})", profile.environment, profile.region, profile.tier());
//! ```

pub mod error;
pub mod loader;
pub mod models;
pub mod validator;

pub use error::{ProfileError, ProfileResult};
pub use loader::{FileProfileLoader, ProfileLoader, PROFILE_EXTENSIONS};
pub use models::*;
pub use validator::{ProfileValidator, ValidationResult};
