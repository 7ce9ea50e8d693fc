//! Profile loading from a config directory.
//!
//! Profiles live in `<config_dir>/<environment>.<ext>` where the extension is
//! one of `json`, `yaml`, `yml` or `toml`. JSON is tried first.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ProfileError, ProfileResult};
use crate::models::EnvironmentProfile;
use crate::validator::ProfileValidator;

/// Supported profile file extensions, in lookup order.
pub const PROFILE_EXTENSIONS: &[&str] = &["json", "yaml", "yml", "toml"];

/// Source of environment profiles keyed by environment name.
pub trait ProfileLoader {
    /// Load and validate the profile for `environment`.
    fn load(&self, environment: &str) -> ProfileResult<EnvironmentProfile>;
}

/// Loads profiles from files in a directory.
#[derive(Debug, Clone)]
pub struct FileProfileLoader {
    config_dir: PathBuf,
}

impl FileProfileLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Find the profile file for an environment.
    pub fn profile_path(&self, environment: &str) -> Option<PathBuf> {
        PROFILE_EXTENSIONS
            .iter()
            .map(|ext| self.config_dir.join(format!("{}.{}", environment, ext)))
            .find(|path| path.is_file())
    }

    /// List the environments that have a profile file.
    pub fn available(&self) -> ProfileResult<Vec<String>> {
        if !self.config_dir.is_dir() {
            return Err(ProfileError::ConfigDirNotFound(self.config_dir.clone()));
        }

        let mut environments: Vec<String> = WalkDir::new(&self.config_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map_or(false, |ext| PROFILE_EXTENSIONS.iter().any(|p| ext == *p))
            })
            .filter_map(|e| e.path().file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();

        environments.sort();
        environments.dedup();
        Ok(environments)
    }

    /// Parse a profile file without validating it.
    pub fn read_file(path: &Path) -> ProfileResult<EnvironmentProfile> {
        debug!("Reading profile from {:?}", path);
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let environment = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let invalid = |message: String| ProfileError::Validation {
            environment: environment.clone(),
            errors: vec![format!("{}: {}", path.display(), message)],
        };

        match extension.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| {
                if e.is_data() {
                    invalid(e.to_string())
                } else {
                    ProfileError::InvalidFormat {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                }
            }),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string())),
            "toml" => toml::from_str(&content).map_err(|e| invalid(e.to_string())),
            other => Err(ProfileError::InvalidFormat {
                path: path.to_path_buf(),
                message: format!("unsupported profile extension '{}'", other),
            }),
        }
    }
}

impl ProfileLoader for FileProfileLoader {
    fn load(&self, environment: &str) -> ProfileResult<EnvironmentProfile> {
        let path = self
            .profile_path(environment)
            .ok_or_else(|| ProfileError::NotFound {
                environment: environment.to_string(),
                dir: self.config_dir.clone(),
            })?;

        let profile = Self::read_file(&path)?;

        let mut result = ProfileValidator::validate(&profile);
        if profile.environment != environment {
            result.add_error(format!(
                "profile file for '{}' declares environment '{}'",
                environment, profile.environment
            ));
        }

        for warning in &result.warnings {
            warn!("Profile {}: {}", environment, warning);
        }

        if !result.valid {
            return Err(ProfileError::Validation {
                environment: environment.to_string(),
                errors: result.errors,
            });
        }

        info!("Loaded profile '{}' ({}) from {:?}", environment, profile.tier(), path);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DEV_JSON: &str = r#"{
        "environment": "dev",
        "region": "ap-northeast-1",
        "auth0Domain": "finsight.auth0.com",
        "auth0Audience": "https://api.finsight",
        "auth0ClientId": "abc",
        "databaseConfig": {"instanceType": "db.t3.micro", "multiAz": false, "deletionProtection": false},
        "lambdaConfig": {"memorySize": 512, "timeout": 30},
        "sesConfig": {"fromEmail": "noreply@finsight.local", "sendingQuota": 200, "sendingRate": 1}
    }"#;

    #[test]
    fn test_load_json_profile() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dev.json"), DEV_JSON).unwrap();

        let loader = FileProfileLoader::new(dir.path());
        let profile = loader.load("dev").unwrap();
        assert_eq!(profile.environment, "dev");
        assert_eq!(profile.region, "ap-northeast-1");
    }

    #[test]
    fn test_load_missing_environment() {
        let dir = tempdir().unwrap();
        let loader = FileProfileLoader::new(dir.path());
        let err = loader.load("prod").unwrap_err();
        assert!(matches!(err, ProfileError::NotFound { .. }));
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let dir = tempdir().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(DEV_JSON).unwrap();
        value.as_object_mut().unwrap().remove("sesConfig");
        fs::write(dir.path().join("dev.json"), value.to_string()).unwrap();

        let loader = FileProfileLoader::new(dir.path());
        let err = loader.load("dev").unwrap_err();
        match err {
            ProfileError::Validation { errors, .. } => {
                assert!(errors[0].contains("sesConfig"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_environment_mismatch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("staging.json"), DEV_JSON).unwrap();

        let loader = FileProfileLoader::new(dir.path());
        assert!(matches!(
            loader.load("staging"),
            Err(ProfileError::Validation { .. })
        ));
    }

    #[test]
    fn test_available_environments() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("dev.json"), DEV_JSON).unwrap();
        fs::write(dir.path().join("prod.yaml"), "environment: prod").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let loader = FileProfileLoader::new(dir.path());
        assert_eq!(loader.available().unwrap(), vec!["dev", "prod"]);
    }
}
