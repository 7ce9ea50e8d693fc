//! Profile validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::EnvironmentProfile;

/// Validation result with details.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.valid {
            self.valid = false;
        }
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

fn environment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]{0,31}$").expect("valid regex"))
}

fn region_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("valid regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").expect("valid regex")
    })
}

/// Validator for environment profiles.
pub struct ProfileValidator;

impl ProfileValidator {
    /// Validate a complete profile.
    pub fn validate(profile: &EnvironmentProfile) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.merge(Self::validate_identity(profile));
        result.merge(Self::validate_auth(profile));
        result.merge(Self::validate_sizing(profile));
        result.merge(Self::validate_email(profile));

        result
    }

    /// Validate environment name and region.
    pub fn validate_identity(profile: &EnvironmentProfile) -> ValidationResult {
        let mut result = ValidationResult::new();

        if profile.environment.is_empty() {
            result.add_error("environment cannot be empty");
        } else if !environment_pattern().is_match(&profile.environment) {
            result.add_error(format!(
                "environment '{}' must be lowercase alphanumeric with dashes",
                profile.environment
            ));
        }

        if profile.region.is_empty() {
            result.add_error("region cannot be empty");
        } else if !region_pattern().is_match(&profile.region) {
            result.add_error(format!("region '{}' is not a valid region id", profile.region));
        }

        if let Some(domain) = &profile.custom_domain {
            if domain.trim().is_empty() || !domain.contains('.') {
                result.add_error(format!("customDomain '{}' is not a valid domain", domain));
            }
        }

        if profile.github_owner.is_none() || profile.repository_name.is_none() {
            result.add_warning("githubOwner/repositoryName not set; frontend hosting cannot be linked");
        }

        result
    }

    /// Validate identity provider settings.
    pub fn validate_auth(profile: &EnvironmentProfile) -> ValidationResult {
        let mut result = ValidationResult::new();

        if profile.auth0_domain.trim().is_empty() {
            result.add_error("auth0Domain cannot be empty");
        }
        if profile.auth0_audience.trim().is_empty() {
            result.add_error("auth0Audience cannot be empty");
        }
        if profile.auth0_client_id.trim().is_empty() {
            result.add_error("auth0ClientId cannot be empty");
        }

        result
    }

    /// Validate database and compute sizing.
    pub fn validate_sizing(profile: &EnvironmentProfile) -> ValidationResult {
        let mut result = ValidationResult::new();

        if profile.database_config.instance_type.trim().is_empty() {
            result.add_error("databaseConfig.instanceType cannot be empty");
        }

        let lambda = &profile.lambda_config;
        if !(128..=10240).contains(&lambda.memory_size) {
            result.add_error(format!(
                "lambdaConfig.memorySize must be between 128 and 10240 MB, got {}",
                lambda.memory_size
            ));
        }
        if !(1..=900).contains(&lambda.timeout) {
            result.add_error(format!(
                "lambdaConfig.timeout must be between 1 and 900 seconds, got {}",
                lambda.timeout
            ));
        }

        for (metric, value) in &profile.monitoring.threshold_overrides {
            if value.threshold.is_none() && value.evaluation_periods.is_none() {
                result.add_warning(format!("threshold override for '{}' changes nothing", metric));
            }
        }

        result
    }

    /// Validate email sending settings.
    pub fn validate_email(profile: &EnvironmentProfile) -> ValidationResult {
        let mut result = ValidationResult::new();
        let ses = &profile.ses_config;

        if !email_pattern().is_match(&ses.from_email) {
            result.add_error(format!("sesConfig.fromEmail '{}' is not a valid address", ses.from_email));
        }
        if ses.sending_quota == 0 {
            result.add_error("sesConfig.sendingQuota must be greater than zero");
        }
        if ses.sending_rate == 0 {
            result.add_error("sesConfig.sendingRate must be greater than zero");
        } else if ses.sending_rate > ses.sending_quota {
            result.add_warning(format!(
                "sesConfig.sendingRate ({}) exceeds sendingQuota ({})",
                ses.sending_rate, ses.sending_quota
            ));
        }

        if let Some(alert) = &profile.monitoring.alert_email {
            if !email_pattern().is_match(alert) {
                result.add_error(format!("monitoring.alertEmail '{}' is not a valid address", alert));
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_profile() -> EnvironmentProfile {
        EnvironmentProfile::new("dev", "ap-northeast-1").with_auth0(
            "finsight.auth0.com",
            "https://api.finsight",
            "client",
        )
    }

    #[test]
    fn test_valid_profile() {
        let result = ProfileValidator::validate(&valid_profile());
        assert!(result.valid, "unexpected errors: {:?}", result.errors);
        assert!(!result.warnings.is_empty()); // No github settings
    }

    #[test]
    fn test_missing_auth() {
        let profile = EnvironmentProfile::new("dev", "ap-northeast-1");
        let result = ProfileValidator::validate(&profile);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_invalid_environment_name() {
        let mut profile = valid_profile();
        profile.environment = "Prod Env".to_string();
        let result = ProfileValidator::validate(&profile);
        assert!(!result.valid);
    }

    #[test]
    fn test_lambda_bounds() {
        let profile = valid_profile().with_lambda(64, 1200);
        let result = ProfileValidator::validate_sizing(&profile);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_sending_rate_above_quota_warns() {
        let mut profile = valid_profile();
        profile.ses_config.sending_rate = 500;
        let result = ProfileValidator::validate_email(&profile);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("sendingRate (500)"));
    }
}
