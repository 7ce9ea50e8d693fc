//! Environment profile data models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};

/// Default email domain used when no custom domain is configured.
pub const DEFAULT_EMAIL_DOMAIN: &str = "finsight.local";

/// Default recipient for development alert subscriptions.
pub const DEFAULT_ALERT_EMAIL: &str = "dev-alerts@finsight.local";

/// The production-like flag of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Production,
    Development,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Production => "production",
            Tier::Development => "development",
        }
    }

    pub fn parse(s: &str) -> ProfileResult<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Tier::Production),
            "development" | "dev" => Ok(Tier::Development),
            other => Err(ProfileError::UnknownTier(other.to_string())),
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Tier::Production, Tier::Development]
    }

    /// Derive the tier from an environment name.
    ///
    /// Only `prod` and `production` are production-like; every other
    /// environment (dev, staging, feature branches) is treated as development.
    pub fn from_environment(environment: &str) -> Self {
        match environment.to_lowercase().as_str() {
            "prod" | "production" => Tier::Production,
            _ => Tier::Development,
        }
    }

    pub fn is_production_like(&self) -> bool {
        matches!(self, Tier::Production)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated configuration for one deployment environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentProfile {
    /// Environment id, e.g. "dev" or "prod"
    pub environment: String,
    /// Cloud region
    pub region: String,
    /// Explicit tier; derived from `environment` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
    pub auth0_domain: String,
    pub auth0_audience: String,
    pub auth0_client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    pub database_config: DatabaseConfig,
    pub lambda_config: LambdaConfig,
    pub ses_config: SesConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl EnvironmentProfile {
    /// Create a profile with development-sized defaults.
    pub fn new(environment: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            region: region.into(),
            tier: None,
            custom_domain: None,
            auth0_domain: String::new(),
            auth0_audience: String::new(),
            auth0_client_id: String::new(),
            github_owner: None,
            repository_name: None,
            database_config: DatabaseConfig::default(),
            lambda_config: LambdaConfig::default(),
            ses_config: SesConfig::default(),
            features: FeatureFlags::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_custom_domain(mut self, domain: impl Into<String>) -> Self {
        self.custom_domain = Some(domain.into());
        self
    }

    pub fn with_auth0(
        mut self,
        domain: impl Into<String>,
        audience: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        self.auth0_domain = domain.into();
        self.auth0_audience = audience.into();
        self.auth0_client_id = client_id.into();
        self
    }

    pub fn with_database(mut self, config: DatabaseConfig) -> Self {
        self.database_config = config;
        self
    }

    pub fn with_lambda(mut self, memory_size: u32, timeout: u32) -> Self {
        self.lambda_config = LambdaConfig {
            memory_size,
            timeout,
        };
        self
    }

    pub fn with_ses(mut self, config: SesConfig) -> Self {
        self.ses_config = config;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.features.tracing = enabled;
        self
    }

    pub fn with_alert_email(mut self, email: impl Into<String>) -> Self {
        self.monitoring.alert_email = Some(email.into());
        self
    }

    pub fn with_threshold_override(mut self, metric: impl Into<String>, value: ThresholdOverride) -> Self {
        self.monitoring.threshold_overrides.insert(metric.into(), value);
        self
    }

    /// Effective tier of this profile.
    pub fn tier(&self) -> Tier {
        self.tier
            .unwrap_or_else(|| Tier::from_environment(&self.environment))
    }

    pub fn is_production_like(&self) -> bool {
        self.tier().is_production_like()
    }

    /// Domain used for the outbound email identity.
    pub fn email_domain(&self) -> &str {
        self.custom_domain.as_deref().unwrap_or(DEFAULT_EMAIL_DOMAIN)
    }

    /// Recipient for direct alert subscriptions.
    pub fn alert_email(&self) -> &str {
        self.monitoring
            .alert_email
            .as_deref()
            .unwrap_or(DEFAULT_ALERT_EMAIL)
    }
}

/// Requested database sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub instance_type: String,
    pub multi_az: bool,
    pub deletion_protection: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            instance_type: "db.t3.micro".to_string(),
            multi_az: false,
            deletion_protection: false,
        }
    }
}

/// Shared compute defaults applied to every function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaConfig {
    /// Memory in MB
    pub memory_size: u32,
    /// Timeout in seconds
    pub timeout: u32,
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            memory_size: 512,
            timeout: 30,
        }
    }
}

/// Transactional email settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SesConfig {
    pub from_email: String,
    /// Messages per 24 hours
    pub sending_quota: u32,
    /// Messages per second
    pub sending_rate: u32,
}

impl Default for SesConfig {
    fn default() -> Self {
        Self {
            from_email: "noreply@finsight.local".to_string(),
            sending_quota: 200,
            sending_rate: 1,
        }
    }
}

/// Capability flags that select stack variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Active tracing on compute units
    #[serde(default = "default_true")]
    pub tracing: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self { tracing: true }
    }
}

fn default_true() -> bool {
    true
}

/// Alerting settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_email: Option<String>,
    /// Per-metric overrides keyed by metric name (e.g. "Errors")
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub threshold_overrides: BTreeMap<String, ThresholdOverride>,
}

/// Override for one alarm template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_periods: Option<u32>,
}
