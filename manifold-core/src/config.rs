use std::env;
use std::path::PathBuf;

use crate::errors::{ConfigError, CoreError};

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Global configuration shared by services embedding the rule store.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub environment: Environment,
    pub node_name: String,
    pub http_bind: Option<String>,
    /// Optional path to a rule document (file or directory) imported at boot.
    pub rules_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Loads configuration from `MANIFOLD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_with_prefix("MANIFOLD_")
    }

    /// Loads configuration from env vars prefixed with the provided value.
    pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        let key = |suffix: &str| format!("{}{}", prefix, suffix);

        let environment = env::var(key("ENV"))
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        let node_name = env::var(key("NODE_NAME")).unwrap_or_else(|_| "manifold-node".to_string());
        let http_bind = env::var(key("HTTP_BIND")).ok();
        let rules_path = env::var(key("RULES_PATH")).ok().map(PathBuf::from);

        Ok(Self {
            environment,
            node_name,
            http_bind,
            rules_path,
        })
    }

    /// Whether the service is running in production.
    pub fn is_production(&self) -> bool {
        matches!(self.environment, Environment::Production)
    }
}

/// Helper that loads config and converts to the canonical core error type.
pub fn load_service_config() -> Result<ServiceConfig, CoreError> {
    Ok(ServiceConfig::from_env()?)
}
