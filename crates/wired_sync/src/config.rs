//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Deployment environment. Production hides method exceptions from responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Configuration shared by every component request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub environment: Environment,
    /// Base route; component requests go to `{route}/{alias}/{target}`.
    pub route: String,
    /// Maximum accepted request body (HTTP endpoint only).
    pub max_body_bytes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            route: "/wired".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `WIRED_ENV` and `WIRED_ROUTE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(environment) = std::env::var("WIRED_ENV") {
            config.environment = Environment::parse(&environment);
        }
        if let Ok(route) = std::env::var("WIRED_ROUTE") {
            config.route = route;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.route.starts_with('/') {
            return Err(ConfigError::InvalidRoute(format!("`{}` must start with `/`", self.route)));
        }
        if self.route.len() > 1 && self.route.ends_with('/') {
            return Err(ConfigError::InvalidRoute(format!("`{}` must not end with `/`", self.route)));
        }
        if self.route.contains(':') || self.route.contains('*') {
            return Err(ConfigError::InvalidRoute(format!(
                "`{}` must not contain path parameters",
                self.route
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(ConfigError::InvalidLimit("max_body_bytes cannot be 0".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.route, "/wired");
        assert_eq!(config.environment, Environment::Development);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = RuntimeConfig { route: "wired".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoute(_))));

        config.route = "/wired/".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRoute(_))));

        config.route = "/wired".into();
        config.max_body_bytes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{ "environment": "production" }"#).unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.route, "/wired");
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("PROD"), Environment::Production);
        assert_eq!(Environment::parse("production"), Environment::Production);
        assert_eq!(Environment::parse("local"), Environment::Development);
    }
}
