//! Configuration module for the order service.
//!
//! Configuration is read from a TOML file. Any `${VAR}` or `${VAR:-default}`
//! placeholder is replaced with the matching environment variable before
//! parsing, so secrets such as the Redis URL can stay out of the file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		ConfigError::Parse(err.message().to_string())
	}
}

/// Upper bound accepted for `api.page_size`.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Main configuration structure for the order service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the HTTP API server.
	#[serde(default)]
	pub api: ApiConfig,
}

/// Configuration specific to the service instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Unique identifier for this instance, used in logs.
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound for a single round trip to the backend, in milliseconds.
	#[serde(default = "default_operation_timeout_ms")]
	pub operation_timeout_ms: u64,
}

impl StorageConfig {
	pub fn operation_timeout(&self) -> Duration {
		Duration::from_millis(self.operation_timeout_ms)
	}
}

fn default_operation_timeout_ms() -> u64 {
	5_000
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Number of orders returned per list page.
	#[serde(default = "default_page_size")]
	pub page_size: u64,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub request_timeout_seconds: u64,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_api_host(),
			port: default_api_port(),
			page_size: default_page_size(),
			request_timeout_seconds: default_api_timeout(),
		}
	}
}

impl ApiConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_seconds)
	}
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_page_size() -> u64 {
	50
}

fn default_api_timeout() -> u64 {
	30
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut resolved = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};

		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)));
			},
		};

		resolved.push_str(&input[last_end..whole.start()]);
		resolved.push_str(&value);
		last_end = whole.end();
	}
	resolved.push_str(&input[last_end..]);

	Ok(resolved)
}

impl Config {
	/// Loads configuration from a file, resolving environment variables.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let content = tokio::fs::read_to_string(path.as_ref()).await?;
		content.parse()
	}

	/// Validates the configuration to ensure all required fields are properly set.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.operation_timeout_ms == 0 {
			return Err(ConfigError::Validation(
				"Storage operation_timeout_ms must be greater than 0".into(),
			));
		}

		if self.api.page_size == 0 || self.api.page_size > MAX_PAGE_SIZE {
			return Err(ConfigError::Validation(format!(
				"API page_size must be between 1 and {}",
				MAX_PAGE_SIZE
			)));
		}
		if self.api.request_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"API request_timeout_seconds must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved first and the result is validated.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const MINIMAL: &str = r#"
[service]
id = "orders-test"

[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("ORDER_TEST_HOST", "localhost");
		std::env::set_var("ORDER_TEST_PORT", "6379");

		let input = "url = \"redis://${ORDER_TEST_HOST}:${ORDER_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"redis://localhost:6379\"");

		std::env::remove_var("ORDER_TEST_HOST");
		std::env::remove_var("ORDER_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${ORDER_TEST_MISSING:-fallback}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let result = resolve_env_vars("value = \"${ORDER_TEST_UNSET}\"");
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("ORDER_TEST_UNSET"));
	}

	#[test]
	fn test_defaults_applied() {
		let config: Config = MINIMAL.parse().unwrap();
		assert_eq!(config.service.id, "orders-test");
		assert_eq!(config.storage.operation_timeout(), Duration::from_secs(5));
		assert_eq!(config.api.port, 3000);
		assert_eq!(config.api.page_size, 50);
		assert_eq!(config.api.request_timeout(), Duration::from_secs(30));
	}

	#[test]
	fn test_redis_config_with_env_url() {
		std::env::set_var("ORDER_TEST_REDIS_URL", "redis://cache:6379");

		let config: Config = r#"
[service]
id = "orders"

[storage]
primary = "redis"
operation_timeout_ms = 250
[storage.implementations.redis]
url = "${ORDER_TEST_REDIS_URL}"

[api]
port = 8080
page_size = 20
"#
		.parse()
		.unwrap();

		assert_eq!(
			config.storage.implementations["redis"]
				.get("url")
				.and_then(|v| v.as_str()),
			Some("redis://cache:6379")
		);
		assert_eq!(config.storage.operation_timeout(), Duration::from_millis(250));
		assert_eq!(config.api.port, 8080);
		assert_eq!(config.api.page_size, 20);

		std::env::remove_var("ORDER_TEST_REDIS_URL");
	}

	#[test]
	fn test_primary_must_be_configured() {
		let result: Result<Config, _> = r#"
[service]
id = "orders"

[storage]
primary = "redis"
[storage.implementations.memory]
"#
		.parse();
		assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("redis")));
	}

	#[test]
	fn test_page_size_bounds() {
		let config = format!("{}\n[api]\npage_size = 0\n", MINIMAL);
		assert!(config.parse::<Config>().is_err());

		let config = format!("{}\n[api]\npage_size = {}\n", MINIMAL, MAX_PAGE_SIZE + 1);
		assert!(config.parse::<Config>().is_err());
	}

	#[test]
	fn test_empty_service_id_rejected() {
		let config = MINIMAL.replace("orders-test", "");
		assert!(matches!(
			config.parse::<Config>(),
			Err(ConfigError::Validation(_))
		));
	}

	#[tokio::test]
	async fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(MINIMAL.as_bytes()).unwrap();

		let config = Config::from_file(file.path()).await.unwrap();
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_from_missing_file() {
		let result = Config::from_file("/nonexistent/orders.toml").await;
		assert!(matches!(result, Err(ConfigError::Io(_))));
	}
}
