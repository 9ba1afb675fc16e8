//! Configuration builder for tests and local development.
//!
//! Produces a [`Config`] backed by memory storage and a static token table,
//! without touching the filesystem.

use crate::{ApiConfig, AuthConfig, Config, EngineConfig, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_config: toml::Value,
	engine: EngineConfig,
	tokens: toml::map::Map<String, toml::Value>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a builder with memory storage, default engine tuning and no
	/// tokens.
	pub fn new() -> Self {
		Self {
			service_id: "courier-test".to_string(),
			storage_primary: "memory".to_string(),
			storage_config: toml::Value::Table(toml::map::Map::new()),
			engine: EngineConfig::default(),
			tokens: toml::map::Map::new(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Uses the file backend rooted at `path`.
	pub fn file_storage(mut self, path: impl Into<String>) -> Self {
		let mut table = toml::map::Map::new();
		table.insert("storage_path".to_string(), toml::Value::String(path.into()));
		self.storage_primary = "file".to_string();
		self.storage_config = toml::Value::Table(table);
		self
	}

	pub fn max_transition_attempts(mut self, attempts: u32) -> Self {
		self.engine.max_transition_attempts = attempts;
		self
	}

	pub fn page_size(mut self, page_size: u32) -> Self {
		self.engine.page_size = page_size;
		self
	}

	/// Registers a bearer token for a principal such as `"restaurant:7"`.
	pub fn token(mut self, token: impl Into<String>, principal: impl Into<String>) -> Self {
		self.tokens
			.insert(token.into(), toml::Value::String(principal.into()));
		self
	}

	pub fn api(mut self, api: ApiConfig) -> Self {
		self.api = Some(api);
		self
	}

	pub fn build(self) -> Config {
		let mut auth_config = toml::map::Map::new();
		auth_config.insert("tokens".to_string(), toml::Value::Table(self.tokens));

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				implementations: HashMap::from([(
					self.storage_primary.clone(),
					self.storage_config,
				)]),
				primary: self.storage_primary,
			},
			engine: self.engine,
			auth: AuthConfig {
				primary: "static_tokens".to_string(),
				implementations: HashMap::from([(
					"static_tokens".to_string(),
					toml::Value::Table(auth_config),
				)]),
			},
			api: self.api,
		}
	}
}
