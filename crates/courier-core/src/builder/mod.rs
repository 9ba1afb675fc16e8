//! Builder pattern for constructing a courier instance.
//!
//! Composes the lifecycle engine and the authentication service from the
//! storage and authentication implementations named in configuration, using
//! factory functions registered by name.

use crate::auth::{AuthError, AuthService, Authenticator};
use crate::engine::{event_bus::EventBus, OrderLifecycleEngine};
use crate::state::TransitionTable;
use courier_config::Config;
use courier_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Capacity of the in-process event channel.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur while building a courier instance.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for each pluggable component, keyed by name.
pub struct CourierFactories<SF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub auth_factories: HashMap<String, AF>,
}

/// A fully wired courier instance.
pub struct Courier {
	pub config: Config,
	pub engine: Arc<OrderLifecycleEngine>,
	pub auth: Arc<AuthService>,
}

/// Builder for a [`Courier`] with pluggable implementations.
pub struct CourierBuilder {
	config: Config,
	table: TransitionTable,
}

impl CourierBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			table: TransitionTable::standard(),
		}
	}

	/// Replaces the standard transition table.
	pub fn with_transition_table(mut self, table: TransitionTable) -> Self {
		self.table = table;
		self
	}

	pub fn build<SF, AF>(self, factories: CourierFactories<SF, AF>) -> Result<Courier, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn Authenticator>, AuthError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let authenticator = load_primary(
			"auth",
			&self.config.auth.primary,
			&self.config.auth.implementations,
			&factories.auth_factories,
		)?;
		let auth = Arc::new(AuthService::new(authenticator));

		let engine = Arc::new(OrderLifecycleEngine::new(
			self.config.engine.clone(),
			storage,
			self.table,
			EventBus::new(EVENT_BUS_CAPACITY),
		));

		Ok(Courier {
			config: self.config,
			engine,
			auth,
		})
	}
}

/// Instantiates every configured implementation that has a factory and
/// returns the primary one.
fn load_primary<T: ?Sized, E, F>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	E: std::fmt::Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"no valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::auth::AuthFactory;
	use courier_config::builders::ConfigBuilder;
	use courier_storage::StorageFactory;

	fn factories() -> CourierFactories<StorageFactory, AuthFactory> {
		CourierFactories {
			storage_factories: courier_storage::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
			auth_factories: crate::auth::get_all_implementations()
				.into_iter()
				.map(|(name, f)| (name.to_string(), f))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_build_with_memory_storage() {
		let config = ConfigBuilder::new()
			.token("tok-admin", "admin:1")
			.build();
		let courier = CourierBuilder::new(config).build(factories()).unwrap();

		let principal = courier
			.auth
			.authenticate_header(Some("Bearer tok-admin"))
			.await
			.unwrap();
		assert!(principal.is_admin());
		assert!(matches!(
			courier.engine.get_order_status(1).await,
			Err(crate::EngineError::OrderNotFound(1))
		));
	}

	#[test]
	fn test_build_with_file_storage() {
		let dir = tempfile::tempdir().unwrap();
		let config = ConfigBuilder::new()
			.file_storage(dir.path().to_string_lossy())
			.build();
		assert!(CourierBuilder::new(config).build(factories()).is_ok());
	}

	#[test]
	fn test_unknown_primary_is_rejected() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".into();
		assert!(matches!(
			CourierBuilder::new(config).build(factories()),
			Err(BuilderError::Config(_))
		));
	}

	#[test]
	fn test_missing_factories_are_reported() {
		let config = ConfigBuilder::new().build();
		let empty = CourierFactories {
			storage_factories: HashMap::<String, StorageFactory>::new(),
			auth_factories: factories().auth_factories,
		};
		assert!(matches!(
			CourierBuilder::new(config).build(empty),
			Err(BuilderError::MissingComponent(_))
		));
	}
}
