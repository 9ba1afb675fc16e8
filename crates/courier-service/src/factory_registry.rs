//! Factory registry for pluggable courier backends.
//!
//! Collects every storage and authentication implementation the crates
//! register and builds a [`Courier`] from the ones named in configuration.

use courier_config::Config;
use courier_core::auth::AuthFactory;
use courier_core::{Courier, CourierBuilder, CourierFactories};
use courier_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Global registry for all implementation factories.
#[derive(Default)]
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub auth: HashMap<String, AuthFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_auth(&mut self, name: impl Into<String>, factory: AuthFactory) {
		self.auth.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in courier_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in courier_core::auth::get_all_implementations() {
			tracing::debug!("Registering auth implementation: {}", name);
			registry.register_auth(name, factory);
		}

		registry
	})
}

/// Picks the factories for the implementations a config section names.
fn select<F: Copy>(
	available: &HashMap<String, F>,
	configured: &HashMap<String, toml::Value>,
	component: &str,
) -> Result<HashMap<String, F>, String> {
	let mut factories = HashMap::new();
	for name in configured.keys() {
		match available.get(name) {
			Some(factory) => {
				factories.insert(name.clone(), *factory);
			},
			None => {
				let mut known: Vec<_> = available.keys().cloned().collect();
				known.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					component,
					name,
					known.join(", ")
				));
			},
		}
	}
	Ok(factories)
}

/// Builds a courier instance using the registry and config.
pub fn build_courier_from_config(config: Config) -> Result<Courier, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let factories = CourierFactories {
		storage_factories: select(&registry.storage, &config.storage.implementations, "storage")?,
		auth_factories: select(&registry.auth, &config.auth.implementations, "auth")?,
	};

	Ok(CourierBuilder::new(config).build(factories)?)
}
