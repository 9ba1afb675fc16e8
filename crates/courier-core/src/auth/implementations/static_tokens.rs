//! Token table authenticator.
//!
//! Maps opaque bearer tokens to principals listed in configuration:
//!
//! ```toml
//! [auth.implementations.static_tokens.tokens]
//! "tok-admin" = "admin:1"
//! "tok-pizza" = "restaurant:7"
//! ```

use crate::auth::{AuthError, Authenticator};
use async_trait::async_trait;
use courier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Principal, Schema, ValidationError,
};
use std::collections::HashMap;

/// Authenticator backed by a fixed token table.
pub struct StaticTokenAuthenticator {
	tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
	pub fn new(tokens: HashMap<String, Principal>) -> Self {
		Self { tokens }
	}
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(StaticTokenSchema)
	}

	async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
		self.tokens
			.get(token)
			.copied()
			.ok_or_else(|| AuthError::Unauthenticated("unknown token".into()))
	}
}

/// Configuration schema for the token table.
pub struct StaticTokenSchema;

impl ConfigSchema for StaticTokenSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let tokens = Field::new("tokens", FieldType::Map(Box::new(FieldType::String)))
			.with_validator(|value| {
				let table = value.as_table().ok_or("must be a table")?;
				for (token, principal) in table {
					if token.is_empty() {
						return Err("tokens must not be empty".into());
					}
					principal
						.as_str()
						.unwrap_or_default()
						.parse::<Principal>()
						.map_err(|e| format!("token '{}': {}", token, e))?;
				}
				Ok(())
			});

		Schema::new(vec![tokens], vec![]).strict().validate(config)
	}
}

/// Factory function to create the token authenticator from configuration.
pub fn create_authenticator(config: &toml::Value) -> Result<Box<dyn Authenticator>, AuthError> {
	StaticTokenSchema
		.validate(config)
		.map_err(|e| AuthError::Configuration(e.to_string()))?;

	let mut tokens = HashMap::new();
	if let Some(table) = config.get("tokens").and_then(|v| v.as_table()) {
		for (token, principal) in table {
			let principal = principal
				.as_str()
				.unwrap_or_default()
				.parse::<Principal>()
				.map_err(|e| AuthError::Configuration(e.to_string()))?;
			tokens.insert(token.clone(), principal);
		}
	}

	tracing::debug!(tokens = tokens.len(), "Loaded token table");
	Ok(Box::new(StaticTokenAuthenticator::new(tokens)))
}

/// Registry for the token table authenticator.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "static_tokens";
	type Factory = crate::auth::AuthFactory;

	fn factory() -> Self::Factory {
		create_authenticator
	}
}

impl crate::auth::AuthRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_known_and_unknown_tokens() {
		let config: toml::Value = toml::from_str(
			r#"
			[tokens]
			"tok-driver" = "driver:12"
			"#,
		)
		.unwrap();
		let auth = create_authenticator(&config).unwrap();

		assert_eq!(auth.authenticate("tok-driver").await.unwrap(), Principal::driver(12));
		assert!(matches!(
			auth.authenticate("tok-nobody").await,
			Err(AuthError::Unauthenticated(_))
		));
	}

	#[test]
	fn test_schema_rejects_bad_principal() {
		let config: toml::Value = toml::from_str(
			r#"
			[tokens]
			"tok" = "chef:1"
			"#,
		)
		.unwrap();
		assert!(matches!(
			create_authenticator(&config),
			Err(AuthError::Configuration(_))
		));
	}

	#[test]
	fn test_schema_requires_tokens_table() {
		let config = toml::Value::Table(toml::map::Map::new());
		assert!(StaticTokenSchema.validate(&config).is_err());
	}
}
