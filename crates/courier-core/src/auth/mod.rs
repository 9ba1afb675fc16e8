//! Authentication for the courier service.
//!
//! Resolves a bearer token into a verified [`Principal`]. The engine never
//! sees tokens; it only receives the principal this module produces.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, Principal};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod static_tokens;
}

/// Errors that can occur while authenticating a caller.
#[derive(Debug, Error)]
pub enum AuthError {
	/// The credential is missing, malformed or unknown.
	#[error("Unauthenticated: {0}")]
	Unauthenticated(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for authentication backends.
#[async_trait]
pub trait Authenticator: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Resolves a raw token (without the `Bearer ` prefix) to a principal.
	async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Type alias for authenticator factory functions.
pub type AuthFactory = fn(&toml::Value) -> Result<Box<dyn Authenticator>, AuthError>;

/// Registry trait for authentication implementations.
pub trait AuthRegistry: ImplementationRegistry<Factory = AuthFactory> {}

/// Get all registered authentication implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AuthFactory)> {
	use implementations::static_tokens;

	vec![(
		static_tokens::Registry::NAME,
		static_tokens::Registry::factory(),
	)]
}

/// Service wrapping the configured authenticator.
pub struct AuthService {
	implementation: Box<dyn Authenticator>,
}

impl AuthService {
	pub fn new(implementation: Box<dyn Authenticator>) -> Self {
		Self { implementation }
	}

	/// Authenticates the value of an `Authorization` header.
	pub async fn authenticate_header(&self, header: Option<&str>) -> Result<Principal, AuthError> {
		let header =
			header.ok_or_else(|| AuthError::Unauthenticated("missing credentials".into()))?;
		let token = header
			.strip_prefix("Bearer ")
			.map(str::trim)
			.filter(|t| !t.is_empty())
			.ok_or_else(|| AuthError::Unauthenticated("expected a bearer token".into()))?;
		self.implementation.authenticate(token).await
	}
}
