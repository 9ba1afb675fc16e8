//! Storage module for the courier order service.
//!
//! This module provides abstractions for persistent storage of orders, their
//! transition history, driver assignments and the menu catalog. Backends are
//! plain byte stores; the [`StorageService`] layers typed JSON access and
//! conditional multi-key batches on top of them.

use async_trait::async_trait;
use courier_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// A batch precondition did not hold; nothing was written.
	#[error("Conflict on key {0}")]
	Conflict(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Condition a key must satisfy for a batch to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
	pub key: String,
	/// Exact bytes the key must hold, or `None` if it must be absent.
	pub expected: Option<Vec<u8>>,
}

/// A single mutation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
	Put { key: String, value: Vec<u8> },
	Delete { key: String },
}

impl WriteOp {
	pub fn key(&self) -> &str {
		match self {
			WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
		}
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// Single-key operations are last-writer-wins. [`StorageInterface::commit`]
/// is the only way to change several keys together: it checks every
/// precondition and applies every write as one atomic step, or does
/// nothing and returns [`StorageError::Conflict`].
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes under the given key.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every key starting with `prefix`, in ascending order.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Applies `writes` atomically if every precondition holds.
	async fn commit(
		&self,
		preconditions: &[Precondition],
		writes: Vec<WriteOp>,
	) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must provide
/// to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn storage_key(namespace: StorageKey, id: &str) -> String {
	format!("{}:{}", namespace.as_str(), id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// A typed value together with the exact bytes it was read from.
///
/// The bytes act as a version token: pass them to
/// [`Batch::expect_unchanged`] to make a batch fail if anyone wrote the key
/// in between.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	pub raw: Vec<u8>,
}

/// A conditional multi-key write, built up and then handed to
/// [`StorageService::commit`].
#[derive(Debug, Default)]
pub struct Batch {
	preconditions: Vec<Precondition>,
	writes: Vec<WriteOp>,
}

impl Batch {
	pub fn new() -> Self {
		Self::default()
	}

	/// Requires the key to still hold the bytes it was read with.
	pub fn expect_unchanged(&mut self, namespace: StorageKey, id: &str, raw: &[u8]) -> &mut Self {
		self.preconditions.push(Precondition {
			key: storage_key(namespace, id),
			expected: Some(raw.to_vec()),
		});
		self
	}

	/// Requires the key to be absent.
	pub fn expect_absent(&mut self, namespace: StorageKey, id: &str) -> &mut Self {
		self.preconditions.push(Precondition {
			key: storage_key(namespace, id),
			expected: None,
		});
		self
	}

	pub fn put<T: Serialize>(
		&mut self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<&mut Self, StorageError> {
		self.writes.push(WriteOp::Put {
			key: storage_key(namespace, id),
			value: encode(data)?,
		});
		Ok(self)
	}

	pub fn delete(&mut self, namespace: StorageKey, id: &str) -> &mut Self {
		self.writes.push(WriteOp::Delete {
			key: storage_key(namespace, id),
		});
		self
	}

	pub fn is_empty(&self) -> bool {
		self.writes.is_empty()
	}
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization. Keys are formed as
/// `"{namespace}:{id}"`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, overwriting any previous value.
	pub async fn store<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes = encode(data)?;
		self.backend
			.set_bytes(&storage_key(namespace, id), bytes)
			.await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&storage_key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Retrieves a value along with the bytes it was decoded from.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let raw = self.backend.get_bytes(&storage_key(namespace, id)).await?;
		let value = decode(&raw)?;
		Ok(Versioned { value, raw })
	}

	/// Retrieves a value, mapping a missing key to `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Retrieves every value whose id starts with `id_prefix`.
	///
	/// Results come back in ascending key order. Keys removed between the
	/// listing and the read are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id_prefix: &str,
	) -> Result<Vec<T>, StorageError> {
		let keys = self
			.backend
			.list_keys(&storage_key(namespace, id_prefix))
			.await?;

		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => values.push(decode(&bytes)?),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}

	/// Updates an existing value in storage.
	///
	/// Returns `NotFound` if the key doesn't exist, making it semantically
	/// different from store() which will create or overwrite.
	pub async fn update<T: Serialize>(
		&self,
		namespace: StorageKey,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, encode(data)?).await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: StorageKey, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&storage_key(namespace, id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: StorageKey, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&storage_key(namespace, id)).await
	}

	/// Applies a batch atomically, or returns `Conflict` without writing.
	pub async fn commit(&self, batch: Batch) -> Result<(), StorageError> {
		self.backend
			.commit(&batch.preconditions, batch.writes)
			.await
	}
}
