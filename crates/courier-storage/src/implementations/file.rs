//! File-based storage backend for the courier service.
//!
//! Every key is stored as one file under the configured directory. Writes go
//! to a temporary file that is then renamed over the target, so a single key
//! is never observed half-written. Batches touching several keys are first
//! recorded in a journal file; if the process dies mid-batch the journal is
//! replayed by the next commit or the next time the store is opened.

use crate::{Precondition, StorageError, StorageInterface, WriteOp};
use async_trait::async_trait;
use courier_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

const DEFAULT_STORAGE_PATH: &str = "./data/storage";
const LOCK_FILE: &str = ".lock";
const JOURNAL_FILE: &str = "journal.json";
const DATA_EXTENSION: &str = "bin";

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Advisory lock on the store directory, released on drop.
struct StoreLock {
	file: File,
}

impl StoreLock {
	fn open_lock_file(base_path: &Path) -> Result<File, StorageError> {
		OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(false)
			.open(base_path.join(LOCK_FILE))
			.map_err(backend_err)
	}

	/// Held by writers. Excludes every other reader and writer.
	fn exclusive(base_path: &Path) -> Result<Self, StorageError> {
		let file = Self::open_lock_file(base_path)?;
		file.lock_exclusive().map_err(backend_err)?;
		Ok(Self { file })
	}

	/// Held by readers so they never observe a batch half-applied by
	/// another process.
	fn shared(base_path: &Path) -> Result<Self, StorageError> {
		let file = Self::open_lock_file(base_path)?;
		file.lock_shared().map_err(backend_err)?;
		Ok(Self { file })
	}
}

impl Drop for StoreLock {
	fn drop(&mut self) {
		let _ = self.file.unlock();
	}
}

/// Pending multi-key batch, persisted before any of its writes are applied.
#[derive(Debug, Serialize, Deserialize)]
struct Journal {
	writes: Vec<WriteOp>,
}

/// Maps a key to a file name; `:` and `/` are escaped so keys round-trip.
fn escape_key(key: &str) -> String {
	key.replace('%', "%25")
		.replace(':', "%3A")
		.replace('/', "%2F")
}

fn unescape_key(name: &str) -> String {
	name.replace("%3A", ":")
		.replace("%2F", "/")
		.replace("%25", "%")
}

fn data_path(base_path: &Path, key: &str) -> PathBuf {
	base_path.join(format!("{}.{}", escape_key(key), DATA_EXTENSION))
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
	let temp_path = path.with_extension("tmp");
	{
		let mut file = File::create(&temp_path)?;
		file.write_all(data)?;
		file.sync_all()?;
	}
	fs::rename(&temp_path, path)
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
	match fs::read(path) {
		Ok(data) => Ok(Some(data)),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e),
	}
}

fn apply_writes(base_path: &Path, writes: &[WriteOp]) -> io::Result<()> {
	for write in writes {
		match write {
			WriteOp::Put { key, value } => write_atomic(&data_path(base_path, key), value)?,
			WriteOp::Delete { key } => match fs::remove_file(data_path(base_path, key)) {
				Ok(()) => {},
				Err(e) if e.kind() == io::ErrorKind::NotFound => {},
				Err(e) => return Err(e),
			},
		}
	}
	Ok(())
}

/// Finishes a batch interrupted by a crash. Returns the number of writes
/// replayed.
fn replay_journal(base_path: &Path) -> Result<usize, StorageError> {
	let journal_path = base_path.join(JOURNAL_FILE);
	let Some(data) = read_optional(&journal_path).map_err(backend_err)? else {
		return Ok(0);
	};

	let replayed = match serde_json::from_slice::<Journal>(&data) {
		Ok(journal) => {
			apply_writes(base_path, &journal.writes).map_err(backend_err)?;
			journal.writes.len()
		},
		Err(e) => {
			tracing::warn!(
				component = "storage",
				path = %journal_path.display(),
				error = %e,
				"Discarding unreadable journal"
			);
			0
		},
	};

	fs::remove_file(&journal_path).map_err(backend_err)?;
	Ok(replayed)
}

/// Checks preconditions and applies writes while holding the store lock.
fn commit_blocking(
	base_path: &Path,
	preconditions: &[Precondition],
	writes: Vec<WriteOp>,
) -> Result<(), StorageError> {
	let _lock = StoreLock::exclusive(base_path)?;

	let replayed = replay_journal(base_path)?;
	if replayed > 0 {
		tracing::info!(component = "storage", writes = replayed, "Replayed interrupted batch");
	}

	for precondition in preconditions {
		let current =
			read_optional(&data_path(base_path, &precondition.key)).map_err(backend_err)?;
		if current != precondition.expected {
			return Err(StorageError::Conflict(precondition.key.clone()));
		}
	}

	match writes.len() {
		0 => Ok(()),
		1 => apply_writes(base_path, &writes).map_err(backend_err),
		n => {
			let journal_path = base_path.join(JOURNAL_FILE);
			let journal = Journal { writes };
			let bytes =
				serde_json::to_vec(&journal).map_err(|e| StorageError::Serialization(e.to_string()))?;
			write_atomic(&journal_path, &bytes).map_err(backend_err)?;
			apply_writes(base_path, &journal.writes).map_err(backend_err)?;
			fs::remove_file(&journal_path).map_err(backend_err)?;
			tracing::trace!(component = "storage", writes = n, "Applied journaled batch");
			Ok(())
		},
	}
}

/// File-based storage implementation.
///
/// Inside the process, access is coordinated by a read-write lock. Across
/// processes, readers take a shared and writers an exclusive `fs2` lock on a
/// lock file in the storage directory.
pub struct FileStorage {
	base_path: PathBuf,
	guard: Arc<RwLock<()>>,
}

impl FileStorage {
	/// Opens the store, creating the directory and replaying any journal
	/// left behind by an interrupted batch.
	pub fn open(base_path: PathBuf) -> Result<Self, StorageError> {
		fs::create_dir_all(&base_path).map_err(backend_err)?;

		let replayed = {
			let _lock = StoreLock::exclusive(&base_path)?;
			replay_journal(&base_path)?
		};
		if replayed > 0 {
			tracing::info!(
				component = "storage",
				path = %base_path.display(),
				writes = replayed,
				"Replayed interrupted batch"
			);
		}

		Ok(Self {
			base_path,
			guard: Arc::new(RwLock::new(())),
		})
	}

	async fn run_commit(
		&self,
		preconditions: Vec<Precondition>,
		writes: Vec<WriteOp>,
	) -> Result<(), StorageError> {
		let _guard = self.guard.write().await;
		let base_path = self.base_path.clone();
		tokio::task::spawn_blocking(move || commit_blocking(&base_path, &preconditions, writes))
			.await
			.map_err(backend_err)?
	}

	/// Runs `read` on a blocking thread while holding the shared store lock.
	async fn run_read<T, F>(&self, read: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
	{
		let _guard = self.guard.read().await;
		let base_path = self.base_path.clone();
		tokio::task::spawn_blocking(move || {
			let _lock = StoreLock::shared(&base_path)?;
			read(&base_path)
		})
		.await
		.map_err(backend_err)?
	}
}

fn list_keys_blocking(base_path: &Path, prefix: &str) -> Result<Vec<String>, StorageError> {
	let mut keys = Vec::new();
	for entry in fs::read_dir(base_path).map_err(backend_err)? {
		let path = entry.map_err(backend_err)?.path();
		if path.extension() != Some(std::ffi::OsStr::new(DATA_EXTENSION)) {
			continue;
		}
		let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
			tracing::debug!(component = "storage", ?path, "Skipping non UTF-8 file name");
			continue;
		};
		let key = unescape_key(stem);
		if key.starts_with(prefix) {
			keys.push(key);
		}
	}
	keys.sort();
	Ok(keys)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let key = key.to_string();
		self.run_read(move |base_path| {
			read_optional(&data_path(base_path, &key))
				.map_err(backend_err)?
				.ok_or(StorageError::NotFound)
		})
		.await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.run_commit(
			Vec::new(),
			vec![WriteOp::Put {
				key: key.to_string(),
				value,
			}],
		)
		.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.run_commit(
			Vec::new(),
			vec![WriteOp::Delete {
				key: key.to_string(),
			}],
		)
		.await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let key = key.to_string();
		self.run_read(move |base_path| {
			data_path(base_path, &key)
				.try_exists()
				.map_err(backend_err)
		})
		.await
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let prefix = prefix.to_string();
		self.run_read(move |base_path| list_keys_blocking(base_path, &prefix))
			.await
	}

	async fn commit(
		&self,
		preconditions: &[Precondition],
		writes: Vec<WriteOp>,
	) -> Result<(), StorageError> {
		self.run_commit(preconditions.to_vec(), writes).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some(s) if s.trim().is_empty() => Err("storage_path cannot be empty".into()),
					_ => Ok(()),
				}
			})],
		)
		.strict()
		.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStorage::open(PathBuf::from(storage_path))?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn open(dir: &TempDir) -> FileStorage {
		FileStorage::open(dir.path().to_path_buf()).unwrap()
	}

	#[test]
	fn test_key_escaping_round_trips() {
		for key in ["orders:1", "transitions:12:3", "odd/key%:x"] {
			assert_eq!(unescape_key(&escape_key(key)), key);
		}
		assert!(!escape_key("transitions:1:2").contains(':'));
	}

	#[tokio::test]
	async fn test_basic_operations_persist_across_reopen() {
		let dir = TempDir::new().unwrap();
		{
			let storage = open(&dir);
			storage
				.set_bytes("orders:1", b"one".to_vec())
				.await
				.unwrap();
			storage
				.set_bytes("orders:2", b"two".to_vec())
				.await
				.unwrap();
			storage.delete("orders:2").await.unwrap();
			// deleting twice is fine
			storage.delete("orders:2").await.unwrap();
		}

		let storage = open(&dir);
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"one".to_vec());
		assert!(storage.exists("orders:1").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:2").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_list_keys_unescapes_and_filters() {
		let dir = TempDir::new().unwrap();
		let storage = open(&dir);
		for key in ["transitions:1:1", "transitions:1:2", "transitions:10:1", "orders:1"] {
			storage.set_bytes(key, vec![0]).await.unwrap();
		}

		let keys = storage.list_keys("transitions:1:").await.unwrap();
		assert_eq!(
			keys,
			vec!["transitions:1:1".to_string(), "transitions:1:2".to_string()]
		);
	}

	#[tokio::test]
	async fn test_commit_checks_preconditions() {
		let dir = TempDir::new().unwrap();
		let storage = open(&dir);
		storage.set_bytes("orders:1", b"v1".to_vec()).await.unwrap();

		let stale = [Precondition {
			key: "orders:1".into(),
			expected: Some(b"v0".to_vec()),
		}];
		let writes = vec![
			WriteOp::Put {
				key: "orders:1".into(),
				value: b"v2".to_vec(),
			},
			WriteOp::Put {
				key: "transitions:1:1".into(),
				value: b"r".to_vec(),
			},
		];

		assert!(matches!(
			storage.commit(&stale, writes.clone()).await,
			Err(StorageError::Conflict(_))
		));
		assert!(!storage.exists("transitions:1:1").await.unwrap());

		let fresh = [Precondition {
			key: "orders:1".into(),
			expected: Some(b"v1".to_vec()),
		}];
		storage.commit(&fresh, writes).await.unwrap();
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"v2".to_vec());
		assert!(storage.exists("transitions:1:1").await.unwrap());
		assert!(!dir.path().join(JOURNAL_FILE).exists());
	}

	#[tokio::test]
	async fn test_interrupted_batch_is_replayed_on_open() {
		let dir = TempDir::new().unwrap();
		{
			let storage = open(&dir);
			storage.set_bytes("orders:1", b"v1".to_vec()).await.unwrap();
		}

		// simulate a crash after the journal was written but before it was applied
		let journal = Journal {
			writes: vec![
				WriteOp::Put {
					key: "orders:1".into(),
					value: b"v2".to_vec(),
				},
				WriteOp::Put {
					key: "transitions:1:1".into(),
					value: b"r".to_vec(),
				},
			],
		};
		write_atomic(
			&dir.path().join(JOURNAL_FILE),
			&serde_json::to_vec(&journal).unwrap(),
		)
		.unwrap();

		let storage = open(&dir);
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"v2".to_vec());
		assert!(storage.exists("transitions:1:1").await.unwrap());
		assert!(!dir.path().join(JOURNAL_FILE).exists());
	}

	#[tokio::test]
	async fn test_reads_wait_for_a_writer_in_another_process() {
		let dir = TempDir::new().unwrap();
		let storage = Arc::new(open(&dir));
		storage.set_bytes("orders:1", b"v1".to_vec()).await.unwrap();

		// a separate lock file handle behaves like another process
		let writer = StoreLock::exclusive(dir.path()).unwrap();
		let reader = {
			let storage = storage.clone();
			tokio::spawn(async move { storage.get_bytes("orders:1").await })
		};
		tokio::time::sleep(std::time::Duration::from_millis(100)).await;
		assert!(!reader.is_finished());

		drop(writer);
		let value = tokio::time::timeout(std::time::Duration::from_secs(5), reader)
			.await
			.unwrap()
			.unwrap()
			.unwrap();
		assert_eq!(value, b"v1".to_vec());
	}

	#[tokio::test]
	async fn test_interrupted_batch_is_replayed_before_next_commit() {
		let dir = TempDir::new().unwrap();
		let storage = open(&dir);
		storage.set_bytes("orders:1", b"v1".to_vec()).await.unwrap();

		let journal = Journal {
			writes: vec![WriteOp::Put {
				key: "orders:1".into(),
				value: b"v2".to_vec(),
			}],
		};
		write_atomic(
			&dir.path().join(JOURNAL_FILE),
			&serde_json::to_vec(&journal).unwrap(),
		)
		.unwrap();

		// the precondition is checked against the replayed value
		let stale = [Precondition {
			key: "orders:1".into(),
			expected: Some(b"v1".to_vec()),
		}];
		assert!(matches!(
			storage.commit(&stale, Vec::new()).await,
			Err(StorageError::Conflict(_))
		));
		assert_eq!(storage.get_bytes("orders:1").await.unwrap(), b"v2".to_vec());
		assert!(!dir.path().join(JOURNAL_FILE).exists());
	}

	#[test]
	fn test_factory_uses_configured_path() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("nested");
		let config: toml::Value =
			toml::from_str(&format!("storage_path = {:?}", path.display().to_string())).unwrap();
		assert!(create_storage(&config).is_ok());
		assert!(path.join(LOCK_FILE).exists());

		let bad: toml::Value = toml::from_str("storage_path = \"\"").unwrap();
		assert!(matches!(
			create_storage(&bad),
			Err(StorageError::Configuration(_))
		));
	}
}
