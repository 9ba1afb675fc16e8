//! Loader for configurations split across several files.
//!
//! The main file may carry an `include` directive naming further files,
//! resolved relative to the main file's directory. Included files are
//! merged section by section; a top-level section may appear in only one
//! file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Configuration loader that handles multi-file configurations with includes.
pub struct ConfigLoader {
	/// Base path for resolving relative includes
	base_path: PathBuf,
	/// Canonical paths already read, for circular include detection
	loaded_files: HashSet<PathBuf>,
	/// File each top-level section came from, for error reporting
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads a configuration file and all its includes, then validates the
	/// merged result.
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let main_path = self.resolve_path(config_path)?;
		let mut main_toml = self.load_table(&main_path).await?;

		let includes = match main_toml.as_table_mut().and_then(|t| t.remove("include")) {
			Some(value) => parse_includes(&value)?,
			None => Vec::new(),
		};

		if let Some(table) = main_toml.as_table() {
			for key in table.keys() {
				self.section_sources.insert(key.clone(), main_path.clone());
			}
		}

		for include in includes {
			let include_path = self.resolve_path(&include)?;
			let include_toml = self.load_table(&include_path).await?;
			self.merge(&mut main_toml, include_toml, &include_path)?;
		}

		let merged = toml::to_string(&main_toml).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		merged.parse()
	}

	/// Reads a file, resolves environment variables and parses it as TOML.
	async fn load_table(&mut self, path: &Path) -> Result<toml::Value, ConfigError> {
		let canonical_path = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical_path.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical_path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	/// Moves every section of `include` into `main`, rejecting duplicates.
	fn merge(
		&mut self,
		main: &mut toml::Value,
		include: toml::Value,
		include_path: &Path,
	) -> Result<(), ConfigError> {
		let toml::Value::Table(include_table) = include else {
			return Ok(());
		};
		if include_table.contains_key("include") {
			return Err(ConfigError::Validation(format!(
				"Nested include in {} is not supported",
				include_path.display()
			)));
		}
		let Some(main_table) = main.as_table_mut() else {
			return Ok(());
		};

		for (key, value) in include_table {
			if let Some(existing_source) = self.section_sources.get(&key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					existing_source.display(),
					include_path.display()
				)));
			}
			self.section_sources
				.insert(key.clone(), include_path.to_path_buf());
			main_table.insert(key, value);
		}
		Ok(())
	}

	/// Resolves a path relative to the base path and checks it exists.
	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Accepts `include = "a.toml"` or `include = ["a.toml", "b.toml"]`.
fn parse_includes(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
