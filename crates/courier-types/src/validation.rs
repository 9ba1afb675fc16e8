//! Validation of backend configuration tables.
//!
//! Storage and authentication backends receive their configuration as a raw
//! TOML table. Each backend describes the table it accepts with a [`Schema`]
//! and checks incoming configuration through [`ConfigSchema::validate`]
//! before its factory builds anything.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Unknown field: {0}")]
	UnknownField(String),
}

impl ValidationError {
	/// Prefixes the field path with the name of the enclosing table.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			},
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			ValidationError::UnknownField(f) => {
				ValidationError::UnknownField(format!("{}.{}", parent, f))
			},
		}
	}
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// Integer with optional inclusive bounds.
	Integer {
		min: Option<i64>,
		max: Option<i64>,
	},
	Boolean,
	/// Array whose elements all have the inner type.
	Array(Box<FieldType>),
	/// Table with a fixed schema.
	Table(Schema),
	/// Table with arbitrary keys whose values all have the inner type.
	Map(Box<FieldType>),
}

/// Custom validator run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a schema.
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Adds a custom validator to this field.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Describes the accepted shape of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
	/// Reject keys that are neither required nor optional.
	pub deny_unknown: bool,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self {
			required,
			optional,
			deny_unknown: false,
		}
	}

	/// Makes the schema reject keys it does not declare.
	pub fn strict(mut self) -> Self {
		self.deny_unknown = true;
		self
	}

	/// Validates a TOML value against this schema.
	///
	/// Checks that required fields are present, that every declared field
	/// has the right type and passes its custom validator, and, for strict
	/// schemas, that no undeclared keys are present.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		if self.deny_unknown {
			let declared = |key: &str| {
				self.required
					.iter()
					.chain(self.optional.iter())
					.any(|f| f.name == key)
			};
			if let Some(unknown) = table.keys().find(|key| !declared(key)) {
				return Err(ValidationError::UnknownField(unknown.clone()));
			}
		}

		Ok(())
	}
}

fn type_mismatch(field_name: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String => {
			if !value.is_str() {
				return Err(type_mismatch(field_name, "string", value));
			}
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| type_mismatch(field_name, "integer", value))?;

			if let Some(min_val) = min {
				if int_val < *min_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is less than minimum {}", int_val, min_val),
					});
				}
			}
			if let Some(max_val) = max {
				if int_val > *max_val {
					return Err(ValidationError::InvalidValue {
						field: field_name.to_string(),
						message: format!("Value {} is greater than maximum {}", int_val, max_val),
					});
				}
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(type_mismatch(field_name, "boolean", value));
			}
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| type_mismatch(field_name, "array", value))?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
		},
		FieldType::Table(schema) => {
			schema.validate(value).map_err(|e| e.nested_in(field_name))?;
		},
		FieldType::Map(inner_type) => {
			let table = value
				.as_table()
				.ok_or_else(|| type_mismatch(field_name, "table", value))?;
			for (key, item) in table {
				validate_field_type(&format!("{}.{}", field_name, key), item, inner_type)?;
			}
		},
	}

	Ok(())
}

/// A configuration schema that can validate TOML values.
///
/// Implemented by every pluggable backend so the builder can reject a bad
/// configuration table with a precise message.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_missing_required_field() {
		let schema = Schema::new(vec![Field::new("storage_path", FieldType::String)], vec![]);
		let err = schema.validate(&parse("")).unwrap_err();
		assert_eq!(err, ValidationError::MissingField("storage_path".into()));
	}

	#[test]
	fn test_integer_bounds() {
		let schema = Schema::new(
			vec![],
			vec![Field::new(
				"attempts",
				FieldType::Integer {
					min: Some(1),
					max: Some(10),
				},
			)],
		);
		assert!(schema.validate(&parse("attempts = 3")).is_ok());
		assert!(matches!(
			schema.validate(&parse("attempts = 0")),
			Err(ValidationError::InvalidValue { .. })
		));
		assert!(matches!(
			schema.validate(&parse("attempts = \"3\"")),
			Err(ValidationError::TypeMismatch { .. })
		));
	}

	#[test]
	fn test_strict_schema_rejects_unknown_keys() {
		let schema = Schema::new(vec![], vec![Field::new("a", FieldType::Boolean)]).strict();
		assert!(schema.validate(&parse("a = true")).is_ok());
		assert_eq!(
			schema.validate(&parse("b = 1")).unwrap_err(),
			ValidationError::UnknownField("b".into())
		);
	}

	#[test]
	fn test_map_and_nested_paths() {
		let schema = Schema::new(
			vec![Field::new(
				"tokens",
				FieldType::Map(Box::new(FieldType::Table(Schema::new(
					vec![Field::new("role", FieldType::String)],
					vec![],
				)))),
			)],
			vec![],
		);

		let ok = parse("[tokens.abc]\nrole = \"admin\"\n");
		assert!(schema.validate(&ok).is_ok());

		let bad = parse("[tokens.abc]\nid = 1\n");
		assert_eq!(
			schema.validate(&bad).unwrap_err(),
			ValidationError::MissingField("tokens.abc.role".into())
		);
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("name", FieldType::String).with_validator(|v| {
				if v.as_str().is_some_and(|s| s.is_empty()) {
					Err("must not be empty".into())
				} else {
					Ok(())
				}
			})],
			vec![],
		);
		assert!(matches!(
			schema.validate(&parse("name = \"\"")),
			Err(ValidationError::InvalidValue { .. })
		));
	}
}
