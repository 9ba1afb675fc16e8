//! Authenticated principals.
//!
//! A principal is produced by the authentication collaborator and carries
//! only an id and a role. On the wire and in audit records it is rendered
//! as `role:id`, for example `restaurant:42`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a principal or role from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrincipalParseError {
	#[error("Unknown role: {0}")]
	UnknownRole(String),
	#[error("Malformed principal '{0}', expected role:id")]
	Malformed(String),
}

/// Role a principal acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Admin,
	Restaurant,
	Driver,
	Customer,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Admin => "admin",
			Role::Restaurant => "restaurant",
			Role::Driver => "driver",
			Role::Customer => "customer",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = PrincipalParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"admin" => Ok(Role::Admin),
			"restaurant" => Ok(Role::Restaurant),
			"driver" => Ok(Role::Driver),
			"customer" => Ok(Role::Customer),
			other => Err(PrincipalParseError::UnknownRole(other.to_string())),
		}
	}
}

/// A verified caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Principal {
	pub id: u64,
	pub role: Role,
}

impl Principal {
	pub fn new(role: Role, id: u64) -> Self {
		Self { id, role }
	}

	pub fn admin(id: u64) -> Self {
		Self::new(Role::Admin, id)
	}

	pub fn restaurant(id: u64) -> Self {
		Self::new(Role::Restaurant, id)
	}

	pub fn driver(id: u64) -> Self {
		Self::new(Role::Driver, id)
	}

	pub fn customer(id: u64) -> Self {
		Self::new(Role::Customer, id)
	}

	pub fn is_admin(&self) -> bool {
		self.role == Role::Admin
	}

	/// True when this principal is the given restaurant.
	pub fn is_restaurant(&self, restaurant_id: u64) -> bool {
		self.role == Role::Restaurant && self.id == restaurant_id
	}

	/// True when this principal is the given driver.
	pub fn is_driver(&self, driver_id: u64) -> bool {
		self.role == Role::Driver && self.id == driver_id
	}
}

impl fmt::Display for Principal {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.role, self.id)
	}
}

impl FromStr for Principal {
	type Err = PrincipalParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (role, id) = s
			.split_once(':')
			.ok_or_else(|| PrincipalParseError::Malformed(s.to_string()))?;
		let id = id
			.parse::<u64>()
			.map_err(|_| PrincipalParseError::Malformed(s.to_string()))?;
		Ok(Self::new(role.parse()?, id))
	}
}

impl From<Principal> for String {
	fn from(principal: Principal) -> Self {
		principal.to_string()
	}
}

impl TryFrom<String> for Principal {
	type Error = PrincipalParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
