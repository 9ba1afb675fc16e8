//! Storage namespaces for the courier service.

use std::str::FromStr;

/// Namespaces used to partition the key space.
///
/// Keys are formed as `"{namespace}:{id}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order rows, keyed by order id.
	Orders,
	/// Status transition records, keyed by `{order_id}:{sequence}`.
	Transitions,
	/// Driver assignments, keyed by order id.
	Deliveries,
	/// Menu catalog, keyed by menu item id.
	MenuItems,
	/// Monotonic id counters, keyed by counter name.
	Sequences,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Transitions => "transitions",
			StorageKey::Deliveries => "deliveries",
			StorageKey::MenuItems => "menu_items",
			StorageKey::Sequences => "sequences",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Transitions,
			Self::Deliveries,
			Self::MenuItems,
			Self::Sequences,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_namespace_round_trip() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("quotes".parse::<StorageKey>().is_err());
	}
}
