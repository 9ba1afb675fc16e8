//! Typed access to persisted orders and their satellite records.

use crate::engine::EngineError;
use courier_storage::{Batch, StorageError, StorageService, Versioned};
use courier_types::{
	DeliveryAssignment, MenuItem, Order, StatusTransitionRecord, StorageKey,
};
use std::sync::Arc;

/// Counter name for order ids in the sequences namespace.
pub(crate) const ORDER_SEQUENCE: &str = "orders";

pub(crate) fn persistence(e: StorageError) -> EngineError {
	EngineError::Persistence(e.to_string())
}

/// Storage id of a transition record. Zero-padded so keys sort by sequence.
pub(crate) fn transition_key(order_id: u64, sequence: u64) -> String {
	format!("{}:{:010}", order_id, sequence)
}

/// Reads and conditionally writes orders, history, assignments and menu
/// items.
pub struct OrderRepository {
	storage: Arc<StorageService>,
}

impl OrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	async fn versioned<T: serde::de::DeserializeOwned>(
		&self,
		namespace: StorageKey,
		id: &str,
	) -> Result<Option<Versioned<T>>, EngineError> {
		match self.storage.retrieve_versioned(namespace, id).await {
			Ok(found) => Ok(Some(found)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(persistence(e)),
		}
	}

	/// Loads an order with its version token.
	pub async fn load_order(&self, order_id: u64) -> Result<Versioned<Order>, EngineError> {
		self.versioned(StorageKey::Orders, &order_id.to_string())
			.await?
			.ok_or(EngineError::OrderNotFound(order_id))
	}

	pub async fn load_assignment(
		&self,
		order_id: u64,
	) -> Result<Option<Versioned<DeliveryAssignment>>, EngineError> {
		self.versioned(StorageKey::Deliveries, &order_id.to_string())
			.await
	}

	pub async fn load_menu_item(
		&self,
		item_id: u64,
	) -> Result<Option<Versioned<MenuItem>>, EngineError> {
		self.versioned(StorageKey::MenuItems, &item_id.to_string())
			.await
	}

	/// Last issued value of a named id counter, with its version token.
	pub async fn load_sequence(&self, name: &str) -> Result<Option<Versioned<u64>>, EngineError> {
		self.versioned(StorageKey::Sequences, name).await
	}

	/// The order's transition records, oldest first.
	pub async fn history(&self, order_id: u64) -> Result<Vec<StatusTransitionRecord>, EngineError> {
		let mut records: Vec<StatusTransitionRecord> = self
			.storage
			.retrieve_all(StorageKey::Transitions, &format!("{}:", order_id))
			.await
			.map_err(persistence)?;
		records.sort_by_key(|record| record.sequence);
		Ok(records)
	}

	pub async fn all_orders(&self) -> Result<Vec<Order>, EngineError> {
		self.storage
			.retrieve_all(StorageKey::Orders, "")
			.await
			.map_err(persistence)
	}

	/// Commits a batch. `Ok(false)` means a precondition failed and nothing
	/// was written.
	pub async fn try_commit(&self, batch: Batch) -> Result<bool, EngineError> {
		match self.storage.commit(batch).await {
			Ok(()) => Ok(true),
			Err(StorageError::Conflict(key)) => {
				tracing::debug!(component = "storage", %key, "Batch precondition failed");
				Ok(false)
			},
			Err(e) => Err(persistence(e)),
		}
	}
}
