//! Minimal menu catalog, enough for checkout to price and attribute carts.

use crate::engine::{ownership, EngineError};
use crate::state::repository::persistence;
use crate::state::OrderRepository;
use courier_storage::Batch;
use courier_types::{MenuItem, Principal, StorageKey};
use std::sync::Arc;
use tracing::instrument;

pub struct CatalogHandler {
	orders: Arc<OrderRepository>,
	max_attempts: u32,
}

impl CatalogHandler {
	pub fn new(orders: Arc<OrderRepository>, max_attempts: u32) -> Self {
		Self {
			orders,
			max_attempts,
		}
	}

	/// Creates or updates a menu item of `restaurant_id`.
	///
	/// An item id already used by another restaurant is rejected.
	#[instrument(skip_all, fields(restaurant_id = restaurant_id, item_id = item_id, actor = %actor))]
	pub async fn register_menu_item(
		&self,
		actor: &Principal,
		restaurant_id: u64,
		item_id: u64,
		name: &str,
		unit_price: u64,
	) -> Result<MenuItem, EngineError> {
		ownership::authorize_restaurant(actor, restaurant_id)?;
		let name = name.trim();
		if name.is_empty() {
			return Err(EngineError::Validation("menu item name is required".into()));
		}

		let item = MenuItem {
			id: item_id,
			restaurant_id,
			name: name.to_string(),
			unit_price,
		};
		let id = item_id.to_string();

		for _ in 0..self.max_attempts {
			let existing = self.orders.load_menu_item(item_id).await?;

			let mut batch = Batch::new();
			match &existing {
				Some(current) if current.value.restaurant_id != restaurant_id => {
					return Err(EngineError::Forbidden(format!(
						"menu item {} belongs to another restaurant",
						item_id
					)));
				},
				Some(current) => batch.expect_unchanged(StorageKey::MenuItems, &id, &current.raw),
				None => batch.expect_absent(StorageKey::MenuItems, &id),
			};
			batch
				.put(StorageKey::MenuItems, &id, &item)
				.map_err(persistence)?;

			if self.orders.try_commit(batch).await? {
				tracing::info!(created = existing.is_none(), "Menu item registered");
				return Ok(item);
			}
		}

		Err(EngineError::ConcurrentModification {
			resource: format!("menu item {}", item_id),
			attempts: self.max_attempts,
		})
	}
}
