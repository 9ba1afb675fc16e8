//! Checkout: turns a customer's cart into a new `PENDING` order.

use crate::engine::{event_bus::EventBus, EngineError};
use crate::state::repository::{persistence, ORDER_SEQUENCE};
use crate::state::OrderRepository;
use courier_storage::Batch;
use courier_types::{
	current_timestamp, CheckoutItem, CourierEvent, DeliveryLocation, Order, OrderEvent,
	OrderLineItem, OrderStatus, Principal, Role, StorageKey,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::instrument;

/// Validates carts and allocates order ids.
pub struct CheckoutHandler {
	orders: Arc<OrderRepository>,
	event_bus: EventBus,
	max_attempts: u32,
}

impl CheckoutHandler {
	pub fn new(orders: Arc<OrderRepository>, event_bus: EventBus, max_attempts: u32) -> Self {
		Self {
			orders,
			event_bus,
			max_attempts,
		}
	}

	/// Prices the cart against the menu and returns one restaurant's line
	/// items.
	async fn price_cart(&self, cart: &[CheckoutItem]) -> Result<(u64, Vec<OrderLineItem>), EngineError> {
		if cart.is_empty() {
			return Err(EngineError::Validation("cart is empty".into()));
		}

		let mut restaurants = BTreeSet::new();
		let mut items = Vec::with_capacity(cart.len());
		for line in cart {
			if line.quantity < 1 {
				return Err(EngineError::Validation(format!(
					"quantity for menu item {} must be at least 1",
					line.menu_item_id
				)));
			}
			let menu_item = self
				.orders
				.load_menu_item(line.menu_item_id)
				.await?
				.ok_or(EngineError::MenuItemNotFound(line.menu_item_id))?
				.value;
			restaurants.insert(menu_item.restaurant_id);
			items.push(OrderLineItem {
				menu_item_id: menu_item.id,
				quantity: line.quantity,
				unit_price: menu_item.unit_price,
			});
		}

		match restaurants.into_iter().collect::<Vec<_>>().as_slice() {
			[restaurant_id] => Ok((*restaurant_id, items)),
			_ => Err(EngineError::Validation(
				"all items in an order must come from the same restaurant".into(),
			)),
		}
	}

	#[instrument(skip_all, fields(customer = %customer))]
	pub async fn place_order(
		&self,
		customer: &Principal,
		location: DeliveryLocation,
		cart: &[CheckoutItem],
	) -> Result<Order, EngineError> {
		if customer.role != Role::Customer {
			return Err(EngineError::Forbidden(format!(
				"{} cannot place orders",
				customer
			)));
		}
		if location.is_empty() {
			return Err(EngineError::Validation("delivery location is required".into()));
		}
		let (restaurant_id, items) = self.price_cart(cart).await?;

		for attempt in 1..=self.max_attempts {
			let sequence = self.orders.load_sequence(ORDER_SEQUENCE).await?;
			let order_id = sequence.as_ref().map_or(0, |s| s.value) + 1;
			let now = current_timestamp();
			let order = Order {
				id: order_id,
				customer_id: customer.id,
				restaurant_id,
				location: location.clone(),
				status: OrderStatus::Pending,
				items: items.clone(),
				created_at: now,
				updated_at: now,
				version: 0,
			};

			let id = order_id.to_string();
			let mut batch = Batch::new();
			match &sequence {
				Some(current) => batch.expect_unchanged(StorageKey::Sequences, ORDER_SEQUENCE, &current.raw),
				None => batch.expect_absent(StorageKey::Sequences, ORDER_SEQUENCE),
			};
			batch
				.expect_absent(StorageKey::Orders, &id)
				.put(StorageKey::Sequences, ORDER_SEQUENCE, &order_id)
				.map_err(persistence)?
				.put(StorageKey::Orders, &id, &order)
				.map_err(persistence)?;

			if self.orders.try_commit(batch).await? {
				tracing::info!(
					order_id = order.id,
					restaurant_id,
					total = order.total(),
					"Order placed"
				);
				self.event_bus
					.publish(CourierEvent::Order(OrderEvent::Placed {
						order_id: order.id,
						restaurant_id,
						customer_id: customer.id,
					}))
					.ok();
				return Ok(order);
			}
			tracing::debug!(attempt, "Order id allocation raced, retrying");
		}

		Err(EngineError::ConcurrentModification {
			resource: "order id sequence".into(),
			attempts: self.max_attempts,
		})
	}
}
