//! Driver assignment.

use crate::engine::{event_bus::EventBus, ownership, EngineError};
use crate::state::repository::persistence;
use crate::state::OrderRepository;
use courier_storage::Batch;
use courier_types::{
	current_timestamp, CourierEvent, DeliveryAssignment, OrderEvent, OrderStatus, Principal,
	StorageKey,
};
use std::sync::Arc;
use tracing::instrument;

/// Statuses in which the carrying driver may still be chosen or replaced.
const ASSIGNABLE: [OrderStatus; 3] = [
	OrderStatus::Accepted,
	OrderStatus::Preparing,
	OrderStatus::ReadyForPickup,
];

/// Records which driver carries an order.
pub struct DispatchHandler {
	orders: Arc<OrderRepository>,
	event_bus: EventBus,
	max_attempts: u32,
}

impl DispatchHandler {
	pub fn new(orders: Arc<OrderRepository>, event_bus: EventBus, max_attempts: u32) -> Self {
		Self {
			orders,
			event_bus,
			max_attempts,
		}
	}

	/// Assigns or reassigns `driver_id` to the order.
	///
	/// Re-assigning the current driver is a no-op that returns the existing
	/// assignment.
	#[instrument(skip_all, fields(order_id = order_id, driver_id = driver_id, actor = %actor))]
	pub async fn assign_driver(
		&self,
		actor: &Principal,
		order_id: u64,
		driver_id: u64,
	) -> Result<DeliveryAssignment, EngineError> {
		for attempt in 1..=self.max_attempts {
			let stored = self.orders.load_order(order_id).await?;
			let order = &stored.value;
			ownership::authorize_restaurant(actor, order.restaurant_id)?;

			if !ASSIGNABLE.contains(&order.status) {
				return Err(EngineError::Validation(format!(
					"a driver cannot be assigned while the order is {}",
					order.status
				)));
			}

			let existing = self.orders.load_assignment(order_id).await?;
			if let Some(current) = existing.as_ref().filter(|a| a.value.driver_id == driver_id) {
				return Ok(current.value.clone());
			}

			let assignment = DeliveryAssignment {
				order_id,
				driver_id,
				assigned_by: *actor,
				assigned_at: current_timestamp(),
			};

			let id = order_id.to_string();
			let mut batch = Batch::new();
			batch.expect_unchanged(StorageKey::Orders, &id, &stored.raw);
			match &existing {
				Some(current) => batch.expect_unchanged(StorageKey::Deliveries, &id, &current.raw),
				None => batch.expect_absent(StorageKey::Deliveries, &id),
			};
			batch
				.put(StorageKey::Deliveries, &id, &assignment)
				.map_err(persistence)?;

			if self.orders.try_commit(batch).await? {
				tracing::info!(
					previous_driver = ?existing.map(|a| a.value.driver_id),
					"Driver assigned"
				);
				self.event_bus
					.publish(CourierEvent::Order(OrderEvent::DriverAssigned {
						order_id,
						driver_id,
					}))
					.ok();
				return Ok(assignment);
			}
			tracing::debug!(attempt, "Driver assignment raced, retrying");
		}

		Err(EngineError::ConcurrentModification {
			resource: format!("order {}", order_id),
			attempts: self.max_attempts,
		})
	}
}
