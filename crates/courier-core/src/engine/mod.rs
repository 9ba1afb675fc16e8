//! The order lifecycle engine.
//!
//! Every status change goes through [`OrderLifecycleEngine::request_transition`],
//! which checks terminal finality, ownership and the transition table, then
//! writes the updated order and its audit record in a single conditional
//! batch. Events are published only after that batch commits.

pub mod event_bus;
pub mod ownership;

use crate::handlers::{CatalogHandler, CheckoutHandler, DispatchHandler};
use crate::state::repository::{persistence, transition_key};
use crate::state::{OrderRepository, TransitionTable};
use courier_config::EngineConfig;
use courier_storage::{Batch, StorageService};
use courier_types::{
	current_timestamp, CheckoutItem, CourierEvent, DeliveryAssignment, DeliveryLocation,
	MenuItem, Order, OrderEvent, OrderOwnership, OrderStatus, OrderStatusView, OrderSummary,
	Page, Principal, StatusTransitionRecord, StorageKey, TransitionOutcome,
};
use event_bus::EventBus;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Order not found: {0}")]
	OrderNotFound(u64),
	#[error("Forbidden: {0}")]
	Forbidden(String),
	#[error("Cannot move order from {current} to {requested}")]
	InvalidTransition {
		current: OrderStatus,
		requested: OrderStatus,
		allowed_next: Vec<OrderStatus>,
	},
	#[error("Concurrent modification of {resource} after {attempts} attempt(s)")]
	ConcurrentModification { resource: String, attempts: u32 },
	#[error("Persistence error: {0}")]
	Persistence(String),
	#[error("Validation error: {0}")]
	Validation(String),
	#[error("Menu item not found: {0}")]
	MenuItemNotFound(u64),
}

/// Owns the transition table and is the only writer of order status.
pub struct OrderLifecycleEngine {
	config: EngineConfig,
	table: Arc<TransitionTable>,
	orders: Arc<OrderRepository>,
	event_bus: EventBus,
	checkout: CheckoutHandler,
	dispatch: DispatchHandler,
	catalog: CatalogHandler,
}

impl OrderLifecycleEngine {
	pub fn new(
		config: EngineConfig,
		storage: Arc<StorageService>,
		table: TransitionTable,
		event_bus: EventBus,
	) -> Self {
		let orders = Arc::new(OrderRepository::new(storage));
		let attempts = config.max_transition_attempts.max(1);

		Self {
			checkout: CheckoutHandler::new(orders.clone(), event_bus.clone(), attempts),
			dispatch: DispatchHandler::new(orders.clone(), event_bus.clone(), attempts),
			catalog: CatalogHandler::new(orders.clone(), attempts),
			config,
			table: Arc::new(table),
			orders,
			event_bus,
		}
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn transition_table(&self) -> &TransitionTable {
		&self.table
	}

	/// Moves an order to `requested` on behalf of `actor`.
	///
	/// A lost race where someone else already changed the status fails with
	/// `ConcurrentModification`; a lost race on an unchanged status (for
	/// example a driver reassigned in between) is retried up to the
	/// configured number of attempts.
	#[instrument(skip_all, fields(order_id = order_id, requested = %requested, actor = %actor))]
	pub async fn request_transition(
		&self,
		order_id: u64,
		requested: OrderStatus,
		actor: &Principal,
		note: Option<String>,
	) -> Result<TransitionOutcome, EngineError> {
		let max_attempts = self.config.max_transition_attempts.max(1);
		let mut observed = None;

		for attempt in 1..=max_attempts {
			let stored = self.orders.load_order(order_id).await?;
			let order = &stored.value;
			let current = order.status;

			if observed.is_some_and(|seen| seen != current) {
				tracing::warn!(
					attempt,
					%current,
					"Order status changed while the transition was in flight"
				);
				return Err(EngineError::ConcurrentModification {
					resource: format!("order {}", order_id),
					attempts: attempt - 1,
				});
			}
			observed = Some(current);

			if current.is_terminal() {
				return Err(EngineError::InvalidTransition {
					current,
					requested,
					allowed_next: Vec::new(),
				});
			}

			let assignment = self.orders.load_assignment(order_id).await?;
			let owner = OrderOwnership {
				restaurant_id: order.restaurant_id,
				driver_id: assignment.as_ref().map(|a| a.value.driver_id),
			};
			ownership::authorize_transition(actor, requested, &owner)?;

			if !self.table.is_valid(current, requested) {
				return Err(EngineError::InvalidTransition {
					current,
					requested,
					allowed_next: self.table.allowed_next(current),
				});
			}

			let now = current_timestamp();
			let sequence = order.version + 1;
			let record = StatusTransitionRecord {
				id: StatusTransitionRecord::record_id(order_id, sequence),
				order_id,
				sequence,
				from: current,
				to: requested,
				actor: *actor,
				at: now,
				note: note.clone(),
			};
			let updated = Order {
				status: requested,
				updated_at: now,
				version: sequence,
				..order.clone()
			};

			let id = order_id.to_string();
			let record_key = transition_key(order_id, sequence);
			let mut batch = Batch::new();
			batch.expect_unchanged(StorageKey::Orders, &id, &stored.raw);
			match &assignment {
				Some(held) => batch.expect_unchanged(StorageKey::Deliveries, &id, &held.raw),
				None => batch.expect_absent(StorageKey::Deliveries, &id),
			};
			batch
				.expect_absent(StorageKey::Transitions, &record_key)
				.put(StorageKey::Orders, &id, &updated)
				.map_err(persistence)?
				.put(StorageKey::Transitions, &record_key, &record)
				.map_err(persistence)?;

			if !self.orders.try_commit(batch).await? {
				tracing::debug!(attempt, "Transition lost a race, retrying");
				continue;
			}

			tracing::info!(from = %current, to = %requested, record_id = %record.id, "Order status changed");
			self.event_bus
				.publish(CourierEvent::Order(OrderEvent::StatusChanged {
					order_id,
					from: current,
					to: requested,
					actor: *actor,
					record_id: record.id.clone(),
				}))
				.ok();

			return Ok(TransitionOutcome {
				order_id,
				previous_status: current,
				new_status: requested,
				record_id: record.id,
			});
		}

		Err(EngineError::ConcurrentModification {
			resource: format!("order {}", order_id),
			attempts: max_attempts,
		})
	}

	/// Current status, full history and legal next statuses.
	#[instrument(skip_all, fields(order_id = order_id))]
	pub async fn get_order_status(&self, order_id: u64) -> Result<OrderStatusView, EngineError> {
		let order = self.orders.load_order(order_id).await?.value;
		let history = self.orders.history(order_id).await?;

		Ok(OrderStatusView {
			order_id,
			current_status: order.status,
			allowed_next: self.table.allowed_next(order.status),
			history,
		})
	}

	/// Fails with `Forbidden` unless `actor` may read the order.
	pub async fn authorize_view(&self, order_id: u64, actor: &Principal) -> Result<(), EngineError> {
		let order = self.orders.load_order(order_id).await?.value;
		let owner = self.resolve_order_owner(order_id).await?;
		ownership::authorize_view(actor, order.customer_id, &owner)
	}

	/// A restaurant's orders, oldest first, optionally narrowed to one status.
	#[instrument(skip_all, fields(restaurant_id = restaurant_id, page = page))]
	pub async fn list_actionable_orders(
		&self,
		restaurant_id: u64,
		status_filter: Option<OrderStatus>,
		page: u32,
	) -> Result<Page<OrderSummary>, EngineError> {
		if page < 1 {
			return Err(EngineError::Validation("page numbers start at 1".into()));
		}
		let page_size = self.config.page_size.max(1);

		let mut matching: Vec<Order> = self
			.orders
			.all_orders()
			.await?
			.into_iter()
			.filter(|order| order.restaurant_id == restaurant_id)
			.filter(|order| status_filter.is_none_or(|status| order.status == status))
			.collect();
		matching.sort_by_key(|order| (order.created_at, order.id));

		let total = matching.len();
		let skip = (page as usize - 1).saturating_mul(page_size as usize);
		let items = matching
			.iter()
			.skip(skip)
			.take(page_size as usize)
			.map(Order::summary)
			.collect();

		Ok(Page {
			page,
			page_size,
			total,
			items,
		})
	}

	/// The restaurant owning the order and the driver assigned to it.
	pub async fn resolve_order_owner(&self, order_id: u64) -> Result<OrderOwnership, EngineError> {
		let order = self.orders.load_order(order_id).await?.value;
		let assignment = self.orders.load_assignment(order_id).await?;
		Ok(OrderOwnership {
			restaurant_id: order.restaurant_id,
			driver_id: assignment.map(|a| a.value.driver_id),
		})
	}

	pub async fn place_order(
		&self,
		customer: &Principal,
		location: DeliveryLocation,
		cart: &[CheckoutItem],
	) -> Result<Order, EngineError> {
		self.checkout.place_order(customer, location, cart).await
	}

	pub async fn assign_driver(
		&self,
		actor: &Principal,
		order_id: u64,
		driver_id: u64,
	) -> Result<DeliveryAssignment, EngineError> {
		self.dispatch.assign_driver(actor, order_id, driver_id).await
	}

	pub async fn register_menu_item(
		&self,
		actor: &Principal,
		restaurant_id: u64,
		item_id: u64,
		name: &str,
		unit_price: u64,
	) -> Result<MenuItem, EngineError> {
		self.catalog
			.register_menu_item(actor, restaurant_id, item_id, name, unit_price)
			.await
	}
}

#[cfg(test)]
mod tests;
