//! Event types for the notification sink.
//!
//! Events are published on the event bus only after the storage commit that
//! produced them succeeded. Consumers must treat delivery as best effort.

use crate::{OrderStatus, Principal};
use serde::{Deserialize, Serialize};

/// Main event type published by the courier engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CourierEvent {
	/// Events about orders.
	Order(OrderEvent),
}

/// Events related to order processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
	/// A customer checked out a cart.
	Placed {
		order_id: u64,
		restaurant_id: u64,
		customer_id: u64,
	},
	/// An order moved to a new status.
	StatusChanged {
		order_id: u64,
		from: OrderStatus,
		to: OrderStatus,
		actor: Principal,
		record_id: String,
	},
	/// A driver was assigned to carry the order.
	DriverAssigned { order_id: u64, driver_id: u64 },
}
