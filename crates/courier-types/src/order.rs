//! Order types for the courier service.
//!
//! This module defines orders and their line items, the closed status
//! vocabulary, the append-only transition audit record and the read models
//! returned by the lifecycle engine.

use crate::Principal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a status string is not part of the vocabulary.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

/// Status of an order in its fulfillment lifecycle.
///
/// The set is closed; `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Placed by the customer, waiting for the restaurant.
	Pending,
	/// Accepted by the restaurant.
	Accepted,
	/// Being prepared in the kitchen.
	Preparing,
	/// Packed and waiting for a driver or the customer.
	ReadyForPickup,
	/// A driver is carrying the order to the customer.
	OnDelivery,
	/// Handed over directly at the counter.
	PickedUp,
	/// Dropped off at the delivery location.
	Delivered,
	/// Fulfillment finished.
	Completed,
	/// Cancelled before hand-off.
	Cancelled,
}

impl OrderStatus {
	/// Every status, in lifecycle order.
	pub const ALL: [OrderStatus; 9] = [
		OrderStatus::Pending,
		OrderStatus::Accepted,
		OrderStatus::Preparing,
		OrderStatus::ReadyForPickup,
		OrderStatus::OnDelivery,
		OrderStatus::PickedUp,
		OrderStatus::Delivered,
		OrderStatus::Completed,
		OrderStatus::Cancelled,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "PENDING",
			OrderStatus::Accepted => "ACCEPTED",
			OrderStatus::Preparing => "PREPARING",
			OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
			OrderStatus::OnDelivery => "ON_DELIVERY",
			OrderStatus::PickedUp => "PICKED_UP",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Completed => "COMPLETED",
			OrderStatus::Cancelled => "CANCELLED",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = UnknownStatus;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str().eq_ignore_ascii_case(s))
			.ok_or_else(|| UnknownStatus(s.to_string()))
	}
}

/// Where the order should be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryLocation {
	Coordinates { lat: f64, lng: f64 },
	Address(String),
}

impl DeliveryLocation {
	pub fn is_empty(&self) -> bool {
		match self {
			DeliveryLocation::Address(address) => address.trim().is_empty(),
			DeliveryLocation::Coordinates { lat, lng } => !lat.is_finite() || !lng.is_finite(),
		}
	}
}

/// One menu item and quantity within an order.
///
/// The unit price is copied from the menu at checkout so historical totals
/// do not follow later price changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
	pub menu_item_id: u64,
	pub quantity: u32,
	/// Price per unit in minor currency units.
	pub unit_price: u64,
}

impl OrderLineItem {
	pub fn subtotal(&self) -> u64 {
		self.unit_price.saturating_mul(u64::from(self.quantity))
	}
}

/// A customer purchase against a single restaurant's menu.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
	/// Unique, immutable identifier.
	pub id: u64,
	pub customer_id: u64,
	/// Restaurant owning every line item, recorded at checkout.
	pub restaurant_id: u64,
	pub location: DeliveryLocation,
	pub status: OrderStatus,
	pub items: Vec<OrderLineItem>,
	pub created_at: u64,
	pub updated_at: u64,
	/// Number of transitions applied so far.
	#[serde(default)]
	pub version: u64,
}

impl Order {
	pub fn total(&self) -> u64 {
		self.items
			.iter()
			.fold(0u64, |acc, item| acc.saturating_add(item.subtotal()))
	}

	/// Total units across all line items.
	pub fn item_count(&self) -> u64 {
		self.items
			.iter()
			.fold(0u64, |acc, item| acc.saturating_add(u64::from(item.quantity)))
	}

	pub fn summary(&self) -> OrderSummary {
		OrderSummary {
			id: self.id,
			customer_id: self.customer_id,
			status: self.status,
			location: self.location.clone(),
			item_count: self.item_count(),
			total: self.total(),
			created_at: self.created_at,
			updated_at: self.updated_at,
		}
	}
}

/// Append-only audit entry for one status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransitionRecord {
	/// `"{order_id}-{sequence}"`.
	pub id: String,
	pub order_id: u64,
	/// 1-based position in the order's history.
	pub sequence: u64,
	pub from: OrderStatus,
	pub to: OrderStatus,
	pub actor: Principal,
	pub at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl StatusTransitionRecord {
	pub fn record_id(order_id: u64, sequence: u64) -> String {
		format!("{}-{}", order_id, sequence)
	}
}

/// Driver assigned to carry an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAssignment {
	pub order_id: u64,
	pub driver_id: u64,
	pub assigned_by: Principal,
	pub assigned_at: u64,
}

/// A purchasable menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
	pub id: u64,
	pub restaurant_id: u64,
	pub name: String,
	pub unit_price: u64,
}

/// Who may act on an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderOwnership {
	pub restaurant_id: u64,
	pub driver_id: Option<u64>,
}

/// Compact order view used by dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
	pub id: u64,
	pub customer_id: u64,
	pub status: OrderStatus,
	pub location: DeliveryLocation,
	pub item_count: u64,
	pub total: u64,
	pub created_at: u64,
	pub updated_at: u64,
}

/// Current status, history and legal next moves for one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusView {
	pub order_id: u64,
	pub current_status: OrderStatus,
	pub allowed_next: Vec<OrderStatus>,
	/// Oldest first.
	pub history: Vec<StatusTransitionRecord>,
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
	pub order_id: u64,
	pub previous_status: OrderStatus,
	pub new_status: OrderStatus,
	pub record_id: String,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
	/// 1-based page number.
	pub page: u32,
	pub page_size: u32,
	/// Number of matching items across all pages.
	pub total: usize,
	pub items: Vec<T>,
}
