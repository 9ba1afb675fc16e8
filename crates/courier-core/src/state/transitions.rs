//! The order status transition table.
//!
//! There is exactly one legal-transition graph for orders. It is built once
//! and handed to the engine at construction; nothing else decides whether a
//! status change is allowed.

use courier_types::OrderStatus;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

static STANDARD: Lazy<TransitionTable> = Lazy::new(|| {
	use OrderStatus::*;

	TransitionTable::from_edges(&[
		(Pending, &[Accepted, Cancelled]),
		(Accepted, &[Preparing, Cancelled]),
		(Preparing, &[ReadyForPickup, Cancelled]),
		(ReadyForPickup, &[OnDelivery, PickedUp, Cancelled]),
		(OnDelivery, &[Delivered, Cancelled]),
		(PickedUp, &[Completed]),
		(Delivered, &[Completed]),
		(Completed, &[]),
		(Cancelled, &[]),
	])
});

/// Directed graph of permitted status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
	edges: HashMap<OrderStatus, BTreeSet<OrderStatus>>,
}

impl TransitionTable {
	/// The marketplace's canonical table.
	pub fn standard() -> Self {
		STANDARD.clone()
	}

	pub fn from_edges(edges: &[(OrderStatus, &[OrderStatus])]) -> Self {
		let edges = edges
			.iter()
			.map(|(from, targets)| (*from, targets.iter().copied().collect()))
			.collect();
		Self { edges }
	}

	/// Legal targets from `from`, in vocabulary order.
	pub fn allowed_next(&self, from: OrderStatus) -> Vec<OrderStatus> {
		self.edges
			.get(&from)
			.map(|targets| targets.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn is_valid(&self, from: OrderStatus, to: OrderStatus) -> bool {
		self.edges
			.get(&from)
			.is_some_and(|targets| targets.contains(&to))
	}

	/// True when `path` starts at `Pending` and every step is an edge.
	pub fn is_lifecycle_path(&self, path: &[OrderStatus]) -> bool {
		path.first().is_none_or(|first| *first == OrderStatus::Pending)
			&& path.windows(2).all(|step| self.is_valid(step[0], step[1]))
	}
}
