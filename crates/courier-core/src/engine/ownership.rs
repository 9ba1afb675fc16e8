//! Who may move an order into a given status.

use super::EngineError;
use courier_types::{OrderOwnership, OrderStatus, Principal, Role};

/// Party whose identity gates a target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
	Restaurant,
	Driver,
	RestaurantOrDriver,
}

impl Gate {
	pub fn for_target(target: OrderStatus) -> Self {
		match target {
			OrderStatus::OnDelivery | OrderStatus::PickedUp | OrderStatus::Delivered => Gate::Driver,
			OrderStatus::Completed => Gate::RestaurantOrDriver,
			OrderStatus::Pending
			| OrderStatus::Accepted
			| OrderStatus::Preparing
			| OrderStatus::ReadyForPickup
			| OrderStatus::Cancelled => Gate::Restaurant,
		}
	}
}

fn is_assigned_driver(actor: &Principal, ownership: &OrderOwnership) -> bool {
	ownership
		.driver_id
		.is_some_and(|driver_id| actor.is_driver(driver_id))
}

/// Checks that `actor` may request `target` on an order owned as described.
///
/// Admins pass every gate; customers never do.
pub fn authorize_transition(
	actor: &Principal,
	target: OrderStatus,
	ownership: &OrderOwnership,
) -> Result<(), EngineError> {
	if actor.is_admin() {
		return Ok(());
	}

	let is_restaurant = actor.is_restaurant(ownership.restaurant_id);
	let allowed = match Gate::for_target(target) {
		Gate::Restaurant => is_restaurant,
		Gate::Driver => is_assigned_driver(actor, ownership),
		Gate::RestaurantOrDriver => is_restaurant || is_assigned_driver(actor, ownership),
	};

	if allowed {
		Ok(())
	} else {
		Err(EngineError::Forbidden(format!(
			"{} may not move this order to {}",
			actor, target
		)))
	}
}

/// Checks that `actor` may read an order's status and history.
pub fn authorize_view(
	actor: &Principal,
	customer_id: u64,
	ownership: &OrderOwnership,
) -> Result<(), EngineError> {
	let allowed = match actor.role {
		Role::Admin => true,
		Role::Restaurant => actor.id == ownership.restaurant_id,
		Role::Driver => is_assigned_driver(actor, ownership),
		Role::Customer => actor.id == customer_id,
	};
	if allowed {
		Ok(())
	} else {
		Err(EngineError::Forbidden(format!("{} may not view this order", actor)))
	}
}

/// Checks that `actor` acts for `restaurant_id`.
pub fn authorize_restaurant(actor: &Principal, restaurant_id: u64) -> Result<(), EngineError> {
	if actor.is_admin() || actor.is_restaurant(restaurant_id) {
		Ok(())
	} else {
		Err(EngineError::Forbidden(format!(
			"{} does not act for restaurant {}",
			actor, restaurant_id
		)))
	}
}
