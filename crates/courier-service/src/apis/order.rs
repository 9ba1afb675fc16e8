//! Order endpoints: status transitions, status and history, checkout and
//! driver assignment.

use super::engine_error;
use courier_core::OrderLifecycleEngine;
use courier_types::{
	APIError, AssignDriverRequest, AssignmentResponse, CheckoutRequest, OrderResponse,
	OrderStatusResponse, Principal, TransitionRequest, TransitionResponse,
};
use tracing::warn;

/// Handles `POST /orders/{orderId}/status`.
pub async fn request_transition(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	order_id: u64,
	request: TransitionRequest,
) -> Result<TransitionResponse, APIError> {
	engine
		.request_transition(order_id, request.status, actor, request.note)
		.await
		.map(TransitionResponse::from)
		.map_err(|e| {
			warn!(order_id, requested = %request.status, error = %e, "Transition rejected");
			engine_error(e)
		})
}

/// Handles `GET /orders/{orderId}/status`.
pub async fn get_order_status(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	order_id: u64,
) -> Result<OrderStatusResponse, APIError> {
	engine
		.authorize_view(order_id, actor)
		.await
		.map_err(engine_error)?;
	let view = engine.get_order_status(order_id).await.map_err(engine_error)?;
	Ok(view.into())
}

/// Handles `POST /orders`.
pub async fn place_order(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	request: CheckoutRequest,
) -> Result<OrderResponse, APIError> {
	let order = engine
		.place_order(actor, request.location, &request.items)
		.await
		.map_err(engine_error)?;
	Ok(order.into())
}

/// Handles `PUT /orders/{orderId}/driver`.
pub async fn assign_driver(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	order_id: u64,
	request: AssignDriverRequest,
) -> Result<AssignmentResponse, APIError> {
	let assignment = engine
		.assign_driver(actor, order_id, request.driver_id)
		.await
		.map_err(engine_error)?;
	Ok(assignment.into())
}
