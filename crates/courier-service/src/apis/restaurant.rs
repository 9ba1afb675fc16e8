//! Restaurant endpoints: the actionable-orders dashboard and menu catalog.

use super::engine_error;
use courier_core::engine::ownership;
use courier_core::OrderLifecycleEngine;
use courier_types::{
	APIError, ListOrdersQuery, ListOrdersResponse, MenuItemRequest, MenuItemResponse, Principal,
};

/// Handles `GET /restaurants/{resId}/orders`.
pub async fn list_orders(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	restaurant_id: u64,
	query: ListOrdersQuery,
) -> Result<ListOrdersResponse, APIError> {
	ownership::authorize_restaurant(actor, restaurant_id).map_err(engine_error)?;
	let status = query.status_filter()?;
	let page = engine
		.list_actionable_orders(restaurant_id, status, query.page_number()?)
		.await
		.map_err(engine_error)?;
	Ok(page.into())
}

/// Handles `PUT /restaurants/{resId}/menu-items/{itemId}`.
pub async fn register_menu_item(
	engine: &OrderLifecycleEngine,
	actor: &Principal,
	restaurant_id: u64,
	item_id: u64,
	request: MenuItemRequest,
) -> Result<MenuItemResponse, APIError> {
	let item = engine
		.register_menu_item(actor, restaurant_id, item_id, &request.name, request.unit_price)
		.await
		.map_err(engine_error)?;
	Ok(item.into())
}
