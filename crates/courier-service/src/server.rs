//! HTTP server for the courier API.
//!
//! Routes live under `/api`. Every route except `/api/health` requires an
//! `Authorization: Bearer <token>` header.

use crate::apis::{self, auth_error};
use axum::{
	extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State},
	http::{header, request::Parts, HeaderName, HeaderValue, Method},
	response::Json,
	routing::{get, post, put},
	Router,
};
use courier_config::{ApiConfig, CorsConfig};
use courier_core::{AuthService, OrderLifecycleEngine};
use courier_types::{
	APIError, AssignDriverRequest, AssignmentResponse, CheckoutRequest, ListOrdersQuery,
	ListOrdersResponse, MenuItemRequest, MenuItemResponse, OrderResponse, OrderStatusResponse,
	Principal, TransitionRequest, TransitionResponse,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<OrderLifecycleEngine>,
	pub auth: Arc<AuthService>,
}

/// Principal resolved from the request's bearer token.
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
	type Rejection = APIError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let header = parts
			.headers
			.get(header::AUTHORIZATION)
			.and_then(|value| value.to_str().ok());
		let principal = state
			.auth
			.authenticate_header(header)
			.await
			.map_err(auth_error)?;
		Ok(Authenticated(principal))
	}
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let mut layer = CorsLayer::new();
	layer = if cors.allowed_origins.iter().any(|o| o == "*") {
		layer.allow_origin(Any)
	} else {
		let origins: Vec<HeaderValue> = cors
			.allowed_origins
			.iter()
			.filter_map(|o| o.parse().ok())
			.collect();
		layer.allow_origin(origins)
	};
	let methods: Vec<Method> = cors
		.allowed_methods
		.iter()
		.filter_map(|m| m.parse().ok())
		.collect();
	let headers: Vec<HeaderName> = cors
		.allowed_headers
		.iter()
		.filter_map(|h| h.parse().ok())
		.collect();
	layer.allow_methods(methods).allow_headers(headers)
}

/// Builds the application router.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/health", get(handle_health))
				.route("/orders", post(handle_place_order))
				.route(
					"/orders/{order_id}/status",
					get(handle_get_status).post(handle_transition),
				)
				.route("/orders/{order_id}/driver", put(handle_assign_driver))
				.route("/restaurants/{restaurant_id}/orders", get(handle_list_orders))
				.route(
					"/restaurants/{restaurant_id}/menu-items/{item_id}",
					put(handle_register_menu_item),
				),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderLifecycleEngine>,
	auth: Arc<AuthService>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState { engine, auth }, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Courier API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

async fn handle_health() -> Json<serde_json::Value> {
	Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_transition(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Path(order_id): Path<u64>,
	Json(request): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, APIError> {
	apis::order::request_transition(&state.engine, &actor, order_id, request)
		.await
		.map(Json)
}

async fn handle_get_status(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Path(order_id): Path<u64>,
) -> Result<Json<OrderStatusResponse>, APIError> {
	apis::order::get_order_status(&state.engine, &actor, order_id)
		.await
		.map(Json)
}

async fn handle_place_order(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Json(request): Json<CheckoutRequest>,
) -> Result<Json<OrderResponse>, APIError> {
	apis::order::place_order(&state.engine, &actor, request)
		.await
		.map(Json)
}

async fn handle_assign_driver(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Path(order_id): Path<u64>,
	Json(request): Json<AssignDriverRequest>,
) -> Result<Json<AssignmentResponse>, APIError> {
	apis::order::assign_driver(&state.engine, &actor, order_id, request)
		.await
		.map(Json)
}

async fn handle_list_orders(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Path(restaurant_id): Path<u64>,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Json<ListOrdersResponse>, APIError> {
	apis::restaurant::list_orders(&state.engine, &actor, restaurant_id, query)
		.await
		.map(Json)
}

async fn handle_register_menu_item(
	State(state): State<AppState>,
	Authenticated(actor): Authenticated,
	Path((restaurant_id, item_id)): Path<(u64, u64)>,
	Json(request): Json<MenuItemRequest>,
) -> Result<Json<MenuItemResponse>, APIError> {
	apis::restaurant::register_menu_item(&state.engine, &actor, restaurant_id, item_id, request)
		.await
		.map(Json)
}
