//! API types for the courier HTTP API.
//!
//! Request and response bodies for the order status, dashboard, checkout,
//! driver assignment and catalog endpoints, plus the structured error type
//! every handler returns.

use crate::{
	DeliveryAssignment, DeliveryLocation, MenuItem, Order, OrderStatus, OrderStatusView,
	OrderSummary, Page, StatusTransitionRecord, TransitionOutcome, UnknownStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /orders/{orderId}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
	pub status: OrderStatus,
	#[serde(default)]
	pub note: Option<String>,
}

/// Successful transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
	pub order_id: u64,
	pub previous_status: OrderStatus,
	pub new_status: OrderStatus,
	pub record_id: String,
}

impl From<TransitionOutcome> for TransitionResponse {
	fn from(outcome: TransitionOutcome) -> Self {
		Self {
			order_id: outcome.order_id,
			previous_status: outcome.previous_status,
			new_status: outcome.new_status,
			record_id: outcome.record_id,
		}
	}
}

/// One history row as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
	pub from: OrderStatus,
	pub to: OrderStatus,
	pub actor: String,
	pub at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
}

impl From<StatusTransitionRecord> for HistoryEntry {
	fn from(record: StatusTransitionRecord) -> Self {
		Self {
			from: record.from,
			to: record.to,
			actor: record.actor.to_string(),
			at: record.at,
			note: record.note,
		}
	}
}

/// Body of `GET /orders/{orderId}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
	pub order_id: u64,
	pub current_status: OrderStatus,
	pub allowed_next: Vec<OrderStatus>,
	pub history: Vec<HistoryEntry>,
}

impl From<OrderStatusView> for OrderStatusResponse {
	fn from(view: OrderStatusView) -> Self {
		Self {
			order_id: view.order_id,
			current_status: view.current_status,
			allowed_next: view.allowed_next,
			history: view.history.into_iter().map(HistoryEntry::from).collect(),
		}
	}
}

/// Query string of `GET /restaurants/{resId}/orders`.
///
/// Both parameters arrive as raw text so that `?status=&page=` means
/// "no filter, first page".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
	pub status: Option<String>,
	pub page: Option<String>,
}

impl ListOrdersQuery {
	/// The requested status filter, matched case-insensitively.
	pub fn status_filter(&self) -> Result<Option<OrderStatus>, APIError> {
		match self.status.as_deref().map(str::trim) {
			None | Some("") => Ok(None),
			Some(raw) => raw.parse().map(Some).map_err(|e: UnknownStatus| APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message: e.to_string(),
				details: None,
			}),
		}
	}

	/// The requested page, defaulting to the first.
	pub fn page_number(&self) -> Result<u32, APIError> {
		match self.page.as_deref().map(str::trim) {
			None | Some("") => Ok(1),
			Some(raw) => raw.parse().map_err(|_| APIError::BadRequest {
				error_type: "VALIDATION_ERROR".to_string(),
				message: format!("invalid page number '{}'", raw),
				details: None,
			}),
		}
	}
}

/// FIFO-ordered page of actionable orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersResponse {
	pub page: u32,
	pub page_size: u32,
	pub total: usize,
	pub orders: Vec<OrderSummary>,
}

impl From<Page<OrderSummary>> for ListOrdersResponse {
	fn from(page: Page<OrderSummary>) -> Self {
		Self {
			page: page.page,
			page_size: page.page_size,
			total: page.total,
			orders: page.items,
		}
	}
}

/// One cart line submitted at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
	pub menu_item_id: u64,
	pub quantity: u32,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
	pub location: DeliveryLocation,
	pub items: Vec<CheckoutItem>,
}

/// Order as returned to its customer after checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
	pub id: u64,
	pub customer_id: u64,
	pub restaurant_id: u64,
	pub location: DeliveryLocation,
	pub status: OrderStatus,
	pub total: u64,
	pub created_at: u64,
}

impl From<Order> for OrderResponse {
	fn from(order: Order) -> Self {
		Self {
			total: order.total(),
			id: order.id,
			customer_id: order.customer_id,
			restaurant_id: order.restaurant_id,
			location: order.location,
			status: order.status,
			created_at: order.created_at,
		}
	}
}

/// Body of `PUT /orders/{orderId}/driver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignDriverRequest {
	pub driver_id: u64,
}

/// Driver assignment as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
	pub order_id: u64,
	pub driver_id: u64,
	pub assigned_by: String,
	pub assigned_at: u64,
}

impl From<DeliveryAssignment> for AssignmentResponse {
	fn from(assignment: DeliveryAssignment) -> Self {
		Self {
			order_id: assignment.order_id,
			driver_id: assignment.driver_id,
			assigned_by: assignment.assigned_by.to_string(),
			assigned_at: assignment.assigned_at,
		}
	}
}

/// Body of `PUT /restaurants/{resId}/menu-items/{itemId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemRequest {
	pub name: String,
	pub unit_price: u64,
}

/// Menu item as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemResponse {
	pub id: u64,
	pub restaurant_id: u64,
	pub name: String,
	pub unit_price: u64,
}

impl From<MenuItem> for MenuItemResponse {
	fn from(item: MenuItem) -> Self {
		Self {
			id: item.id,
			restaurant_id: item.restaurant_id,
			name: item.name,
			unit_price: item.unit_price,
		}
	}
}

/// API error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed input (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Missing or unknown credential (401)
	Unauthorized { message: String },
	/// Caller may not act on the resource (403)
	Forbidden { message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with current state (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
		retry_after: Option<u64>,
	},
	/// Well-formed input rejected by business rules (422)
	UnprocessableEntity {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
				details,
			} => (error_type.clone(), message.clone(), details.clone(), None),
			APIError::Unauthorized { message } => {
				("UNAUTHENTICATED".to_string(), message.clone(), None, None)
			},
			APIError::Forbidden { message } => {
				("FORBIDDEN".to_string(), message.clone(), None, None)
			},
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type.clone(), message.clone(), None, None),
			APIError::Conflict {
				error_type,
				message,
				details,
				retry_after,
			} => (
				error_type.clone(),
				message.clone(),
				details.clone(),
				*retry_after,
			),
		};

		ErrorResponse {
			error,
			message,
			details,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
			APIError::Forbidden { message } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::UnprocessableEntity { message, .. } => {
				write!(f, "Unprocessable Entity: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		(status, Json(self.to_error_response())).into_response()
	}
}
