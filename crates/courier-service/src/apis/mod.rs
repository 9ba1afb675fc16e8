//! HTTP API handlers.
//!
//! Handlers translate requests into engine calls and engine errors into
//! [`APIError`] responses.

pub mod order;
pub mod restaurant;

use courier_core::{AuthError, EngineError};
use courier_types::APIError;

/// Seconds a client should wait before retrying a lost race.
const CONFLICT_RETRY_AFTER: u64 = 1;

/// Maps an engine failure to its HTTP representation.
pub fn engine_error(e: EngineError) -> APIError {
	let message = e.to_string();
	match e {
		EngineError::OrderNotFound(_) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message,
		},
		EngineError::Forbidden(message) => APIError::Forbidden { message },
		EngineError::InvalidTransition {
			current,
			allowed_next,
			..
		} => APIError::Conflict {
			error_type: "INVALID_TRANSITION".into(),
			message,
			details: Some(serde_json::json!({
				"currentStatus": current,
				"allowedNext": allowed_next,
			})),
			retry_after: None,
		},
		EngineError::ConcurrentModification { attempts, .. } => APIError::Conflict {
			error_type: "CONCURRENT_MODIFICATION".into(),
			message,
			details: Some(serde_json::json!({ "attempts": attempts })),
			retry_after: Some(CONFLICT_RETRY_AFTER),
		},
		EngineError::Persistence(_) => {
			tracing::error!(error = %message, "Persistence failure");
			APIError::InternalServerError {
				error_type: "PERSISTENCE_ERROR".into(),
				message: "the order store is unavailable".into(),
			}
		},
		EngineError::Validation(_) => APIError::BadRequest {
			error_type: "VALIDATION_ERROR".into(),
			message,
			details: None,
		},
		EngineError::MenuItemNotFound(id) => APIError::UnprocessableEntity {
			error_type: "MENU_ITEM_NOT_FOUND".into(),
			message,
			details: Some(serde_json::json!({ "menuItemId": id })),
		},
	}
}

pub fn auth_error(e: AuthError) -> APIError {
	match e {
		AuthError::Unauthenticated(message) => APIError::Unauthorized { message },
		AuthError::Configuration(message) => APIError::InternalServerError {
			error_type: "AUTH_CONFIGURATION".into(),
			message,
		},
	}
}
