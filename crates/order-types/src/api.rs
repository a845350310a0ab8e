//! API types for the order HTTP API and the paginated store contract.

use crate::{LineItem, Order};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Page request for enumerating orders.
///
/// `offset` is the cursor returned by the previous page (0 starts from the
/// beginning). It is a position in the order index, not a page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindAllPage {
	pub offset: u64,
	pub size: u64,
}

/// One page of orders plus the cursor for the next page.
///
/// A cursor of 0 means there are no further pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindResult {
	pub orders: Vec<Order>,
	pub cursor: u64,
}

/// Request body for creating an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub customer_id: Uuid,
	#[serde(default)]
	pub line_items: Vec<LineItem>,
}

/// Request body for a status change (`"shipped"` or `"completed"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
	pub status: String,
}

/// Query string of the list endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrdersQuery {
	pub cursor: Option<String>,
}

/// Response of the list endpoint. `next` is omitted on the last page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOrdersResponse {
	pub items: Vec<Order>,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub next: u64,
}

fn is_zero(value: &u64) -> bool {
	*value == 0
}

impl From<FindResult> for ListOrdersResponse {
	fn from(result: FindResult) -> Self {
		Self {
			items: result.orders,
			next: result.cursor,
		}
	}
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed input or a disallowed status transition (400)
	BadRequest { error_type: String, message: String },
	/// The order does not exist (404)
	NotFound { error_type: String, message: String },
	/// The order id is already taken (409)
	Conflict { error_type: String, message: String },
	/// Backing store unreachable, timed out or request cancelled (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Corrupt stored data or encoding failure (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message, retry_after) = match self {
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type, message, None),
			APIError::ServiceUnavailable {
				error_type,
				message,
				retry_after,
			} => (error_type, message, *retry_after),
		};

		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
