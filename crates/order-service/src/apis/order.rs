//! Order API implementation.
//!
//! Input parsing and the mapping from store and state-machine failures onto
//! HTTP error responses. Handlers in `server` call into these functions.

use order_core::{OrderEngine, OrderStateError};
use order_storage::OrderStoreError;
use order_types::{
	APIError, CreateOrderRequest, ListOrdersResponse, Order, StatusTransition,
	UpdateOrderStatusRequest,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Seconds a client should wait before retrying after a 503.
const RETRY_AFTER_SECONDS: u64 = 1;

/// Errors caused by malformed request input.
#[derive(Debug, Error)]
pub enum InputError {
	#[error("Invalid order ID: {0}")]
	InvalidId(String),
	#[error("Invalid cursor: {0}")]
	InvalidCursor(String),
	#[error("Invalid request body: {0}")]
	InvalidBody(String),
	#[error("{0}")]
	InvalidStatus(String),
}

impl From<InputError> for APIError {
	fn from(err: InputError) -> Self {
		let error_type = match err {
			InputError::InvalidId(_) => "INVALID_ORDER_ID",
			InputError::InvalidCursor(_) => "INVALID_CURSOR",
			InputError::InvalidBody(_) => "INVALID_REQUEST",
			InputError::InvalidStatus(_) => "INVALID_STATUS",
		};
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: err.to_string(),
		}
	}
}

/// Maps an order store failure onto an API error.
pub fn store_error(err: OrderStoreError) -> APIError {
	let message = err.to_string();
	match err {
		OrderStoreError::NotFound { .. } => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message,
		},
		OrderStoreError::AlreadyExists { .. } => APIError::Conflict {
			error_type: "ORDER_EXISTS".to_string(),
			message,
		},
		OrderStoreError::Unavailable { .. } => APIError::ServiceUnavailable {
			error_type: "STORE_UNAVAILABLE".to_string(),
			message,
			retry_after: Some(RETRY_AFTER_SECONDS),
		},
		OrderStoreError::Cancelled { .. } => APIError::ServiceUnavailable {
			error_type: "REQUEST_CANCELLED".to_string(),
			message,
			retry_after: Some(RETRY_AFTER_SECONDS),
		},
		OrderStoreError::Corruption { .. } | OrderStoreError::EncodingFailure { .. } => {
			tracing::error!(error = %message, "Order data could not be processed");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".to_string(),
				message,
			}
		},
	}
}

/// Maps a failed status transition onto an API error.
pub fn state_error(err: OrderStateError) -> APIError {
	match err {
		OrderStateError::Store(e) => store_error(e),
		invalid @ OrderStateError::InvalidTransition { .. } => APIError::BadRequest {
			error_type: "INVALID_TRANSITION".to_string(),
			message: invalid.to_string(),
		},
	}
}

/// Parses the `{id}` path segment.
pub fn parse_order_id(raw: &str) -> Result<u64, InputError> {
	raw.parse()
		.map_err(|_| InputError::InvalidId(format!("'{}' is not an unsigned integer", raw)))
}

/// Parses the optional `cursor` query parameter; absent means the first page.
pub fn parse_cursor(raw: Option<&str>) -> Result<u64, InputError> {
	match raw {
		None | Some("") => Ok(0),
		Some(value) => value
			.parse()
			.map_err(|_| InputError::InvalidCursor(format!("'{}' is not a valid cursor", value))),
	}
}

pub async fn create_order(
	engine: &OrderEngine,
	request: CreateOrderRequest,
	cancel: &CancellationToken,
) -> Result<Order, APIError> {
	engine
		.create_order(request.customer_id, request.line_items, cancel)
		.await
		.map_err(store_error)
}

pub async fn get_order(
	engine: &OrderEngine,
	order_id: u64,
	cancel: &CancellationToken,
) -> Result<Order, APIError> {
	engine.get_order(order_id, cancel).await.map_err(store_error)
}

pub async fn list_orders(
	engine: &OrderEngine,
	cursor: u64,
	cancel: &CancellationToken,
) -> Result<ListOrdersResponse, APIError> {
	let page = engine
		.list_orders(cursor, cancel)
		.await
		.map_err(store_error)?;
	Ok(page.into())
}

/// Applies the status named in the request body.
pub async fn update_order_status(
	engine: &OrderEngine,
	order_id: u64,
	request: UpdateOrderStatusRequest,
	cancel: &CancellationToken,
) -> Result<Order, APIError> {
	let transition: StatusTransition = request
		.status
		.parse()
		.map_err(InputError::InvalidStatus)?;
	engine
		.transition_order(order_id, transition, cancel)
		.await
		.map_err(state_error)
}

pub async fn delete_order(
	engine: &OrderEngine,
	order_id: u64,
	cancel: &CancellationToken,
) -> Result<(), APIError> {
	engine
		.delete_order(order_id, cancel)
		.await
		.map_err(store_error)
}
