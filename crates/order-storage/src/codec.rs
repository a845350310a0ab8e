//! Entity codec for stored orders.
//!
//! Orders are stored as the same JSON object that the API returns, so the
//! stored bytes can be inspected with any Redis client.

use order_types::Order;
use thiserror::Error;

/// Errors produced while converting orders to or from bytes.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("Failed to encode order {order_id}: {reason}")]
	Encode { order_id: u64, reason: String },
	#[error("Failed to decode order: {0}")]
	Decode(String),
}

/// JSON codec for [`Order`] values.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderCodec;

impl OrderCodec {
	pub fn encode(&self, order: &Order) -> Result<Vec<u8>, CodecError> {
		serde_json::to_vec(order).map_err(|e| CodecError::Encode {
			order_id: order.order_id,
			reason: e.to_string(),
		})
	}

	pub fn decode(&self, bytes: &[u8]) -> Result<Order, CodecError> {
		serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
	}
}
