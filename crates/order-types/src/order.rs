//! Order entity types.
//!
//! An order's lifecycle is encoded entirely in its timestamps: `created_at` is
//! set once at creation, `shipped_at` and `completed_at` appear on the ship
//! and complete transitions and are never cleared afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A customer order as persisted by the order store.
///
/// The same serde representation is used for the stored bytes and for the
/// HTTP wire format, so field names must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier assigned by the caller of insert.
	pub order_id: u64,
	/// Opaque customer identifier. Not validated against any registry.
	pub customer_id: Uuid,
	/// Ordered line items. Insertion order is preserved.
	pub line_items: Vec<LineItem>,
	/// Timestamp when this order was created.
	pub created_at: DateTime<Utc>,
	/// Timestamp of the ship transition, absent until shipped.
	#[serde(default)]
	pub shipped_at: Option<DateTime<Utc>>,
	/// Timestamp of the complete transition, absent until completed.
	#[serde(default)]
	pub completed_at: Option<DateTime<Utc>>,
}

/// A single line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
	pub item_id: Uuid,
	pub quantity: u64,
	pub price: u64,
}

impl Order {
	/// Creates a fresh order with no ship or complete timestamps.
	pub fn new(
		order_id: u64,
		customer_id: Uuid,
		line_items: Vec<LineItem>,
		created_at: DateTime<Utc>,
	) -> Self {
		Self {
			order_id,
			customer_id,
			line_items,
			created_at,
			shipped_at: None,
			completed_at: None,
		}
	}

	/// Returns the lifecycle status derived from the timestamps.
	pub fn status(&self) -> OrderStatus {
		match (self.shipped_at, self.completed_at) {
			(_, Some(_)) => OrderStatus::Completed,
			(Some(_), None) => OrderStatus::Shipped,
			(None, None) => OrderStatus::Created,
		}
	}
}

/// Lifecycle status of an order. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Created,
	Shipped,
	Completed,
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OrderStatus::Created => write!(f, "created"),
			OrderStatus::Shipped => write!(f, "shipped"),
			OrderStatus::Completed => write!(f, "completed"),
		}
	}
}

/// A requested status change on an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusTransition {
	/// Sets `shipped_at`. Only allowed while it is absent.
	#[serde(rename = "shipped")]
	Ship,
	/// Sets `completed_at`. Requires `shipped_at` and no prior completion.
	#[serde(rename = "completed")]
	Complete,
}

impl StatusTransition {
	/// The status an order ends up in after this transition.
	pub fn target(&self) -> OrderStatus {
		match self {
			StatusTransition::Ship => OrderStatus::Shipped,
			StatusTransition::Complete => OrderStatus::Completed,
		}
	}
}

impl FromStr for StatusTransition {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"shipped" => Ok(Self::Ship),
			"completed" => Ok(Self::Complete),
			other => Err(format!("unknown order status: {}", other)),
		}
	}
}
