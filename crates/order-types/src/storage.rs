//! Storage-related types for the order system.

use std::str::FromStr;

/// Storage keys for the order collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Namespace for individual order records (`order:{id}`)
	Order,
	/// Key of the ordered set holding every existing order key
	OrderIndex,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Order => "order",
			StorageKey::OrderIndex => "orders",
		}
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"order" => Ok(Self::Order),
			"orders" => Ok(Self::OrderIndex),
			_ => Err(()),
		}
	}
}

/// Derives the storage key under which an order's bytes live.
///
/// The numeric id is embedded verbatim, so distinct ids never share a key and
/// no order key can equal the index key.
pub fn order_key(order_id: u64) -> String {
	format!("{}:{}", StorageKey::Order.as_str(), order_id)
}

/// Returns the key of the order index set.
pub fn order_index_key() -> &'static str {
	StorageKey::OrderIndex.as_str()
}

/// Recovers the order id from a key produced by [`order_key`].
pub fn parse_order_key(key: &str) -> Option<u64> {
	let (namespace, id) = key.split_once(':')?;
	if namespace.parse::<StorageKey>() != Ok(StorageKey::Order) {
		return None;
	}
	// Reject forms like "+5" or "05" that would not round-trip
	let parsed = id.parse::<u64>().ok()?;
	(parsed.to_string() == id).then_some(parsed)
}
