//! Storage module for the order persistence system.
//!
//! This module provides the backing-store abstraction used by the order store,
//! the atomic batch writer that keeps an order record and the order index in
//! sync, and concrete backends (in-memory and Redis).

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

pub mod batch;
pub mod codec;
pub mod store;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
	pub mod redis;
}

pub use batch::{AtomicBatch, Mutation, MAX_BATCH_MUTATIONS};
pub use codec::{CodecError, OrderCodec};
pub use store::{OrderStore, OrderStoreError};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The key does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// The key exists but the operation required it to be absent.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// A mutation could not be queued onto a batch.
	#[error("Invalid mutation: {0}")]
	InvalidMutation(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Implementations must be safe to share between many concurrent callers.
/// No locking is done above this trait: every consistency guarantee the order
/// store offers comes from [`StorageInterface::commit`].
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Retrieves several keys in one round trip. Missing keys yield `None`
	/// at the matching position.
	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StorageError>;

	/// Stores the value only when the key is absent. Returns whether it was written.
	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError>;

	/// Overwrites the value only when the key exists. Returns whether it was written.
	async fn set_if_present(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError>;

	/// Deletes the key. Returns whether it existed.
	async fn delete(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns up to `count` members of an ordered set, starting at the
	/// zero-based position `start`.
	///
	/// Members are ordered by their byte-wise string value, so a position
	/// stays meaningful across calls as long as the set is not modified in
	/// between. A missing set reads as empty.
	async fn range_set(
		&self,
		set_key: &str,
		start: u64,
		count: usize,
	) -> Result<Vec<String>, StorageError>;

	/// Applies all mutations as one unit.
	///
	/// Every precondition is evaluated against the state before the batch.
	/// If any fails, nothing is applied and the failing key is reported as
	/// [`StorageError::AlreadyExists`] or [`StorageError::NotFound`].
	async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{memory, redis};

	vec![
		(memory::Registry::NAME, memory::Registry::factory()),
		(redis::Registry::NAME, redis::Registry::factory()),
	]
}
