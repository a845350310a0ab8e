//! Order store.
//!
//! Persists orders through a [`StorageInterface`] backend. Each order lives
//! under its own key (see [`order_key`]) and every existing order key is also
//! a member of the order index set, which is what [`OrderStore::find_all`]
//! pages through. Insert and delete change both in one [`AtomicBatch`] so the
//! index never disagrees with the records.
//!
//! The index is ordered by key string, and a cursor is the position of the
//! first index entry of the next page. Pages are stable while the index is
//! unchanged; an insert or delete made while a caller is paging shifts later
//! positions, so an order can then be skipped or returned twice.

use crate::{AtomicBatch, CodecError, Mutation, OrderCodec, StorageError, StorageInterface};
use order_types::{
	order_index_key, order_key, parse_order_key, FindAllPage, FindResult, Order,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default upper bound for a single backend round trip.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned by the order store.
///
/// Every variant names the storage key involved so failures can be traced
/// back to a single record.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Order not found: {key}")]
	NotFound { key: String },
	#[error("Order already exists: {key}")]
	AlreadyExists { key: String },
	#[error("Corrupt order data at {key}: {reason}")]
	Corruption { key: String, reason: String },
	#[error("Storage unavailable during {operation} on {key}: {reason}")]
	Unavailable {
		operation: &'static str,
		key: String,
		reason: String,
	},
	#[error("Failed to encode order during {operation} on {key}: {reason}")]
	EncodingFailure {
		operation: &'static str,
		key: String,
		reason: String,
	},
	#[error("{operation} on {key} was cancelled")]
	Cancelled { operation: &'static str, key: String },
}

impl OrderStoreError {
	/// Classifies a backend error raised while performing `operation` on `key`.
	fn from_storage(operation: &'static str, key: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound(key) => Self::NotFound { key },
			StorageError::AlreadyExists(key) => Self::AlreadyExists { key },
			StorageError::InvalidMutation(reason) => Self::EncodingFailure {
				operation,
				key: key.to_string(),
				reason,
			},
			StorageError::Backend(reason) | StorageError::Configuration(reason) => {
				Self::Unavailable {
					operation,
					key: key.to_string(),
					reason,
				}
			},
		}
	}

	fn from_codec(operation: &'static str, key: &str, err: CodecError) -> Self {
		match err {
			CodecError::Encode { reason, .. } => Self::EncodingFailure {
				operation,
				key: key.to_string(),
				reason,
			},
			CodecError::Decode(reason) => Self::Corruption {
				key: key.to_string(),
				reason,
			},
		}
	}
}

/// Persistence for [`Order`] values with a secondary index for pagination.
///
/// The store holds no locks of its own; concurrent updates to the same order
/// are last-writer-wins.
pub struct OrderStore {
	backend: Arc<dyn StorageInterface>,
	codec: OrderCodec,
	operation_timeout: Duration,
}

impl OrderStore {
	/// Creates a store over the given backend with the default timeout.
	pub fn new(backend: Arc<dyn StorageInterface>) -> Self {
		Self {
			backend,
			codec: OrderCodec,
			operation_timeout: DEFAULT_OPERATION_TIMEOUT,
		}
	}

	/// Sets the upper bound applied to every backend round trip.
	pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
		self.operation_timeout = timeout;
		self
	}

	/// Persists a new order and adds it to the index in one atomic batch.
	///
	/// Fails with [`OrderStoreError::AlreadyExists`] if an order with the same
	/// id is stored; in that case neither the record nor the index changes.
	pub async fn insert(
		&self,
		order: &Order,
		cancel: &CancellationToken,
	) -> Result<(), OrderStoreError> {
		const OP: &str = "insert";
		let key = order_key(order.order_id);
		let bytes = self
			.codec
			.encode(order)
			.map_err(|e| OrderStoreError::from_codec(OP, &key, e))?;

		let mut batch = AtomicBatch::begin(self.backend.as_ref());
		let queued = batch.queue_all([
			Mutation::SetIfAbsent {
				key: key.clone(),
				value: bytes,
			},
			Mutation::AddToSet {
				set: order_index_key().to_string(),
				member: key.clone(),
			},
		]);
		if let Err(e) = queued {
			batch.discard();
			return Err(OrderStoreError::from_storage(OP, &key, e));
		}

		self.run(cancel, OP, &key, batch.commit()).await?;
		tracing::info!(order_id = order.order_id, key = %key, "Inserted order");
		Ok(())
	}

	/// Loads a single order.
	pub async fn find_by_id(
		&self,
		order_id: u64,
		cancel: &CancellationToken,
	) -> Result<Order, OrderStoreError> {
		const OP: &str = "find_by_id";
		let key = order_key(order_id);
		let bytes = self
			.run(cancel, OP, &key, self.backend.get_bytes(&key))
			.await?;
		self.decode_at(OP, &key, &bytes)
	}

	/// Overwrites an existing order.
	///
	/// Fails with [`OrderStoreError::NotFound`] and writes nothing if the
	/// order does not exist. The index is left alone.
	pub async fn update(
		&self,
		order: &Order,
		cancel: &CancellationToken,
	) -> Result<(), OrderStoreError> {
		const OP: &str = "update";
		let key = order_key(order.order_id);
		let bytes = self
			.codec
			.encode(order)
			.map_err(|e| OrderStoreError::from_codec(OP, &key, e))?;

		let written = self
			.run(cancel, OP, &key, self.backend.set_if_present(&key, bytes))
			.await?;
		if !written {
			return Err(OrderStoreError::NotFound { key });
		}
		tracing::debug!(order_id = order.order_id, key = %key, "Updated order");
		Ok(())
	}

	/// Removes an order and its index entry in one atomic batch.
	pub async fn delete_by_id(
		&self,
		order_id: u64,
		cancel: &CancellationToken,
	) -> Result<(), OrderStoreError> {
		const OP: &str = "delete_by_id";
		let key = order_key(order_id);

		let mut batch = AtomicBatch::begin(self.backend.as_ref());
		let queued = batch.queue_all([
			Mutation::Delete { key: key.clone() },
			Mutation::RemoveFromSet {
				set: order_index_key().to_string(),
				member: key.clone(),
			},
		]);
		if let Err(e) = queued {
			batch.discard();
			return Err(OrderStoreError::from_storage(OP, &key, e));
		}

		self.run(cancel, OP, &key, batch.commit()).await?;
		tracing::info!(order_id, key = %key, "Deleted order");
		Ok(())
	}

	/// Returns up to `page.size` orders starting at the cursor `page.offset`.
	///
	/// The cursor is a position in the index: 0 starts from the beginning and
	/// the returned cursor is where the next page begins. A returned cursor of
	/// 0 means there are no further pages. A page size of 0 reads nothing and
	/// hands the cursor back unchanged.
	pub async fn find_all(
		&self,
		page: FindAllPage,
		cancel: &CancellationToken,
	) -> Result<FindResult, OrderStoreError> {
		const OP: &str = "find_all";
		let index_key = order_index_key();

		if page.size == 0 {
			return Ok(FindResult {
				orders: Vec::new(),
				cursor: page.offset,
			});
		}
		let size = usize::try_from(page.size).unwrap_or(usize::MAX);

		// One entry past the page tells whether another page follows.
		let mut keys = self
			.run(
				cancel,
				OP,
				index_key,
				self.backend
					.range_set(index_key, page.offset, size.saturating_add(1)),
			)
			.await?;

		let cursor = if keys.len() > size {
			keys.truncate(size);
			page.offset.saturating_add(page.size)
		} else {
			0
		};
		if keys.is_empty() {
			return Ok(FindResult {
				orders: Vec::new(),
				cursor,
			});
		}

		let values = self
			.run(cancel, OP, index_key, self.backend.get_many(&keys))
			.await?;

		let mut orders = Vec::with_capacity(keys.len());
		for (key, value) in keys.iter().zip(values) {
			match value {
				Some(bytes) => orders.push(self.decode_at(OP, key, &bytes)?),
				// Deleted between the index read and the record read
				None => tracing::warn!(key = %key, "Indexed order has no record, skipping"),
			}
		}

		tracing::debug!(
			offset = page.offset,
			size = page.size,
			returned = orders.len(),
			cursor,
			"Listed orders"
		);
		Ok(FindResult { orders, cursor })
	}

	/// Decodes the record stored under `key` and checks that it belongs there.
	fn decode_at(
		&self,
		operation: &'static str,
		key: &str,
		bytes: &[u8],
	) -> Result<Order, OrderStoreError> {
		let order = self
			.codec
			.decode(bytes)
			.map_err(|e| OrderStoreError::from_codec(operation, key, e))?;
		if parse_order_key(key) != Some(order.order_id) {
			return Err(OrderStoreError::Corruption {
				key: key.to_string(),
				reason: format!("record holds order {}", order.order_id),
			});
		}
		Ok(order)
	}

	/// Runs one backend call, bounded by the operation timeout and the
	/// caller's cancellation token.
	async fn run<T, F>(
		&self,
		cancel: &CancellationToken,
		operation: &'static str,
		key: &str,
		call: F,
	) -> Result<T, OrderStoreError>
	where
		F: Future<Output = Result<T, StorageError>>,
	{
		tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				tracing::debug!(operation, key = %key, "Storage call cancelled");
				Err(OrderStoreError::Cancelled {
					operation,
					key: key.to_string(),
				})
			}
			outcome = tokio::time::timeout(self.operation_timeout, call) => match outcome {
				Ok(result) => result.map_err(|e| {
					let err = OrderStoreError::from_storage(operation, key, e);
					if matches!(err, OrderStoreError::Unavailable { .. }) {
						tracing::warn!(operation, key = %key, error = %err, "Storage call failed");
					}
					err
				}),
				Err(_) => {
					tracing::warn!(operation, key = %key, timeout = ?self.operation_timeout, "Storage call timed out");
					Err(OrderStoreError::Unavailable {
						operation,
						key: key.to_string(),
						reason: format!("timed out after {:?}", self.operation_timeout),
					})
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use async_trait::async_trait;
	use chrono::Utc;
	use order_types::{ConfigSchema, LineItem};
	use uuid::Uuid;

	fn order(id: u64) -> Order {
		Order::new(
			id,
			Uuid::new_v4(),
			vec![LineItem {
				item_id: Uuid::new_v4(),
				quantity: 1,
				price: 500,
			}],
			Utc::now(),
		)
	}

	fn memory_store() -> (Arc<MemoryStorage>, OrderStore) {
		let backend = Arc::new(MemoryStorage::new());
		let store = OrderStore::new(backend.clone());
		(backend, store)
	}

	async fn collect_all(store: &OrderStore, size: u64) -> Vec<Order> {
		let cancel = CancellationToken::new();
		let mut cursor = 0;
		let mut all = Vec::new();
		loop {
			let page = store
				.find_all(
					FindAllPage {
						offset: cursor,
						size,
					},
					&cancel,
				)
				.await
				.unwrap();
			assert!(page.orders.len() as u64 <= size);
			all.extend(page.orders);
			if page.cursor == 0 {
				return all;
			}
			cursor = page.cursor;
		}
	}

	#[tokio::test]
	async fn test_insert_then_find_returns_equal_order() {
		let (_, store) = memory_store();
		let cancel = CancellationToken::new();
		let mut original = order(1);
		original.shipped_at = Some(Utc::now());

		store.insert(&original, &cancel).await.unwrap();
		let found = store.find_by_id(1, &cancel).await.unwrap();
		assert_eq!(found, original);
	}

	#[tokio::test]
	async fn test_duplicate_insert_is_rejected_and_keeps_existing() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		let first = order(7);
		store.insert(&first, &cancel).await.unwrap();

		let imposter = order(7);
		let result = store.insert(&imposter, &cancel).await;
		assert!(matches!(result, Err(OrderStoreError::AlreadyExists { key }) if key == "order:7"));

		assert_eq!(store.find_by_id(7, &cancel).await.unwrap(), first);
		let members = backend.range_set("orders", 0, 10).await.unwrap();
		assert_eq!(members, vec!["order:7".to_string()]);
	}

	#[tokio::test]
	async fn test_find_missing_order() {
		let (_, store) = memory_store();
		let result = store.find_by_id(404, &CancellationToken::new()).await;
		assert!(matches!(result, Err(OrderStoreError::NotFound { key }) if key == "order:404"));
	}

	#[tokio::test]
	async fn test_update_missing_order_creates_nothing() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();

		let result = store.update(&order(3), &cancel).await;
		assert!(matches!(result, Err(OrderStoreError::NotFound { .. })));
		assert!(matches!(
			store.find_by_id(3, &cancel).await,
			Err(OrderStoreError::NotFound { .. })
		));
		assert!(backend.get_many(&["order:3".to_string()]).await.unwrap()[0].is_none());
		assert!(backend.range_set("orders", 0, 10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_update_overwrites_existing_order() {
		let (_, store) = memory_store();
		let cancel = CancellationToken::new();
		let mut o = order(4);
		store.insert(&o, &cancel).await.unwrap();

		o.shipped_at = Some(Utc::now());
		store.update(&o, &cancel).await.unwrap();
		assert_eq!(store.find_by_id(4, &cancel).await.unwrap(), o);
		assert_eq!(collect_all(&store, 10).await.len(), 1);
	}

	#[tokio::test]
	async fn test_delete_removes_record_and_index_entry() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		store.insert(&order(1), &cancel).await.unwrap();
		store.insert(&order(2), &cancel).await.unwrap();

		store.delete_by_id(1, &cancel).await.unwrap();

		assert!(matches!(
			store.find_by_id(1, &cancel).await,
			Err(OrderStoreError::NotFound { .. })
		));
		let remaining: Vec<u64> = collect_all(&store, 10)
			.await
			.into_iter()
			.map(|o| o.order_id)
			.collect();
		assert_eq!(remaining, vec![2]);
		let members = backend.range_set("orders", 0, 10).await.unwrap();
		assert_eq!(members, vec!["order:2".to_string()]);
	}

	#[tokio::test]
	async fn test_delete_missing_order_touches_nothing() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		store.insert(&order(1), &cancel).await.unwrap();

		let result = store.delete_by_id(2, &cancel).await;
		assert!(matches!(result, Err(OrderStoreError::NotFound { key }) if key == "order:2"));
		let members = backend.range_set("orders", 0, 10).await.unwrap();
		assert_eq!(members, vec!["order:1".to_string()]);
		assert!(store.find_by_id(1, &cancel).await.is_ok());
	}

	fn ids(orders: &[Order]) -> Vec<u64> {
		orders.iter().map(|o| o.order_id).collect()
	}

	#[tokio::test]
	async fn test_find_all_pages_with_cursor() {
		let (_, store) = memory_store();
		let cancel = CancellationToken::new();
		for id in [3, 1, 2] {
			store.insert(&order(id), &cancel).await.unwrap();
		}

		let first = store
			.find_all(FindAllPage { offset: 0, size: 2 }, &cancel)
			.await
			.unwrap();
		assert_eq!(ids(&first.orders), vec![1, 2]);
		assert_eq!(first.cursor, 2);

		let second = store
			.find_all(
				FindAllPage {
					offset: first.cursor,
					size: 2,
				},
				&cancel,
			)
			.await
			.unwrap();
		assert_eq!(ids(&second.orders), vec![3]);
		assert_eq!(second.cursor, 0);
	}

	#[tokio::test]
	async fn test_find_all_exact_multiple_ends_with_zero_cursor() {
		let (_, store) = memory_store();
		let cancel = CancellationToken::new();
		for id in 1..=4 {
			store.insert(&order(id), &cancel).await.unwrap();
		}

		let first = store
			.find_all(FindAllPage { offset: 0, size: 2 }, &cancel)
			.await
			.unwrap();
		assert_eq!(first.cursor, 2);
		let second = store
			.find_all(FindAllPage { offset: 2, size: 2 }, &cancel)
			.await
			.unwrap();
		assert_eq!(ids(&second.orders), vec![3, 4]);
		assert_eq!(second.cursor, 0);

		let past_end = store
			.find_all(FindAllPage { offset: 10, size: 2 }, &cancel)
			.await
			.unwrap();
		assert!(past_end.orders.is_empty());
		assert_eq!(past_end.cursor, 0);
	}

	/// Memory backend whose range reads ignore `count`, the way a hint-based
	/// scan may hand back more members than asked for.
	struct GreedyRangeStorage {
		inner: MemoryStorage,
	}

	#[async_trait]
	impl StorageInterface for GreedyRangeStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
			self.inner.get_many(keys).await
		}

		async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
			self.inner.set_if_absent(key, value).await
		}

		async fn set_if_present(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
			self.inner.set_if_present(key, value).await
		}

		async fn delete(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.delete(key).await
		}

		async fn range_set(
			&self,
			set_key: &str,
			start: u64,
			_count: usize,
		) -> Result<Vec<String>, StorageError> {
			self.inner.range_set(set_key, start, usize::MAX).await
		}

		async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StorageError> {
			self.inner.commit(mutations).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	#[tokio::test]
	async fn test_find_all_bounds_page_when_backend_overshoots() {
		let store = OrderStore::new(Arc::new(GreedyRangeStorage {
			inner: MemoryStorage::new(),
		}));
		let cancel = CancellationToken::new();
		for id in [1, 2, 3] {
			store.insert(&order(id), &cancel).await.unwrap();
		}

		let first = store
			.find_all(FindAllPage { offset: 0, size: 2 }, &cancel)
			.await
			.unwrap();
		assert_eq!(ids(&first.orders), vec![1, 2]);
		assert_ne!(first.cursor, 0);

		let second = store
			.find_all(
				FindAllPage {
					offset: first.cursor,
					size: 2,
				},
				&cancel,
			)
			.await
			.unwrap();
		assert_eq!(ids(&second.orders), vec![3]);
		assert_eq!(second.cursor, 0);

		let all = collect_all(&store, 1).await;
		assert_eq!(ids(&all), vec![1, 2, 3]);
	}

	#[tokio::test]
	async fn test_find_all_enumerates_everything_without_duplicates() {
		let (_, store) = memory_store();
		let cancel = CancellationToken::new();
		for id in 100..137 {
			store.insert(&order(id), &cancel).await.unwrap();
		}

		let all = collect_all(&store, 5).await;
		assert_eq!(ids(&all), (100..137).collect::<Vec<u64>>());
	}

	#[tokio::test]
	async fn test_find_all_on_empty_store() {
		let (_, store) = memory_store();
		let result = store
			.find_all(FindAllPage { offset: 0, size: 50 }, &CancellationToken::new())
			.await
			.unwrap();
		assert!(result.orders.is_empty());
		assert_eq!(result.cursor, 0);
	}

	#[tokio::test]
	async fn test_find_all_zero_size_keeps_cursor() {
		let (_, store) = memory_store();
		let result = store
			.find_all(FindAllPage { offset: 9, size: 0 }, &CancellationToken::new())
			.await
			.unwrap();
		assert!(result.orders.is_empty());
		assert_eq!(result.cursor, 9);
	}

	#[tokio::test]
	async fn test_find_all_skips_index_entries_without_record() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		store.insert(&order(1), &cancel).await.unwrap();
		backend
			.commit(vec![Mutation::AddToSet {
				set: "orders".into(),
				member: "order:2".into(),
			}])
			.await
			.unwrap();

		let all = collect_all(&store, 10).await;
		assert_eq!(all.len(), 1);
		assert_eq!(all[0].order_id, 1);
	}

	#[tokio::test]
	async fn test_record_under_foreign_key_is_corruption() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		let misplaced = OrderCodec.encode(&order(8)).unwrap();
		backend
			.commit(vec![
				Mutation::SetIfAbsent {
					key: "order:5".into(),
					value: misplaced,
				},
				Mutation::AddToSet {
					set: "orders".into(),
					member: "order:5".into(),
				},
			])
			.await
			.unwrap();

		assert!(matches!(
			store.find_by_id(5, &cancel).await,
			Err(OrderStoreError::Corruption { key, .. }) if key == "order:5"
		));
		assert!(matches!(
			store.find_all(FindAllPage { offset: 0, size: 10 }, &cancel).await,
			Err(OrderStoreError::Corruption { key, .. }) if key == "order:5"
		));
	}

	#[tokio::test]
	async fn test_corrupt_record_is_reported() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		backend
			.commit(vec![
				Mutation::SetIfAbsent {
					key: "order:9".into(),
					value: b"{not json".to_vec(),
				},
				Mutation::AddToSet {
					set: "orders".into(),
					member: "order:9".into(),
				},
			])
			.await
			.unwrap();

		assert!(matches!(
			store.find_by_id(9, &cancel).await,
			Err(OrderStoreError::Corruption { key, .. }) if key == "order:9"
		));
		assert!(matches!(
			store.find_all(FindAllPage { offset: 0, size: 10 }, &cancel).await,
			Err(OrderStoreError::Corruption { .. })
		));
	}

	/// Backend whose calls either fail immediately or never complete.
	struct BrokenStorage {
		hang: bool,
	}

	impl BrokenStorage {
		async fn fail<T>(&self) -> Result<T, StorageError> {
			if self.hang {
				std::future::pending::<()>().await;
			}
			Err(StorageError::Backend("connection refused".into()))
		}
	}

	#[async_trait]
	impl StorageInterface for BrokenStorage {
		async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
			self.fail().await
		}

		async fn get_many(&self, _keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
			self.fail().await
		}

		async fn set_if_absent(&self, _key: &str, _value: Vec<u8>) -> Result<bool, StorageError> {
			self.fail().await
		}

		async fn set_if_present(&self, _key: &str, _value: Vec<u8>) -> Result<bool, StorageError> {
			self.fail().await
		}

		async fn delete(&self, _key: &str) -> Result<bool, StorageError> {
			self.fail().await
		}

		async fn range_set(
			&self,
			_set_key: &str,
			_start: u64,
			_count: usize,
		) -> Result<Vec<String>, StorageError> {
			self.fail().await
		}

		async fn commit(&self, _mutations: Vec<Mutation>) -> Result<(), StorageError> {
			self.fail().await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(crate::implementations::memory::MemoryStorageSchema)
		}
	}

	#[tokio::test]
	async fn test_backend_failure_is_unavailable() {
		let store = OrderStore::new(Arc::new(BrokenStorage { hang: false }));
		let cancel = CancellationToken::new();

		let result = store.insert(&order(1), &cancel).await;
		assert!(matches!(
			result,
			Err(OrderStoreError::Unavailable { operation: "insert", ref key, .. }) if key == "order:1"
		));
		assert!(matches!(
			store.find_all(FindAllPage { offset: 0, size: 1 }, &cancel).await,
			Err(OrderStoreError::Unavailable { operation: "find_all", .. })
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_hung_backend_times_out() {
		let store = OrderStore::new(Arc::new(BrokenStorage { hang: true }))
			.with_operation_timeout(Duration::from_millis(200));

		let result = store.find_by_id(1, &CancellationToken::new()).await;
		match result {
			Err(OrderStoreError::Unavailable { reason, .. }) => assert!(reason.contains("timed out")),
			other => panic!("expected timeout, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_cancellation_aborts_pending_call() {
		let store = OrderStore::new(Arc::new(BrokenStorage { hang: true }))
			.with_operation_timeout(Duration::from_secs(3600));
		let cancel = CancellationToken::new();

		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			trigger.cancel();
		});

		let result = store.delete_by_id(5, &cancel).await;
		assert!(matches!(
			result,
			Err(OrderStoreError::Cancelled { operation: "delete_by_id", .. })
		));
	}

	#[tokio::test]
	async fn test_already_cancelled_token_skips_backend() {
		let (backend, store) = memory_store();
		let cancel = CancellationToken::new();
		cancel.cancel();

		let result = store.insert(&order(1), &cancel).await;
		assert!(matches!(result, Err(OrderStoreError::Cancelled { .. })));
		assert!(backend.get_many(&["order:1".to_string()]).await.unwrap()[0].is_none());
	}
}
