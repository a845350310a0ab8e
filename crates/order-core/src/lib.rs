//! Core engine for the order service.
//!
//! The engine owns the order store and the lifecycle state machine and
//! exposes the operations the HTTP layer calls. Every operation takes the
//! caller's cancellation token, which is forwarded to each storage round trip.

use chrono::Utc;
use order_config::Config;
use order_storage::{OrderStore, OrderStoreError};
use order_types::{FindAllPage, FindResult, LineItem, Order, StatusTransition};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod builder;
pub mod state;

pub use builder::{BuilderError, OrderEngineBuilder};
pub use state::{OrderStateError, OrderStateMachine};

/// Number of fresh ids tried before giving up on an id collision.
const MAX_ID_ATTEMPTS: usize = 3;

/// Returns a random order id.
fn generate_order_id() -> u64 {
	Uuid::new_v4().as_u64_pair().0
}

/// Main engine that serves order operations.
pub struct OrderEngine {
	/// Service configuration.
	config: Config,
	/// Persistent order store.
	store: Arc<OrderStore>,
	/// Ship / complete transitions.
	state: OrderStateMachine,
}

impl OrderEngine {
	pub fn new(config: Config, store: Arc<OrderStore>) -> Self {
		let state = OrderStateMachine::new(store.clone());
		Self {
			config,
			store,
			state,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &Arc<OrderStore> {
		&self.store
	}

	/// Creates and persists a new order stamped with the current time.
	///
	/// A freshly generated id that is already taken is replaced by another
	/// one; any other store failure is returned as is.
	pub async fn create_order(
		&self,
		customer_id: Uuid,
		line_items: Vec<LineItem>,
		cancel: &CancellationToken,
	) -> Result<Order, OrderStoreError> {
		let mut attempt = 1;
		loop {
			let order = Order::new(
				generate_order_id(),
				customer_id,
				line_items.clone(),
				Utc::now(),
			);
			match self.store.insert(&order, cancel).await {
				Ok(()) => return Ok(order),
				Err(OrderStoreError::AlreadyExists { key }) if attempt < MAX_ID_ATTEMPTS => {
					tracing::warn!(key = %key, attempt, "Generated order id already in use");
					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		}
	}

	pub async fn get_order(
		&self,
		order_id: u64,
		cancel: &CancellationToken,
	) -> Result<Order, OrderStoreError> {
		self.store.find_by_id(order_id, cancel).await
	}

	/// Lists one page of orders using the configured page size.
	///
	/// `cursor` is 0 for the first page, then the cursor of the previous result.
	pub async fn list_orders(
		&self,
		cursor: u64,
		cancel: &CancellationToken,
	) -> Result<FindResult, OrderStoreError> {
		let page = FindAllPage {
			offset: cursor,
			size: self.config.api.page_size,
		};
		self.store.find_all(page, cancel).await
	}

	/// Applies a status transition at the current time.
	pub async fn transition_order(
		&self,
		order_id: u64,
		transition: StatusTransition,
		cancel: &CancellationToken,
	) -> Result<Order, OrderStateError> {
		self.state
			.transition(order_id, transition, Utc::now(), cancel)
			.await
	}

	pub async fn delete_order(
		&self,
		order_id: u64,
		cancel: &CancellationToken,
	) -> Result<(), OrderStoreError> {
		self.store.delete_by_id(order_id, cancel).await
	}
}
