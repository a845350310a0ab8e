//! Order state machine implementation.
//!
//! An order moves Created -> Shipped -> Completed. The status is never stored;
//! it is derived from `shipped_at` and `completed_at`, so a transition is a
//! read of the current record, a check against those timestamps and a
//! conditional overwrite.

use chrono::{DateTime, Utc};
use order_storage::{OrderStore, OrderStoreError};
use order_types::{Order, OrderStatus, StatusTransition};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error(transparent)]
	Store(#[from] OrderStoreError),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Manages order state transitions and persistence
pub struct OrderStateMachine {
	store: Arc<OrderStore>,
}

impl OrderStateMachine {
	pub fn new(store: Arc<OrderStore>) -> Self {
		Self { store }
	}

	/// Applies `transition` to the stored order, stamping it with `now`.
	///
	/// A rejected transition performs no write. Concurrent transitions on the
	/// same order are last-writer-wins.
	pub async fn transition(
		&self,
		order_id: u64,
		transition: StatusTransition,
		now: DateTime<Utc>,
		cancel: &CancellationToken,
	) -> Result<Order, OrderStateError> {
		let mut order = self.store.find_by_id(order_id, cancel).await?;
		let from = order.status();

		Self::apply(&mut order, transition, now)?;
		self.store.update(&order, cancel).await?;

		tracing::info!(
			order_id,
			from = %from,
			to = %order.status(),
			"Order status changed"
		);
		Ok(order)
	}

	/// Checks the transition rules and sets the matching timestamp.
	fn apply(
		order: &mut Order,
		transition: StatusTransition,
		now: DateTime<Utc>,
	) -> Result<(), OrderStateError> {
		match transition {
			StatusTransition::Ship if order.shipped_at.is_none() => {
				order.shipped_at = Some(now);
				Ok(())
			},
			StatusTransition::Complete
				if order.shipped_at.is_some() && order.completed_at.is_none() =>
			{
				order.completed_at = Some(now);
				Ok(())
			},
			_ => Err(OrderStateError::InvalidTransition {
				from: order.status(),
				to: transition.target(),
			}),
		}
	}
}
