//! Atomic batch writer.
//!
//! Groups dependent key-level mutations and hands them to the backend as a
//! single all-or-nothing unit. The order store uses it for every operation
//! that touches both an order record and the order index.

use crate::{StorageError, StorageInterface};

/// Upper bound on the number of mutations a single batch accepts.
pub const MAX_BATCH_MUTATIONS: usize = 64;

/// A single key-level mutation queued on an [`AtomicBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
	/// Write `value` under `key`; fails the batch if the key exists.
	SetIfAbsent { key: String, value: Vec<u8> },
	/// Overwrite `key` with `value`; fails the batch if the key is absent.
	SetIfPresent { key: String, value: Vec<u8> },
	/// Remove `key`; fails the batch if the key is absent.
	Delete { key: String },
	/// Add `member` to the set stored at `set`.
	AddToSet { set: String, member: String },
	/// Remove `member` from the set stored at `set`.
	RemoveFromSet { set: String, member: String },
}

impl Mutation {
	/// The key this mutation operates on.
	pub fn key(&self) -> &str {
		match self {
			Mutation::SetIfAbsent { key, .. }
			| Mutation::SetIfPresent { key, .. }
			| Mutation::Delete { key } => key,
			Mutation::AddToSet { set, .. } | Mutation::RemoveFromSet { set, .. } => set,
		}
	}

	fn validate(&self) -> Result<(), StorageError> {
		if self.key().is_empty() {
			return Err(StorageError::InvalidMutation("empty key".into()));
		}
		match self {
			Mutation::AddToSet { member, set } | Mutation::RemoveFromSet { member, set }
				if member.is_empty() =>
			{
				Err(StorageError::InvalidMutation(format!(
					"empty member for set {}",
					set
				)))
			},
			_ => Ok(()),
		}
	}
}

/// A batch of mutations that is committed as one unit.
///
/// Lifecycle: [`AtomicBatch::begin`], one or more [`AtomicBatch::queue`]
/// calls, then either [`AtomicBatch::commit`] or [`AtomicBatch::discard`].
/// Nothing reaches the backend before commit.
pub struct AtomicBatch<'a> {
	backend: &'a dyn StorageInterface,
	mutations: Vec<Mutation>,
}

impl<'a> AtomicBatch<'a> {
	/// Starts an empty batch against the given backend.
	pub fn begin(backend: &'a dyn StorageInterface) -> Self {
		Self {
			backend,
			mutations: Vec::new(),
		}
	}

	/// Queues a mutation.
	///
	/// On error the batch is left unchanged; callers are expected to
	/// [`discard`](Self::discard) it before propagating the error.
	pub fn queue(&mut self, mutation: Mutation) -> Result<&mut Self, StorageError> {
		mutation.validate()?;
		if self.mutations.len() >= MAX_BATCH_MUTATIONS {
			return Err(StorageError::InvalidMutation(format!(
				"batch exceeds {} mutations",
				MAX_BATCH_MUTATIONS
			)));
		}
		self.mutations.push(mutation);
		Ok(self)
	}

	/// Queues several mutations, stopping at the first one rejected.
	pub fn queue_all(
		&mut self,
		mutations: impl IntoIterator<Item = Mutation>,
	) -> Result<(), StorageError> {
		for mutation in mutations {
			self.queue(mutation)?;
		}
		Ok(())
	}

	/// Number of queued mutations.
	pub fn len(&self) -> usize {
		self.mutations.len()
	}

	/// Returns true if nothing has been queued.
	pub fn is_empty(&self) -> bool {
		self.mutations.is_empty()
	}

	/// Abandons the batch without touching the backend.
	pub fn discard(self) {
		tracing::debug!(mutations = self.mutations.len(), "Discarded storage batch");
	}

	/// Applies every queued mutation atomically.
	///
	/// Backend failures are returned unchanged so the caller can classify
	/// them; an empty batch commits trivially.
	pub async fn commit(self) -> Result<(), StorageError> {
		if self.mutations.is_empty() {
			return Ok(());
		}
		let count = self.mutations.len();
		self.backend.commit(self.mutations).await?;
		tracing::trace!(mutations = count, "Committed storage batch");
		Ok(())
	}
}
