//! In-memory storage backend implementation.
//!
//! This module provides a memory-based implementation of the StorageInterface trait,
//! useful for testing and development scenarios where persistence is not required.

use crate::{Mutation, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
	values: HashMap<String, Vec<u8>>,
	sets: HashMap<String, BTreeSet<String>>,
}

impl MemoryState {
	fn check(&self, mutation: &Mutation) -> Result<(), StorageError> {
		match mutation {
			Mutation::SetIfAbsent { key, .. } if self.values.contains_key(key) => {
				Err(StorageError::AlreadyExists(key.clone()))
			},
			Mutation::SetIfPresent { key, .. } | Mutation::Delete { key }
				if !self.values.contains_key(key) =>
			{
				Err(StorageError::NotFound(key.clone()))
			},
			_ => Ok(()),
		}
	}

	fn apply(&mut self, mutation: Mutation) {
		match mutation {
			Mutation::SetIfAbsent { key, value } | Mutation::SetIfPresent { key, value } => {
				self.values.insert(key, value);
			},
			Mutation::Delete { key } => {
				self.values.remove(&key);
			},
			Mutation::AddToSet { set, member } => {
				self.sets.entry(set).or_default().insert(member);
			},
			Mutation::RemoveFromSet { set, member } => {
				if let Some(members) = self.sets.get_mut(&set) {
					members.remove(&member);
					if members.is_empty() {
						self.sets.remove(&set);
					}
				}
			},
		}
	}
}

/// In-memory storage implementation.
///
/// Values and sets live behind a single read-write lock, which makes every
/// batch commit atomic. Sets are kept sorted, matching the member order of a
/// Redis sorted set whose scores are all equal.
pub struct MemoryStorage {
	state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(MemoryState::default())),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let state = self.state.read().await;
		state
			.values
			.get(key)
			.cloned()
			.ok_or_else(|| StorageError::NotFound(key.to_string()))
	}

	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
		let state = self.state.read().await;
		Ok(keys.iter().map(|k| state.values.get(k).cloned()).collect())
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut state = self.state.write().await;
		if state.values.contains_key(key) {
			return Ok(false);
		}
		state.values.insert(key.to_string(), value);
		Ok(true)
	}

	async fn set_if_present(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut state = self.state.write().await;
		match state.values.get_mut(key) {
			Some(existing) => {
				*existing = value;
				Ok(true)
			},
			None => Ok(false),
		}
	}

	async fn delete(&self, key: &str) -> Result<bool, StorageError> {
		let mut state = self.state.write().await;
		Ok(state.values.remove(key).is_some())
	}

	async fn range_set(
		&self,
		set_key: &str,
		start: u64,
		count: usize,
	) -> Result<Vec<String>, StorageError> {
		let state = self.state.read().await;
		let Some(members) = state.sets.get(set_key) else {
			return Ok(Vec::new());
		};
		let start = usize::try_from(start).unwrap_or(usize::MAX);
		Ok(members.iter().skip(start).take(count).cloned().collect())
	}

	async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StorageError> {
		let mut state = self.state.write().await;
		for mutation in &mutations {
			state.check(mutation)?;
		}
		for mutation in mutations {
			state.apply(mutation);
		}
		Ok(())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Memory storage has no configuration
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
