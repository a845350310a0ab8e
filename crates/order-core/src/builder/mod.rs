//! Builder for constructing order engines.
//!
//! Selects the configured storage implementation from a set of factory
//! functions and wires it into an order store and state machine.

use crate::OrderEngine;
use order_config::Config;
use order_storage::{OrderStore, StorageError, StorageInterface};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Builder for constructing an OrderEngine with a pluggable storage backend.
pub struct OrderEngineBuilder {
	config: Config,
}

impl OrderEngineBuilder {
	/// Creates a new builder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine, creating the primary storage implementation with
	/// the matching factory.
	///
	/// Only the primary implementation is instantiated.
	pub fn build<SF>(
		self,
		storage_factories: HashMap<String, SF>,
	) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let primary = self.config.storage.primary.as_str();

		for name in self.config.storage.implementations.keys() {
			if !storage_factories.contains_key(name) {
				tracing::warn!(
					component = "storage",
					implementation = %name,
					"No factory registered, ignoring"
				);
			}
		}

		let factory = storage_factories.get(primary).ok_or_else(|| {
			BuilderError::MissingComponent(format!("storage implementation '{}'", primary))
		})?;
		let implementation_config =
			self.config
				.storage
				.implementations
				.get(primary)
				.ok_or_else(|| {
					BuilderError::Config(format!(
						"Primary storage '{}' has no configuration",
						primary
					))
				})?;

		let backend: Arc<dyn StorageInterface> = match factory(implementation_config) {
			Ok(implementation) => {
				tracing::info!(component = "storage", implementation = %primary, enabled = true, "Loaded");
				implementation.into()
			},
			Err(e) => {
				tracing::error!(
					component = "storage",
					implementation = %primary,
					error = %e,
					"Failed to create storage implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create storage implementation '{}': {}",
					primary, e
				)));
			},
		};

		let store = OrderStore::new(backend)
			.with_operation_timeout(self.config.storage.operation_timeout());

		tracing::info!(
			service_id = %self.config.service.id,
			operation_timeout_ms = self.config.storage.operation_timeout_ms,
			"Order engine ready"
		);
		Ok(OrderEngine::new(self.config, Arc::new(store)))
	}
}
