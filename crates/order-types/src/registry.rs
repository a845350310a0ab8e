//! Registry trait for self-registering implementations.

/// Declares the configuration name and factory of a pluggable implementation.
///
/// Every storage backend module exposes a `Registry` struct implementing this
/// trait, so the service can discover backends by the name used under
/// `[storage.implementations.<name>]`.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory that builds this implementation from its config table.
	fn factory() -> Self::Factory;
}
