//! Main entry point for the order service.
//!
//! Loads the configuration, builds the order engine on the configured storage
//! backend and serves the HTTP API until interrupted.

use clap::Parser;
use order_config::Config;
use order_core::{OrderEngine, OrderEngineBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod apis;
mod server;

use order_storage::implementations::memory::create_storage as create_memory_storage;
use order_storage::implementations::redis::create_storage as create_redis_storage;

/// Command-line arguments for the order service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	let config = Config::from_file(&args.config).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config)?);

	let shutdown = CancellationToken::new();
	let signal = shutdown.clone();
	tokio::spawn(async move {
		match tokio::signal::ctrl_c().await {
			Ok(()) => tracing::info!("Shutdown requested"),
			Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
		}
		signal.cancel();
	});

	server::start_server(engine, shutdown).await?;

	tracing::info!("Stopped order service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the order engine with every available storage backend registered.
fn build_engine(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		order_storage::StorageInterface,
		order_storage::StorageError,
		"memory" => create_memory_storage,
		"redis" => create_redis_storage,
	);

	Ok(OrderEngineBuilder::new(config).build(storage_factories)?)
}
