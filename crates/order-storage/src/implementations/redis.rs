//! Redis storage backend implementation.
//!
//! Orders live under plain string keys and the order index is a Redis sorted
//! set whose members all carry score 0, so `ZRANGE` returns them in byte-wise
//! order and a page position is exact.
//! Batches are committed through a Lua script so that precondition checks
//! and writes execute as one server-side step: a failed check leaves the
//! database untouched, which `MULTI`/`EXEC` alone cannot guarantee.

use crate::{Mutation, StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use order_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tokio::sync::OnceCell;

/// Checks every precondition, then applies every mutation.
///
/// KEYS[i] is the key of mutation i; ARGV[2i-1] its operation and ARGV[2i]
/// its argument (value or set member).
const COMMIT_SCRIPT: &str = r#"
for i, key in ipairs(KEYS) do
	local op = ARGV[2 * i - 1]
	local present = redis.call('EXISTS', key) == 1
	if op == 'set_nx' and present then
		return {'exists', key}
	end
	if (op == 'set_xx' or op == 'del') and not present then
		return {'missing', key}
	end
end
for i, key in ipairs(KEYS) do
	local op = ARGV[2 * i - 1]
	local arg = ARGV[2 * i]
	if op == 'set_nx' or op == 'set_xx' then
		redis.call('SET', key, arg)
	elseif op == 'del' then
		redis.call('DEL', key)
	elseif op == 'zadd' then
		redis.call('ZADD', key, 0, arg)
	elseif op == 'zrem' then
		redis.call('ZREM', key, arg)
	end
end
return {'ok'}
"#;

/// Maps a mutation onto the (key, operation, argument) triple the commit script expects.
fn script_operation(mutation: &Mutation) -> (&str, &'static str, &[u8]) {
	match mutation {
		Mutation::SetIfAbsent { key, value } => (key.as_str(), "set_nx", value.as_slice()),
		Mutation::SetIfPresent { key, value } => (key.as_str(), "set_xx", value.as_slice()),
		Mutation::Delete { key } => (key.as_str(), "del", &b""[..]),
		Mutation::AddToSet { set, member } => (set.as_str(), "zadd", member.as_bytes()),
		Mutation::RemoveFromSet { set, member } => (set.as_str(), "zrem", member.as_bytes()),
	}
}

/// Interprets the commit script's reply.
fn commit_outcome(reply: &[String]) -> Result<(), StorageError> {
	match reply {
		[status] if status == "ok" => Ok(()),
		[status, key] if status == "exists" => Err(StorageError::AlreadyExists(key.clone())),
		[status, key] if status == "missing" => Err(StorageError::NotFound(key.clone())),
		other => Err(StorageError::Backend(format!(
			"unexpected commit reply: {:?}",
			other
		))),
	}
}

/// Inclusive `ZRANGE` bounds for `count` members from `start`, or `None`
/// when the range is empty or lies beyond any representable index.
fn zrange_bounds(start: u64, count: usize) -> Option<(i64, i64)> {
	let start = i64::try_from(start).ok()?;
	let count = i64::try_from(count).ok().filter(|c| *c > 0)?;
	Some((start, start.saturating_add(count - 1)))
}

fn backend_error(context: &str, err: redis::RedisError) -> StorageError {
	StorageError::Backend(format!("{}: {}", context, err))
}

/// Redis-backed storage.
///
/// The connection manager is created on first use and then shared by all
/// callers; it reconnects transparently after connection loss.
pub struct RedisStorage {
	client: Client,
	connection: OnceCell<ConnectionManager>,
	commit_script: Script,
}

impl RedisStorage {
	/// Creates a storage handle for the given `redis://` URL.
	///
	/// No connection is opened until the first operation.
	pub fn new(redis_url: &str) -> Result<Self, StorageError> {
		let client = Client::open(redis_url)
			.map_err(|e| StorageError::Configuration(format!("invalid redis url: {}", e)))?;
		Ok(Self {
			client,
			connection: OnceCell::new(),
			commit_script: Script::new(COMMIT_SCRIPT),
		})
	}

	async fn conn(&self) -> Result<ConnectionManager, StorageError> {
		let manager = self
			.connection
			.get_or_try_init(|| async {
				let manager = ConnectionManager::new(self.client.clone())
					.await
					.map_err(|e| backend_error("failed to connect to redis", e))?;
				tracing::info!("Connected to redis");
				Ok::<_, StorageError>(manager)
			})
			.await?;
		Ok(manager.clone())
	}
}

#[async_trait]
impl StorageInterface for RedisStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let mut conn = self.conn().await?;
		let value: Option<Vec<u8>> = conn
			.get(key)
			.await
			.map_err(|e| backend_error("GET failed", e))?;
		value.ok_or_else(|| StorageError::NotFound(key.to_string()))
	}

	async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StorageError> {
		if keys.is_empty() {
			return Ok(Vec::new());
		}
		let mut conn = self.conn().await?;
		let mut cmd = redis::cmd("MGET");
		for key in keys {
			cmd.arg(key);
		}
		let values: Vec<Option<Vec<u8>>> = cmd
			.query_async(&mut conn)
			.await
			.map_err(|e| backend_error("MGET failed", e))?;
		Ok(values)
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut conn = self.conn().await?;
		let reply: Option<String> = redis::cmd("SET")
			.arg(key)
			.arg(value)
			.arg("NX")
			.query_async(&mut conn)
			.await
			.map_err(|e| backend_error("SET NX failed", e))?;
		Ok(reply.is_some())
	}

	async fn set_if_present(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let mut conn = self.conn().await?;
		let reply: Option<String> = redis::cmd("SET")
			.arg(key)
			.arg(value)
			.arg("XX")
			.query_async(&mut conn)
			.await
			.map_err(|e| backend_error("SET XX failed", e))?;
		Ok(reply.is_some())
	}

	async fn delete(&self, key: &str) -> Result<bool, StorageError> {
		let mut conn = self.conn().await?;
		let removed: i64 = conn
			.del(key)
			.await
			.map_err(|e| backend_error("DEL failed", e))?;
		Ok(removed > 0)
	}

	async fn range_set(
		&self,
		set_key: &str,
		start: u64,
		count: usize,
	) -> Result<Vec<String>, StorageError> {
		let Some((start, stop)) = zrange_bounds(start, count) else {
			return Ok(Vec::new());
		};
		let mut conn = self.conn().await?;
		let members: Vec<String> = redis::cmd("ZRANGE")
			.arg(set_key)
			.arg(start)
			.arg(stop)
			.query_async(&mut conn)
			.await
			.map_err(|e| backend_error("ZRANGE failed", e))?;
		Ok(members)
	}

	async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StorageError> {
		if mutations.is_empty() {
			return Ok(());
		}
		let mut conn = self.conn().await?;

		let mut invocation = self.commit_script.prepare_invoke();
		for mutation in &mutations {
			let (key, op, arg) = script_operation(mutation);
			invocation.key(key).arg(op).arg(arg);
		}

		let reply: Vec<String> = invocation
			.invoke_async(&mut conn)
			.await
			.map_err(|e| backend_error("batch commit failed", e))?;
		commit_outcome(&reply)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RedisStorageSchema)
	}
}

/// Configuration schema for RedisStorage.
pub struct RedisStorageSchema;

impl ConfigSchema for RedisStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
						Ok(())
					},
					_ => Err("url must start with redis:// or rediss://".into()),
				}
			})],
			vec![],
		);
		schema.validate(config)
	}
}

/// Factory function to create a redis storage backend from configuration.
///
/// Configuration parameters:
/// - `url`: connection URL, e.g. `redis://localhost:6379`
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	RedisStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("url is required".into()))?;

	Ok(Box::new(RedisStorage::new(url)?))
}

/// Registry for the redis storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "redis";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_script_operations() {
		let set_nx = Mutation::SetIfAbsent {
			key: "order:1".into(),
			value: b"{}".to_vec(),
		};
		assert_eq!(script_operation(&set_nx), ("order:1", "set_nx", &b"{}"[..]));

		let zadd = Mutation::AddToSet {
			set: "orders".into(),
			member: "order:1".into(),
		};
		assert_eq!(script_operation(&zadd), ("orders", "zadd", &b"order:1"[..]));

		let zrem = Mutation::RemoveFromSet {
			set: "orders".into(),
			member: "order:1".into(),
		};
		assert_eq!(script_operation(&zrem), ("orders", "zrem", &b"order:1"[..]));

		let del = Mutation::Delete {
			key: "order:1".into(),
		};
		assert_eq!(script_operation(&del), ("order:1", "del", &b""[..]));
	}

	#[test]
	fn test_zrange_bounds() {
		assert_eq!(zrange_bounds(0, 50), Some((0, 49)));
		assert_eq!(zrange_bounds(100, 1), Some((100, 100)));
		assert_eq!(zrange_bounds(7, 0), None);
		assert_eq!(zrange_bounds(u64::MAX, 10), None);
		assert_eq!(zrange_bounds(i64::MAX as u64, 10), Some((i64::MAX, i64::MAX)));
	}

	#[test]
	fn test_commit_outcome() {
		assert!(commit_outcome(&["ok".to_string()]).is_ok());
		assert!(matches!(
			commit_outcome(&["exists".to_string(), "order:1".to_string()]),
			Err(StorageError::AlreadyExists(k)) if k == "order:1"
		));
		assert!(matches!(
			commit_outcome(&["missing".to_string(), "order:2".to_string()]),
			Err(StorageError::NotFound(k)) if k == "order:2"
		));
		assert!(matches!(
			commit_outcome(&[]),
			Err(StorageError::Backend(_))
		));
	}

	#[test]
	fn test_config_requires_redis_url() {
		let missing = toml::Value::Table(toml::map::Map::new());
		assert!(matches!(
			create_storage(&missing),
			Err(StorageError::Configuration(_))
		));

		let wrong_scheme: toml::Value = toml::from_str(r#"url = "http://localhost""#).unwrap();
		assert!(matches!(
			create_storage(&wrong_scheme),
			Err(StorageError::Configuration(_))
		));

		let valid: toml::Value = toml::from_str(r#"url = "redis://127.0.0.1:6379""#).unwrap();
		assert!(create_storage(&valid).is_ok());
	}
}
