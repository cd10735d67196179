use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use super::{IndexDocument, IndexFields, IndexMirror, MirrorError};
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const KEY_PREFIX: &str = "catalog_index:";

// Version-guarded partial HSET. ARGV[1] is the incoming version, the rest are
// field/value pairs. Returns 0 when the stored document is newer.
const UPSERT_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'version') or '-1')
local incoming = tonumber(ARGV[1])
if current > incoming then
  return 0
end
redis.call('HSET', KEYS[1], 'version', ARGV[1])
for i = 2, #ARGV, 2 do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
return 1
"#;

/// Index mirror stored as one Redis hash per catalog entry
pub struct RedisIndexMirror {
    connection: MultiplexedConnection,
    upsert: Script,
    circuit_breaker: CircuitBreaker,
}

impl RedisIndexMirror {
    pub async fn connect(url: &str) -> Result<Self, MirrorError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = client.get_multiplexed_async_connection().await.map_err(backend)?;

        tracing::info!(url = %url, "Connected to Redis index mirror");

        Ok(Self {
            connection,
            upsert: Script::new(UPSERT_SCRIPT),
            circuit_breaker: CircuitBreaker::new("index_mirror", CircuitBreakerConfig::default()),
        })
    }

    fn key(catalog_id: Uuid) -> String {
        format!("{}{}", KEY_PREFIX, catalog_id)
    }

    fn unwrap_breaker<T>(result: Result<T, CircuitBreakerError<redis::RedisError>>) -> Result<T, MirrorError> {
        match result {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen) => Err(MirrorError::Unavailable),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(backend(e)),
        }
    }
}

fn backend(err: redis::RedisError) -> MirrorError {
    MirrorError::Backend(err.to_string())
}

#[async_trait]
impl IndexMirror for RedisIndexMirror {
    async fn upsert_partial(&self, catalog_id: Uuid, fields: IndexFields, version: i64) -> Result<(), MirrorError> {
        let key = Self::key(catalog_id);
        let mut invocation = self.upsert.key(&key);
        invocation.arg(version);
        if let Some(stock) = fields.stock {
            invocation.arg("stock").arg(stock);
        }
        if let Some(rating) = fields.rating {
            invocation.arg("rating").arg(rating);
        }

        let mut connection = self.connection.clone();
        let result = self
            .circuit_breaker
            .call(async {
                let applied: i64 = invocation.invoke_async(&mut connection).await?;
                Ok::<_, redis::RedisError>(applied)
            })
            .await;

        let applied = Self::unwrap_breaker(result)?;
        if applied == 0 {
            tracing::debug!(catalog_id = %catalog_id, version = version, "Redis mirror holds a newer version");
        }
        Ok(())
    }

    async fn get(&self, catalog_id: Uuid) -> Result<Option<IndexDocument>, MirrorError> {
        let key = Self::key(catalog_id);
        let mut connection = self.connection.clone();

        let result = self
            .circuit_breaker
            .call(async {
                let fields: HashMap<String, String> = connection.hgetall(&key).await?;
                Ok::<_, redis::RedisError>(fields)
            })
            .await;
        let fields = Self::unwrap_breaker(result)?;

        let Some(version) = fields.get("version").and_then(|v| v.parse::<i64>().ok()) else {
            return Ok(None);
        };

        Ok(Some(IndexDocument {
            catalog_id,
            stock: fields.get("stock").and_then(|v| v.parse().ok()),
            rating: fields.get("rating").and_then(|v| v.parse().ok()),
            version,
        }))
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.get_state().await)
    }
}
