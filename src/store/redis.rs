// src/store/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RedisConfig;
use crate::error::{Result, StoreError, ThrottleError};
use crate::store::{AtomicProcedure, AtomicStore, StoreValue};

/// Token bucket state lives in a hash (`tokens`, `last_refill`) with a one
/// hour TTL so idle buckets are garbage collected by the server.
const TOKEN_BUCKET_TAKE: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1]) or capacity
local last_refill = tonumber(bucket[2]) or now

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + elapsed * refill_rate)

local allowed = 0
if tokens >= cost then
    tokens = tokens - cost
    allowed = 1
end

redis.call('HMSET', key, 'tokens', tokens, 'last_refill', now)
redis.call('EXPIRE', key, 3600)

local retry_after = 0
if allowed == 0 then
    retry_after = (cost - tokens) / refill_rate
end

return {allowed, math.floor(tokens), tostring(retry_after)}
"#;

const TOKEN_BUCKET_REFUND: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local amount = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1]) or capacity
local last_refill = tonumber(bucket[2]) or now

tokens = math.min(capacity, tokens + amount)
redis.call('HMSET', key, 'tokens', tokens, 'last_refill', last_refill)
redis.call('EXPIRE', key, 3600)

return {math.floor(tokens)}
"#;

/// Per-window counter key; the TTL (twice the window) outlives the window
/// so late readers of the previous window still see its count.
const FIXED_WINDOW_TAKE: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local cost = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])

local count = tonumber(redis.call('GET', key) or '0')
local allowed = 0
if count + cost <= limit then
    count = redis.call('INCRBY', key, cost)
    allowed = 1
end
redis.call('EXPIRE', key, ttl)

return {allowed, count}
"#;

/// Refunds must not resurrect a window: an absent key stays absent, and
/// the decrement floors at zero with the TTL preserved.
const WINDOW_REFUND: &str = r#"
local key = KEYS[1]
local amount = tonumber(ARGV[1])

if redis.call('EXISTS', key) == 0 then
    return {0}
end

local count = redis.call('DECRBY', key, amount)
if count < 0 then
    redis.call('SET', key, 0, 'KEEPTTL')
    count = 0
end

return {count}
"#;

const SLIDING_COUNTER_TAKE: &str = r#"
local current_key = KEYS[1]
local previous_key = KEYS[2]
local window_size = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now = tonumber(ARGV[4])
local window_start = tonumber(ARGV[5])

local current = tonumber(redis.call('GET', current_key) or '0')
local previous = tonumber(redis.call('GET', previous_key) or '0')

local elapsed = now - window_start
local overlap = (window_size - elapsed) / window_size
local estimate = math.floor(previous * overlap) + current

local allowed = 0
local remaining = 0
if estimate + cost <= limit then
    redis.call('INCRBY', current_key, cost)
    redis.call('EXPIRE', current_key, window_size * 2)
    allowed = 1
    remaining = limit - estimate - cost
end

return {allowed, remaining, estimate}
"#;

const SLIDING_LOG_TAKE: &str = r#"
local key = KEYS[1]
local window_size = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

redis.call('ZREMRANGEBYSCORE', key, 0, now - window_size)
local count = redis.call('ZCARD', key)

local allowed = 0
if count + cost <= limit then
    for i = 0, cost - 1 do
        redis.call('ZADD', key, now, tostring(now) .. ':' .. tostring(i))
    end
    redis.call('EXPIRE', key, math.ceil(window_size))
    allowed = 1
    count = count + cost
end

local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_score = '-1'
if #oldest > 0 then
    oldest_score = oldest[2]
end

return {allowed, count, oldest_score}
"#;

/// Redis-backed implementation of the atomic-store contract. Each
/// procedure is a server-side Lua script, so the whole read-decide-update
/// sequence runs without interleaving from other clients.
pub struct RedisStore {
    client: Client,
    connection: Arc<tokio::sync::Mutex<ConnectionManager>>,
    scripts: HashMap<AtomicProcedure, Script>,
    config: RedisConfig,
}

// Manually implement Debug
impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.config.url)
            .finish()
    }
}

// Manually implement Clone
impl Clone for RedisStore {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            connection: Arc::clone(&self.connection),
            scripts: scripts(),
            config: self.config.clone(),
        }
    }
}

fn scripts() -> HashMap<AtomicProcedure, Script> {
    HashMap::from([
        (AtomicProcedure::TokenBucketTake, Script::new(TOKEN_BUCKET_TAKE)),
        (
            AtomicProcedure::TokenBucketRefund,
            Script::new(TOKEN_BUCKET_REFUND),
        ),
        (AtomicProcedure::FixedWindowTake, Script::new(FIXED_WINDOW_TAKE)),
        (AtomicProcedure::WindowRefund, Script::new(WINDOW_REFUND)),
        (
            AtomicProcedure::SlidingCounterTake,
            Script::new(SLIDING_COUNTER_TAKE),
        ),
        (AtomicProcedure::SlidingLogTake, Script::new(SLIDING_LOG_TAKE)),
    ])
}

fn to_store_value(value: redis::Value) -> Result<StoreValue> {
    match value {
        redis::Value::Nil => Ok(StoreValue::Nil),
        redis::Value::Int(i) => Ok(StoreValue::Int(i)),
        redis::Value::Double(d) => Ok(StoreValue::Float(d)),
        redis::Value::BulkString(bytes) => Ok(StoreValue::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        )),
        redis::Value::SimpleString(s) => Ok(StoreValue::Text(s)),
        redis::Value::Okay => Ok(StoreValue::Text("OK".to_string())),
        redis::Value::Boolean(b) => Ok(StoreValue::Int(b as i64)),
        other => Err(ThrottleError::Store(StoreError::UnexpectedReply(format!(
            "unsupported Redis value: {:?}",
            other
        )))),
    }
}

impl RedisStore {
    /// Creates a new Redis store with the given configuration
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str())
            .map_err(|e| ThrottleError::Store(StoreError::RedisConnection(e.to_string())))?;

        // Create a connection manager with timeout
        let connection_future = ConnectionManager::new(client.clone());

        let connection_manager =
            match tokio::time::timeout(config.connection_timeout, connection_future).await {
                Ok(result) => result.map_err(|e| {
                    ThrottleError::Store(StoreError::RedisConnection(e.to_string()))
                })?,
                Err(_) => {
                    return Err(ThrottleError::Store(StoreError::RedisConnection(format!(
                        "Connection to Redis at {} timed out after {:?}",
                        config.url, config.connection_timeout
                    ))));
                }
            };

        Ok(Self {
            client,
            connection: Arc::new(tokio::sync::Mutex::new(connection_manager)),
            scripts: scripts(),
            config,
        })
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock().await;

        let ping_future = redis::AsyncCommands::ping::<String>(&mut *conn);

        let result = match tokio::time::timeout(self.config.connection_timeout, ping_future).await {
            Ok(inner_result) => inner_result
                .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?,
            Err(_) => {
                return Err(ThrottleError::Store(StoreError::RedisCommand(format!(
                    "Redis PING operation timed out after {:?}",
                    self.config.connection_timeout
                ))));
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(ThrottleError::Store(StoreError::RedisCommand(format!(
                "Unexpected response from Redis PING: {}",
                result
            ))))
        }
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    async fn execute(
        &self,
        procedure: AtomicProcedure,
        keys: &[String],
        args: &[StoreValue],
    ) -> Result<Vec<StoreValue>> {
        let script = self.scripts.get(&procedure).ok_or_else(|| {
            ThrottleError::Internal(format!("no script registered for {:?}", procedure))
        })?;

        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            match arg {
                StoreValue::Int(v) => invocation.arg(*v),
                StoreValue::Float(v) => invocation.arg(*v),
                StoreValue::Text(s) => invocation.arg(s.as_str()),
                StoreValue::Nil => invocation.arg(""),
            };
        }

        let mut conn = self.connection.lock().await;
        let reply: redis::Value = invocation
            .invoke_async(&mut *conn)
            .await
            .map_err(ThrottleError::from)?;
        drop(conn);

        crate::store_op!(procedure, keys[0].as_str(), true);

        match reply {
            redis::Value::Array(items) => items.into_iter().map(to_store_value).collect(),
            other => Ok(vec![to_store_value(other)?]),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.connection.lock().await;
        let result: Option<i64> = redis::AsyncCommands::get(&mut *conn, key)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }

    async fn increment_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut conn = self.connection.lock().await;
        let result: i64 = conn
            .incr(key, amount)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let result: bool = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let result: i64 = conn
            .del(key)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result > 0)
    }

    async fn sorted_remove_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<u64> {
        let mut conn = self.connection.lock().await;
        let result: u64 = conn
            .zrembyscore(key, min, max)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }

    async fn sorted_cardinality(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection.lock().await;
        let result: u64 = conn
            .zcard(key)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: i64 = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(())
    }

    async fn sorted_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<(String, f64)>> {
        let mut conn = self.connection.lock().await;
        let result: Vec<(String, f64)> = conn
            .zrange_withscores(key, start as isize, stop as isize)
            .await
            .map_err(|e| ThrottleError::Store(StoreError::RedisCommand(e.to_string())))?;

        Ok(result)
    }
}
