use super::{BucketState, KeyValueStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;

const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

// Mirrors `TokenBucket::take`. Tokens travel as strings because Lua number
// replies are truncated to integers.
const TAKE_TOKEN_SCRIPT: &str = r#"
local rate = tonumber(ARGV[1])
local burst = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])
local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
    tokens = burst
    ts = now
end
local elapsed = math.max(0, now - ts)
tokens = math.min(burst, tokens + elapsed * rate / 1000)
local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end
redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(math.max(ts, now)))
redis.call('PEXPIRE', KEYS[1], ttl)
return {allowed, tostring(tokens)}
"#;

/// Redis-backed coordination store shared by all server instances.
///
/// Cloning is cheap; clones share one `ConnectionManager`.
#[derive(Clone)]
pub struct RedisStore {
    conn_manager: ConnectionManager,
    unlock_script: redis::Script,
    take_token_script: redis::Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        Ok(Self {
            conn_manager,
            unlock_script: redis::Script::new(UNLOCK_SCRIPT),
            take_token_script: redis::Script::new(TAKE_TOKEN_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let deleted: i64 = self
            .unlock_script
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn read_record(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let fields: HashMap<String, Vec<u8>> =
            redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
        Ok(if fields.is_empty() { None } else { Some(fields) })
    }

    async fn write_record(
        &self,
        key: &str,
        fields: Vec<(String, Vec<u8>)>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (field, value) in &fields {
            hset.arg(field).arg(value.as_slice());
        }
        let _: () = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(key)
            .ignore()
            .add_command(hset)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn take_token(
        &self,
        key: &str,
        rate_per_sec: f64,
        burst: u32,
        now_ms: i64,
        idle_ttl: Duration,
    ) -> Result<BucketState, StoreError> {
        let mut conn = self.conn_manager.clone();
        let (allowed, tokens): (i64, String) = self
            .take_token_script
            .key(key)
            .arg(rate_per_sec)
            .arg(burst)
            .arg(now_ms)
            .arg(ttl_millis(idle_ttl))
            .invoke_async(&mut conn)
            .await?;
        let tokens = tokens.parse::<f64>().map_err(|e| StoreError::Malformed {
            key: key.to_string(),
            reason: format!("token count {tokens:?}: {e}"),
        })?;
        Ok(BucketState {
            allowed: allowed == 1,
            tokens,
        })
    }
}
