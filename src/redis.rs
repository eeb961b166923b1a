use crate::error::{LimiterError, Result};
use crate::store::{BatchOp, BatchReply, CounterStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::Duration;

/// Runs a batch as one script. KEYS holds one key per op; ARGV holds
/// `op, value, ttl` for each of them in the same order.
///
/// Every increment target is checked before anything is written, so a batch
/// that would fail half way is rejected whole.
const BATCH_SCRIPT: &str = r#"
    for i = 1, #KEYS do
        if ARGV[i * 3 - 2] == "incr" then
            local current = redis.call("GET", KEYS[i])
            if current and not string.match(current, "^-?%d+$") then
                return redis.error_reply("ERR value at " .. KEYS[i] .. " is not an integer")
            end
        end
    end

    local replies = {}
    for i = 1, #KEYS do
        local op = ARGV[i * 3 - 2]
        local value = ARGV[i * 3 - 1]
        local ttl = ARGV[i * 3]

        if op == "incr" then
            replies[i] = redis.call("INCR", KEYS[i])
        elseif op == "expire" then
            replies[i] = redis.call("EXPIRE", KEYS[i], ttl)
        elseif redis.call("SET", KEYS[i], value, "NX", "EX", ttl) then
            replies[i] = 1
        else
            replies[i] = 0
        end
    end

    return replies
"#;

/// Counter store backed by a shared Redis server.
///
/// Batches run inside a single Lua script, so either every op in the batch is
/// applied or none is.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    batch_script: Script,
}

impl RedisStore {
    /// Open a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            LimiterError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;
        let connection = ConnectionManager::new(client).await?;

        tracing::debug!(target: "window_limiter::redis", "Connected to Redis");

        Ok(Self::from_connection_manager(connection))
    }

    pub fn from_connection_manager(connection: ConnectionManager) -> Self {
        Self {
            connection,
            batch_script: Script::new(BATCH_SCRIPT),
        }
    }

    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong)
    }
}

/// Redis takes whole seconds for `EXPIRE` and `SET EX`; never send zero.
fn ttl_secs(ttl: &Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Key and `op, value, ttl` script arguments for one op.
fn encode_op(op: &BatchOp) -> (&str, &'static str, i64, u64) {
    match op {
        BatchOp::Increment { key } => (key.as_str(), "incr", 0, 0),
        BatchOp::Expire { key, ttl } => (key.as_str(), "expire", 0, ttl_secs(ttl)),
        BatchOp::SetIfNotExists { key, value, ttl } => {
            (key.as_str(), "setnx", *value, ttl_secs(ttl))
        }
    }
}

fn decode_reply(op: &BatchOp, value: i64) -> BatchReply {
    match op {
        BatchOp::Increment { .. } => BatchReply::Count(value),
        BatchOp::Expire { .. } | BatchOp::SetIfNotExists { .. } => BatchReply::Applied(value == 1),
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn atomic_batch(&self, ops: &[BatchOp]) -> Result<Vec<BatchReply>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut invocation = self.batch_script.prepare_invoke();
        for op in ops {
            let (key, name, value, ttl) = encode_op(op);
            invocation.key(key).arg(name).arg(value).arg(ttl);
        }

        let mut conn = self.connection.clone();
        let values: Vec<i64> = invocation.invoke_async(&mut conn).await?;

        if values.len() != ops.len() {
            return Err(LimiterError::Store(format!(
                "Batch script returned {} replies for {} ops",
                values.len(),
                ops.len()
            )));
        }

        Ok(ops
            .iter()
            .zip(values)
            .map(|(op, value)| decode_reply(op, value))
            .collect())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: i64, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(&ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_never_zero() {
        assert_eq!(ttl_secs(&Duration::from_secs(20)), 20);
        assert_eq!(ttl_secs(&Duration::from_millis(200)), 1);
    }

    #[test]
    fn test_encode_ops_as_script_arguments() {
        let ttl = Duration::from_secs(20);
        let increment = BatchOp::Increment { key: "user1:1000".into() };
        let expire = BatchOp::Expire {
            key: "user1:1000".into(),
            ttl,
        };
        let seed = BatchOp::SetIfNotExists {
            key: "user1:990".into(),
            value: 0,
            ttl,
        };

        assert_eq!(encode_op(&increment), ("user1:1000", "incr", 0, 0));
        assert_eq!(encode_op(&expire), ("user1:1000", "expire", 0, 20));
        assert_eq!(encode_op(&seed), ("user1:990", "setnx", 0, 20));
    }

    #[test]
    fn test_script_validates_before_writing() {
        let validate = BATCH_SCRIPT.find("error_reply").unwrap();
        let first_write = BATCH_SCRIPT.find("\"INCR\"").unwrap();
        assert!(validate < first_write);
    }

    #[test]
    fn test_decode_replies() {
        let ttl = Duration::from_secs(20);
        let increment = BatchOp::Increment { key: "k".into() };
        let expire = BatchOp::Expire { key: "k".into(), ttl };
        let seed = BatchOp::SetIfNotExists {
            key: "k".into(),
            value: 0,
            ttl,
        };

        assert_eq!(decode_reply(&increment, 3), BatchReply::Count(3));
        assert_eq!(decode_reply(&expire, 1), BatchReply::Applied(true));
        assert_eq!(decode_reply(&expire, 0), BatchReply::Applied(false));
        assert_eq!(decode_reply(&seed, 1), BatchReply::Applied(true));
        assert_eq!(decode_reply(&seed, 0), BatchReply::Applied(false));
    }
}
