use super::{Cache, CacheError, LockToken};
use std::time::Duration;

/// Cache kept in a Redis set, with generation locks as `SET NX PX` keys
/// whose value is the owner token.
///
/// Every operation opens its own connection so the cache stays `Sync`
/// without a connection pool.
pub struct RedisCache {
    client: redis::Client,
    key: String,
}

/// Deletes the lock only while it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

impl RedisCache {
    /// `key` names the Redis set holding the cached unique keys. Lock keys
    /// are derived from it.
    pub fn new(url: &str, key: impl Into<String>) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            key: key.into(),
        })
    }

    /// Connection URL for the given parts, in the form
    /// `redis://[:password@]host:port/db`.
    pub fn url(host: &str, port: u16, db: i64, password: Option<&str>) -> String {
        match password {
            Some(pw) => format!("redis://:{pw}@{host}:{port}/{db}"),
            None => format!("redis://{host}:{port}/{db}"),
        }
    }

    fn connection(&self) -> Result<redis::Connection, CacheError> {
        Ok(self.client.get_connection()?)
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}-lock-{}", self.key, key)
    }
}

impl Cache for RedisCache {
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        Ok(redis::cmd("SISMEMBER")
            .arg(&self.key)
            .arg(key)
            .query(&mut con)?)
    }

    fn add(&self, key: &str) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let added: i64 = redis::cmd("SADD").arg(&self.key).arg(key).query(&mut con)?;
        Ok(added > 0)
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let removed: i64 = redis::cmd("SREM").arg(&self.key).arg(key).query(&mut con)?;
        Ok(removed > 0)
    }

    fn clear(&self) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let deleted: i64 = redis::cmd("DEL").arg(&self.key).query(&mut con)?;
        Ok(deleted > 0)
    }

    fn all(&self) -> Result<Vec<String>, CacheError> {
        let mut con = self.connection()?;
        let mut keys: Vec<String> = redis::cmd("SMEMBERS").arg(&self.key).query(&mut con)?;
        keys.sort();
        Ok(keys)
    }

    fn acquire_generation_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        let mut con = self.connection()?;
        // PX rejects zero.
        let millis = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
        let token = LockToken::new();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lock_key(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query(&mut con)?;
        Ok(reply.map(|_| token))
    }

    fn release_generation_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError> {
        let mut con = self.connection()?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(self.lock_key(key))
            .arg(token.as_str())
            .invoke(&mut con)?;
        Ok(deleted > 0)
    }
}
