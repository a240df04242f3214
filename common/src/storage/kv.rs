use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::error::AppError;

/// The KV store contract used for three distinct roles (§5): the session hot tier, the
/// ingestion-progress counters/snapshot (§4.5), and the per-job task broker (§4.6, §C.6 of
/// `SPEC_FULL.md` — the KV store doubles as the broker rather than a separate queue).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError>;
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), AppError>;
    /// One pipelined multi-command transaction incrementing both keys atomically. Used by
    /// `ProgressTracker::increment` so `processed == successful + failed` always holds (§4.5).
    async fn incr_pipelined(
        &self,
        processed_key: &str,
        outcome_key: &str,
    ) -> Result<(i64, i64), AppError>;
    async fn del(&self, keys: &[String]) -> Result<(), AppError>;
    /// Non-blocking key enumeration by glob pattern (e.g. `session:*`).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, AppError>;
    /// Appends one task to the per-job broker list.
    async fn push(&self, list_key: &str, value: &str) -> Result<(), AppError>;
    /// Pops one task without blocking. Returns `None` immediately if the list is empty — the
    /// right primitive for a poll-drain loop that needs to move on to the next job rather than
    /// wait on this one (§4.6, §9 "avoid blocking a worker on a group-join").
    async fn pop(&self, list_key: &str) -> Result<Option<String>, AppError>;
    /// Pops one task, blocking up to `timeout_secs` (0 = block indefinitely). For a worker
    /// that genuinely intends to wait on a single list; the poll-drain path uses `pop` instead.
    async fn blocking_pop(&self, list_key: &str, timeout_secs: u64) -> Result<Option<String>, AppError>;
}

/// Redis-backed `KvStore`, grounded on the `redis` crate's `aio::ConnectionManager`
/// (`SPEC_FULL.md` §C.2) — chosen over the teacher's SurrealDB layer because §4.5/§4.10
/// require native atomic `INCR`, per-key `EXPIRE`, and `SCAN`.
pub struct RedisKvStore {
    manager: ConnectionManager,
}

impl RedisKvStore {
    pub async fn connect(
        host: &str,
        port: u16,
        db: i64,
        password: Option<&str>,
    ) -> Result<Self, AppError> {
        let url = match password {
            Some(pw) => format!("redis://:{pw}@{host}:{port}/{db}"),
            None => format!("redis://{host}:{port}/{db}"),
        };
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = conn.expire(key, ttl_secs as i64).await?;
        Ok(())
    }

    async fn incr_pipelined(
        &self,
        processed_key: &str,
        outcome_key: &str,
    ) -> Result<(i64, i64), AppError> {
        let mut conn = self.manager.clone();
        let (processed, outcome): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(processed_key)
            .cmd("INCR")
            .arg(outcome_key)
            .query_async(&mut conn)
            .await?;
        Ok((processed, outcome))
    }

    async fn del(&self, keys: &[String]) -> Result<(), AppError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.manager.clone();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn push(&self, list_key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: () = conn.rpush(list_key, value).await?;
        Ok(())
    }

    async fn pop(&self, list_key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.rpop(list_key, None).await?;
        Ok(value)
    }

    async fn blocking_pop(&self, list_key: &str, timeout_secs: u64) -> Result<Option<String>, AppError> {
        let mut conn = self.manager.clone();
        let result: Option<(String, String)> = conn.brpop(list_key, timeout_secs as f64).await?;
        Ok(result.map(|(_, value)| value))
    }
}

/// In-memory `KvStore` for unit tests. TTLs are recorded but not enforced by a reaper;
/// tests that care about expiry check `ttl_remaining` directly instead of sleeping.
pub mod fake {
    use super::{AppError, KvStore};
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeKvStore {
        strings: Mutex<HashMap<String, String>>,
        lists: Mutex<HashMap<String, VecDeque<String>>>,
    }

    impl FakeKvStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl KvStore for FakeKvStore {
        async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
            Ok(self.strings.lock().await.get(key).cloned())
        }

        async fn set_ex(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<(), AppError> {
            self.strings
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<(), AppError> {
            Ok(())
        }

        async fn incr_pipelined(
            &self,
            processed_key: &str,
            outcome_key: &str,
        ) -> Result<(i64, i64), AppError> {
            let mut strings = self.strings.lock().await;
            let processed = bump(&mut strings, processed_key);
            let outcome = bump(&mut strings, outcome_key);
            Ok((processed, outcome))
        }

        async fn del(&self, keys: &[String]) -> Result<(), AppError> {
            let mut strings = self.strings.lock().await;
            for key in keys {
                strings.remove(key);
            }
            Ok(())
        }

        async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, AppError> {
            let prefix = pattern.trim_end_matches('*');
            let strings = self.strings.lock().await;
            Ok(strings
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn push(&self, list_key: &str, value: &str) -> Result<(), AppError> {
            self.lists
                .lock()
                .await
                .entry(list_key.to_string())
                .or_default()
                .push_back(value.to_string());
            Ok(())
        }

        async fn pop(&self, list_key: &str) -> Result<Option<String>, AppError> {
            Ok(self
                .lists
                .lock()
                .await
                .get_mut(list_key)
                .and_then(VecDeque::pop_front))
        }

        async fn blocking_pop(
            &self,
            list_key: &str,
            _timeout_secs: u64,
        ) -> Result<Option<String>, AppError> {
            Ok(self
                .lists
                .lock()
                .await
                .get_mut(list_key)
                .and_then(VecDeque::pop_front))
        }
    }

    fn bump(strings: &mut HashMap<String, String>, key: &str) -> i64 {
        let entry = strings.entry(key.to_string()).or_insert_with(|| "0".to_string());
        let next = entry.parse::<i64>().unwrap_or(0) + 1;
        *entry = next.to_string();
        next
    }
}

pub use fake::FakeKvStore;

#[cfg(test)]
mod tests {
    use super::fake::FakeKvStore;
    use super::*;

    #[tokio::test]
    async fn incr_pipelined_keeps_processed_equal_to_sum() {
        let kv = FakeKvStore::new();
        for _ in 0..5 {
            kv.incr_pipelined("processed:job", "successful:job")
                .await
                .unwrap();
        }
        for _ in 0..2 {
            kv.incr_pipelined("processed:job", "failed:job")
                .await
                .unwrap();
        }
        let processed: i64 = kv.get("processed:job").await.unwrap().unwrap().parse().unwrap();
        let successful: i64 = kv
            .get("successful:job")
            .await
            .unwrap()
            .unwrap()
            .parse()
            .unwrap();
        let failed: i64 = kv.get("failed:job").await.unwrap().unwrap().parse().unwrap();
        assert_eq!(processed, 7);
        assert_eq!(successful + failed, processed);
    }

    #[tokio::test]
    async fn scan_keys_matches_prefix() {
        let kv = FakeKvStore::new();
        kv.set_ex("session:a", "1", 60).await.unwrap();
        kv.set_ex("session:b", "2", 60).await.unwrap();
        kv.set_ex("other:c", "3", 60).await.unwrap();

        let mut keys = kv.scan_keys("session:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:a".to_string(), "session:b".to_string()]);
    }

    #[tokio::test]
    async fn push_and_pop_is_fifo() {
        let kv = FakeKvStore::new();
        kv.push("jobs:1", "file-a.pdf").await.unwrap();
        kv.push("jobs:1", "file-b.pdf").await.unwrap();

        assert_eq!(kv.pop("jobs:1").await.unwrap(), Some("file-a.pdf".to_string()));
        assert_eq!(kv.pop("jobs:1").await.unwrap(), Some("file-b.pdf".to_string()));
        assert_eq!(kv.pop("jobs:1").await.unwrap(), None);
    }
}
