//! Two-tier SessionStore: a Redis hot tier with TTL renewal on read, and a SurrealDB cold
//! tier migrated to on a fixed interval (§4.10).

use std::{collections::HashMap, sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        kv::KvStore,
        types::session::{Message, MessageRole, Session},
    },
};
use serde_json::Value;
use tracing::{error, warn};
use uuid::Uuid;

fn hot_key(id: &str) -> String {
    format!("session:{id}")
}

pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    db: Arc<SurrealDbClient>,
    ttl_secs: u64,
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, db: Arc<SurrealDbClient>, ttl_secs: u64) -> Self {
        Self { kv, db, ttl_secs }
    }

    /// Looks up `id` in the hot tier, extending its TTL on a hit; falls back to the cold tier,
    /// rehydrating hot on a hit; otherwise creates an empty session. Generates a fresh id when
    /// `id` is `None` (§4.10).
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, id: Option<String>) -> Result<Session, AppError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(session) = self.read_hot(&id).await? {
            self.kv.expire(&hot_key(&id), self.ttl_secs).await?;
            return Ok(session);
        }

        if let Some(session) = self.db.get_item::<Session>(&id).await? {
            self.write_hot(&session).await?;
            return Ok(session);
        }

        let session = Session::empty(id);
        self.write_hot(&session).await?;
        Ok(session)
    }

    /// Appends one message with a server-assigned timestamp and rewrites the hot tier
    /// (§4.10). Creates the session first if it does not already exist.
    pub async fn append_message(
        &self,
        id: &str,
        role: MessageRole,
        content: String,
        metadata: Value,
    ) -> Result<Session, AppError> {
        let mut session = self.get_or_create(Some(id.to_string())).await?;
        session.push_message(Message::new(role, content, metadata));
        self.write_hot(&session).await?;
        Ok(session)
    }

    /// Union of cold (`find_all_sorted_desc`) and hot (`SCAN session:*`) sessions,
    /// deduplicated by id, sorted newest-active-first (§4.10).
    pub async fn list_all(&self, limit: usize) -> Result<Vec<Session>, AppError> {
        let cold = self.db.find_all_sorted_desc::<Session>(limit).await?;

        let mut by_id: HashMap<String, Session> = HashMap::new();
        for session in cold {
            by_id.insert(session.id.clone(), session);
        }

        let keys = self.kv.scan_keys("session:*").await?;
        for key in keys {
            let Some(id) = key.strip_prefix("session:") else {
                continue;
            };
            match self.read_hot(id).await {
                Ok(Some(session)) => {
                    by_id.insert(session.id.clone(), session);
                }
                Ok(None) => {}
                Err(err) => warn!(id, error = %err, "failed to read hot session during list_all"),
            }
        }

        let mut sessions: Vec<Session> = by_id.into_values().collect();
        sessions.sort_by(|a, b| {
            b.metadata
                .last_activity
                .cmp(&a.metadata.last_activity)
        });
        sessions.truncate(limit);
        Ok(sessions)
    }

    /// Runs forever, migrating every hot session into the cold tier every `interval`.
    /// Individual session failures are logged and skipped, never fatal to the loop (§4.10).
    pub async fn run_migration_task(&self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            if let Err(err) = self.migrate_once().await {
                error!(error = %err, "session migration pass failed");
            }
        }
    }

    async fn migrate_once(&self) -> Result<(), AppError> {
        let keys = self.kv.scan_keys("session:*").await?;
        for key in keys {
            let Some(id) = key.strip_prefix("session:") else {
                continue;
            };
            match self.read_hot(id).await {
                Ok(Some(session)) => {
                    if let Err(err) = self.db.upsert_item(session).await {
                        warn!(id, error = %err, "session migration upsert failed");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(id, error = %err, "session migration read failed"),
            }
        }
        Ok(())
    }

    async fn read_hot(&self, id: &str) -> Result<Option<Session>, AppError> {
        let Some(raw) = self.kv.get(&hot_key(id)).await? else {
            return Ok(None);
        };
        let session = serde_json::from_str(&raw)
            .map_err(|err| AppError::InternalError(format!("session decode failed: {err}")))?;
        Ok(Some(session))
    }

    async fn write_hot(&self, session: &Session) -> Result<(), AppError> {
        let raw = serde_json::to_string(session)
            .map_err(|err| AppError::InternalError(format!("session encode failed: {err}")))?;
        self.kv
            .set_ex(&hot_key(&session.id), &raw, self.ttl_secs)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::kv::FakeKvStore;

    async fn store() -> SessionStore {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        SessionStore::new(Arc::new(FakeKvStore::new()), Arc::new(db), 120)
    }

    #[tokio::test]
    async fn get_or_create_without_id_generates_one() {
        let store = store().await;
        let session = store.get_or_create(None).await.unwrap();
        assert!(!session.id.is_empty());
        assert!(session.messages.is_empty());
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent_for_an_existing_id() {
        let store = store().await;
        let first = store.get_or_create(None).await.unwrap();
        let second = store.get_or_create(Some(first.id.clone())).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn append_message_updates_count_and_persists_in_hot_tier() {
        let store = store().await;
        let session = store.get_or_create(None).await.unwrap();
        let updated = store
            .append_message(&session.id, MessageRole::User, "hello".to_string(), Value::Null)
            .await
            .unwrap();
        assert_eq!(updated.metadata.message_count, 1);

        let reread = store.get_or_create(Some(session.id)).await.unwrap();
        assert_eq!(reread.messages.len(), 1);
        assert_eq!(reread.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn migration_moves_hot_sessions_into_cold_tier() {
        let store = store().await;
        let session = store.get_or_create(None).await.unwrap();
        store.migrate_once().await.unwrap();

        let cold = store.db.get_item::<Session>(&session.id).await.unwrap();
        assert!(cold.is_some());
    }

    #[tokio::test]
    async fn list_all_dedupes_cold_and_hot_copies() {
        let store = store().await;
        let session = store.get_or_create(None).await.unwrap();
        store.migrate_once().await.unwrap();

        let all = store.list_all(10).await.unwrap();
        assert_eq!(all.iter().filter(|s| s.id == session.id).count(), 1);
    }
}
