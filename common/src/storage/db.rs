use std::ops::Deref;

use super::types::StoredObject;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

/// Thin wrapper around a SurrealDB connection shared by every crate that
/// persists durable state (the document store half of §4.10, plus
/// Evaluation/Question/EvaluationResult in §3).
#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;
        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    /// Operation to store an object in SurrealDB, requires the struct to implement `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Overwrite semantics: used where the id is caller-assigned and re-writes are expected
    /// (sessions migrating from hot to cold tier, see §4.10).
    pub async fn upsert_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .upsert((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Equality filter over one field. `field` is always a constant from our own call sites,
    /// never caller-supplied, so string interpolation into the query is safe here.
    pub async fn find_by<T>(&self, field: &str, value: &str) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let query = format!("SELECT * FROM type::table($table) WHERE {field} = $value");
        let mut response = self
            .client
            .query(query)
            .bind(("table", T::table_name()))
            .bind(("value", value.to_string()))
            .await?;
        response.take(0)
    }

    /// Newest-first listing, used by `SessionStore::list_all`'s cold-tier half (§4.10).
    pub async fn find_all_sorted_desc<T>(&self, limit: usize) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        let query = "SELECT * FROM type::table($table) ORDER BY created_at DESC LIMIT $limit";
        let mut response = self
            .client
            .query(query)
            .bind(("table", T::table_name()))
            .bind(("limit", limit as i64))
            .await?;
        response.take(0)
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use crate::stored_object;

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("failed to start in-memory surrealdb");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("store failed");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("fetch failed");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("fetch all failed");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("delete failed");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("fetch after delete failed");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_find_by_field() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("failed to start in-memory surrealdb");

        for name in ["alice", "alice", "bob"] {
            db.store_item(Dummy {
                id: Uuid::new_v4().to_string(),
                name: name.to_string(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .expect("store failed");
        }

        let alices: Vec<Dummy> = db.find_by("name", "alice").await.expect("find_by failed");
        assert_eq!(alices.len(), 2);
    }
}
