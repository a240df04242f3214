pub mod db;
pub mod kv;
pub mod types;
pub mod vector_store;

pub use db::SurrealDbClient;
pub use kv::{FakeKvStore, KvStore, RedisKvStore};
pub use vector_store::{SearchHit, SurrealVectorStore, VectorStoreGateway};
