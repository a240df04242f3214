pub mod chat;
pub mod evaluation;
pub mod ingestion;
pub mod liveness;
pub mod readiness;
pub mod retrieve;
pub mod sessions;
