//! Shared collaborator wiring consumed by the `server`, `worker`, and combined `main` binaries.

pub mod setup;
