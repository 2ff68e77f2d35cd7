//! Postgres-backed implementation of `voice_agent_core::traits::Store`.
//!
//! Schema is managed externally (see `migrations/`); this crate only talks
//! to tables that are assumed to already exist. Queries are written against
//! `sqlx::query`/`query_as` rather than the `query!` macro family so the
//! crate builds without a live `DATABASE_URL` at compile time.

pub mod error;
pub mod pg;

pub use error::StoreError;
pub use pg::PgStore;
