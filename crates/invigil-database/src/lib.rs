//! # invigil-database
//!
//! PostgreSQL connection management, repositories for the exchange tables,
//! and the [`store::ExchangeStore`] unit of work used by every exchange
//! transition. An in-memory store with the same locking semantics backs
//! tests and local runs.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use store::{ExchangeStore, ExchangeTx, MemoryExchangeStore, PgExchangeStore};
