//! SQLite-backed relational store for the gonogo traceability engine.
//!
//! The Store owns all rows. Ingestion components (scanner, synchronizer,
//! collector) write only through its transactional API; the query engine
//! is read-only. Committed writes publish change notifications consumed by
//! the report cache invalidator.

pub mod error;
pub mod notify;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use notify::{ChangeEvent, ChangeTable};
pub use sqlite::store::SqliteStore;
pub use traits::{Storage, Transaction};
