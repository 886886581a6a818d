//! Query & Report Engine: read-only view-models computed over the Store.
//!
//! Three output families: the requirements matrix, the dependency graph
//! (cycles, critical path, reachability), and the persona dashboards
//! (PM/PO/QA). Rollups are cached with write-through invalidation driven
//! by Store change notifications; the engine itself never writes.
//!
//! All errors surface the Store's read errors unchanged and are
//! recoverable by retry.

pub mod cache;
pub mod dashboards;
pub mod engine;
pub mod graph;
pub mod matrix;
pub mod viewmodel;

pub use cache::RollupCache;
pub use engine::QueryEngine;
pub use matrix::MatrixFilter;

/// Result alias; the engine is read-only, so every error is a Store read
/// error.
pub type Result<T> = gonogo_store::Result<T>;
