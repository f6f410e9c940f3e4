//! Feed-to-catalog reconciliation: chunked merge of parsed supplier rows
//! into per-product offer collections, stock status derivation and the
//! resource guards that bound a run.

pub mod engine;
pub mod guard;
pub mod stock;

pub use engine::{chunk_size_for, EngineReport};
pub use guard::{GuardStop, ResourceGuard};
pub use stock::{derive_stock_state, BACKORDER_MIN_QUANTITY};
