//! Catalog access: the narrow store traits, the Postgres implementation and
//! an in-memory stand-in for tests and dry runs.

pub mod db;
pub mod memory;
pub mod store;

pub use db::Db;
pub use memory::MemoryCatalog;
pub use store::{CatalogStore, CoefficientSource, PgCatalogStore};
