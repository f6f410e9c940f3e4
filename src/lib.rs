pub mod catalog;
pub mod error;
pub mod feed;
pub mod housekeeping;
pub mod model;
pub mod orchestrator;
pub mod pricing;
pub mod reconcile;
pub mod suppliers;
pub mod sync;
pub mod tracing;

pub mod util {
    pub mod env;
}
