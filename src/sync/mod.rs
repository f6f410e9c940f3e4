//! Downstream sync: rate-limited, batched pushes of changed products to the
//! storefront API.

pub mod batcher;
pub mod client;
pub mod limiter;

pub use batcher::sync_products;
pub use client::{SyncClient, SyncOffer, SyncProduct, SyncTransport};
pub use limiter::RateLimiter;
