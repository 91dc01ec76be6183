//! Lease client implementations.

pub mod http_engine;
pub mod inmem_engine;

pub use http_engine::HttpLeaseClient;
pub use inmem_engine::{Disposition, InMemoryEngine};
