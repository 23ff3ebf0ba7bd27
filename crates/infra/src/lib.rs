//! Infrastructure layer: stores, object storage, configuration, retries.

pub mod config;
pub mod object_storage;
pub mod retry;
pub mod store;
