//! Queue Integration Test Modules

pub mod concurrency;
pub mod requeue;
pub mod timeout;
