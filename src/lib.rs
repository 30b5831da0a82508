//! Concurrent TCP lottery aggregation server for betting agencies.

pub mod barrier;
pub mod bet;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod handler;
pub mod metrics;
pub mod server;
pub mod store;
