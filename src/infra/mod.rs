//! Infrastructure adapters and runtime bootstrap.

pub mod bootstrap;
pub mod error;
pub mod http;
pub mod media;
pub mod store;
pub mod telemetry;
