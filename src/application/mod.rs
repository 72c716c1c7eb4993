//! Notebook pipeline services and the host interfaces they depend on.

pub mod assets;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod images;
pub mod metadata;
pub mod publish;
pub mod repos;
pub mod transform;
