//! Domain layer types and invariants.

pub mod entities;
pub mod metadata;
pub mod notebook;
pub mod shortcode;
pub mod slug;
