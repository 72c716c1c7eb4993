//! Publish GitHub-hosted Jupyter notebooks as blog posts.
//!
//! Notebooks referenced from a post body with `[ipynb <url>]` are downloaded,
//! their embedded images written out as WebP files, their `%META` cell
//! stripped, and the result cached on disk. The metadata cell is copied onto
//! the post whenever the post is saved.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
