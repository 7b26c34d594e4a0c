//! Query compiler for faceted, permission-scoped search over a nested
//! document index.
//!
//! - [`schema`]: type schemas, index mappings and their read-through cache
//! - [`search`]: normalization, filter extraction, query and facet building,
//!   compound searches, paging and response formatting
//! - [`api`]: the axum HTTP surface
//! - [`config`]: layered configuration

pub mod api;
pub mod config;
pub mod error;
pub mod schema;
pub mod search;

pub use error::{AppError, Result};
