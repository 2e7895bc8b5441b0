//! Data model for br-mcp.
//!
//! Defines the business request result shapes, the search-field allow-list
//! and the table names shared by the query builder and the executor.

pub mod fields;
pub mod models;
pub mod schema;

pub use fields::{FieldKind, SEARCH_FIELDS, SearchField};
pub use models::*;
