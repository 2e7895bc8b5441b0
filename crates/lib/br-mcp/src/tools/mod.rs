//! MCP tool modules.
//!
//! Tools are grouped by domain: business request search, lookup lists,
//! uploaded file context, and help.

pub mod files;
pub mod search;
mod context;
mod lookup;
