//! Core services for br-mcp.
//!
//! This crate owns the business request query builder, the control plane that
//! runs built queries through a [`store::QueryExecutor`], the SQL Server
//! executor, and the shared file context used by the upload tools.

pub mod control;
pub mod query;
pub mod services;
pub mod store;
