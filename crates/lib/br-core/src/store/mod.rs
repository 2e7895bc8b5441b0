//! Database execution seam and the SQL Server implementation.
//!
//! The control plane only sees [`QueryExecutor`]; `MssqlExecutor` speaks TDS.

pub mod mssql;

use std::{error::Error, fmt, future::Future, io};

use br_store::{QueryParam, Row};

pub use mssql::MssqlExecutor;

#[derive(Debug)]
pub enum StoreError {
    Tds(Box<tiberius::error::Error>),
    Io(io::Error),
    Connection(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tds(err) => write!(f, "SQL Server error: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Connection(message) => write!(f, "Connection error: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<tiberius::error::Error> for StoreError {
    fn from(err: tiberius::error::Error) -> Self {
        Self::Tds(Box::new(err))
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Runs a statement with positional parameters and returns its first result set.
pub trait QueryExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> impl Future<Output = StoreResult<Vec<Row>>> + Send;
}
