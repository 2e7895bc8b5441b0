use std::{error::Error, fmt, sync::Arc, time::Duration};

use br_store::{FilterError, QueryParam, Row};
use tracing::debug;

use crate::store::{QueryExecutor, StoreError};

pub mod lookup;
pub mod search;

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub enum ControlError {
    InvalidInput(String),
    Filter(FilterError),
    Store(StoreError),
    Timeout(Duration),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
            Self::Filter(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Timeout(timeout) => {
                write!(f, "query timed out after {}s", timeout.as_secs())
            }
        }
    }
}

impl Error for ControlError {}

impl From<FilterError> for ControlError {
    fn from(err: FilterError) -> Self {
        Self::Filter(err)
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Entry point for business request queries over a [`QueryExecutor`].
pub struct BrControlPlane<E: QueryExecutor> {
    executor: Arc<E>,
    query_timeout: Duration,
}

impl<E: QueryExecutor> Clone for BrControlPlane<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            query_timeout: self.query_timeout,
        }
    }
}

impl<E: QueryExecutor> BrControlPlane<E> {
    pub fn new(executor: E) -> Self {
        Self::from_arc(Arc::new(executor))
    }

    pub const fn from_arc(executor: Arc<E>) -> Self {
        Self {
            executor,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run(&self, sql: &str, params: &[QueryParam]) -> Result<Vec<Row>, ControlError> {
        debug!(params = params.len(), "executing statement");
        tokio::time::timeout(self.query_timeout, self.executor.execute(sql, params))
            .await
            .map_err(|_| ControlError::Timeout(self.query_timeout))?
            .map_err(ControlError::from)
    }
}
