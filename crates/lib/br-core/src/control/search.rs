use std::time::Instant;

use br_store::schema::COLUMN_TOTAL_COUNT;
use br_store::{BrQueryMetadata, BrQueryResult, Row};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::query::BrSearchRequest;
use crate::store::QueryExecutor;

use super::{BrControlPlane, ControlError};

impl<E: QueryExecutor> BrControlPlane<E> {
    /// Runs a filtered business request search.
    ///
    /// # Errors
    /// Returns `ControlError` if a filter value is invalid, the query fails,
    /// or it exceeds the query timeout.
    pub async fn search_business_requests(
        &self,
        request: BrSearchRequest,
    ) -> Result<BrQueryResult, ControlError> {
        let built = request.build()?;
        let started = Instant::now();
        let rows = self.run(&built.sql, &built.params).await?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            rows = rows.len(),
            filters = request.filters.len(),
            dropped = built.dropped_filters.len(),
            elapsed_ms,
            "business request search completed"
        );

        let total_count = total_count(&rows);
        let limit = request.effective_limit();
        let BrSearchRequest {
            br_numbers,
            statuses,
            filters,
            active,
            ..
        } = request;

        Ok(BrQueryResult {
            metadata: BrQueryMetadata {
                br_numbers,
                statuses,
                filters,
                dropped_filters: built.dropped_filters,
                limit,
                active,
                row_count: rows.len(),
                executed_at: Some(Utc::now().to_rfc3339()),
                elapsed_ms: Some(elapsed_ms),
            },
            br: rows,
            total_count,
        })
    }

    /// Fetches business requests by number, without a row cap.
    ///
    /// # Errors
    /// Returns `ControlError::InvalidInput` when no numbers are given, or any
    /// error from [`Self::search_business_requests`].
    pub async fn get_business_requests(
        &self,
        br_numbers: Vec<i64>,
        active: bool,
    ) -> Result<BrQueryResult, ControlError> {
        if br_numbers.is_empty() {
            return Err(ControlError::InvalidInput(
                "at least one BR number is required".to_string(),
            ));
        }
        self.search_business_requests(BrSearchRequest {
            br_numbers,
            active,
            ..BrSearchRequest::default()
        })
        .await
    }
}

fn total_count(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.get(COLUMN_TOTAL_COUNT))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}
