use br_store::schema::STATUS_LOOKUP_QUERY;
use br_store::{FilterOperator, Row, SEARCH_FIELDS, SearchField};
use serde::Serialize;

use crate::store::QueryExecutor;

use super::{BrControlPlane, ControlError};

/// Search field description returned by the lookup tools.
#[derive(Debug, Clone, Serialize)]
pub struct SearchFieldInfo {
    #[serde(flatten)]
    pub field: SearchField,
    pub operators: Vec<&'static str>,
}

impl<E: QueryExecutor> BrControlPlane<E> {
    /// Lists the status dimension rows.
    ///
    /// # Errors
    /// Returns `ControlError` if the query fails or times out.
    pub async fn list_statuses(&self) -> Result<Vec<Row>, ControlError> {
        self.run(STATUS_LOOKUP_QUERY, &[]).await
    }

    /// Describes every allow-listed search field.
    #[must_use]
    pub fn search_fields(&self) -> Vec<SearchFieldInfo> {
        SEARCH_FIELDS
            .iter()
            .map(|field| SearchFieldInfo {
                field: *field,
                operators: if field.is_date() {
                    FilterOperator::ALL.iter().map(|op| op.as_sql()).collect()
                } else {
                    vec!["LIKE"]
                },
            })
            .collect()
    }
}
