use std::sync::Mutex;
use std::time::Duration;

use br_core::control::{BrControlPlane, ControlError};
use br_core::query::BrSearchRequest;
use br_core::store::{QueryExecutor, StoreResult};
use br_store::{BrQueryFilter, FilterOperator, QueryParam, Row};
use serde_json::json;

#[derive(Default)]
struct RecordingExecutor {
    rows: Vec<Row>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Vec<QueryParam>)>>,
}

impl RecordingExecutor {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, Vec<QueryParam>)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &[QueryParam]) -> StoreResult<Vec<Row>> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((sql.to_string(), params.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.rows.clone())
    }
}

fn row(number: i64, total: i64) -> Row {
    let value = json!({ "BR_NMBR": number, "BR_SHORT_TITLE": "Portal upgrade", "TotalCount": total });
    value.as_object().cloned().expect("row literal is an object")
}

#[tokio::test]
async fn search_returns_rows_total_and_metadata() {
    let control = BrControlPlane::new(RecordingExecutor::with_rows(vec![row(12, 40), row(11, 40)]));

    let result = control
        .search_business_requests(BrSearchRequest {
            statuses: vec![7],
            filters: vec![
                BrQueryFilter::new("BR_SHORT_TITLE", FilterOperator::Eq, "portal"),
                BrQueryFilter::new("UNKNOWN", FilterOperator::Eq, "ignored"),
            ],
            limit: Some(2),
            active: true,
            ..BrSearchRequest::default()
        })
        .await
        .expect("search should succeed");

    assert_eq!(result.total_count, 40);
    assert_eq!(result.br.len(), 2);
    assert_eq!(result.metadata.row_count, 2);
    assert_eq!(result.metadata.limit, Some(2));
    assert_eq!(result.metadata.dropped_filters, vec!["UNKNOWN".to_string()]);
    assert!(result.metadata.executed_at.is_some());

    let calls = control.executor().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].1,
        vec![
            QueryParam::Int(7),
            QueryParam::Text("%portal%".to_string()),
            QueryParam::Int(2),
        ]
    );
}

#[tokio::test]
async fn empty_result_has_zero_total() {
    let control = BrControlPlane::new(RecordingExecutor::default());
    let result = control
        .search_business_requests(BrSearchRequest::default())
        .await
        .expect("search should succeed");
    assert_eq!(result.total_count, 0);
    assert!(result.br.is_empty());
}

#[tokio::test]
async fn get_business_requests_requires_numbers() {
    let control = BrControlPlane::new(RecordingExecutor::default());
    let err = control
        .get_business_requests(Vec::new(), true)
        .await
        .expect_err("empty numbers should fail");
    assert!(matches!(err, ControlError::InvalidInput(_)));
    assert!(control.executor().calls().is_empty());
}

#[tokio::test]
async fn get_business_requests_binds_numbers_without_cap() {
    let control = BrControlPlane::new(RecordingExecutor::with_rows(vec![row(5, 1)]));
    let result = control
        .get_business_requests(vec![5, 6], false)
        .await
        .expect("lookup should succeed");
    assert_eq!(result.metadata.br_numbers, vec![5, 6]);

    let calls = control.executor().calls();
    assert_eq!(calls[0].1, vec![QueryParam::Int(5), QueryParam::Int(6)]);
    assert!(!calls[0].0.contains("TOP("));
    assert!(!calls[0].0.contains("BR_ACTIVE_EN = 'Active'"));
}

#[tokio::test]
async fn invalid_date_never_reaches_executor() {
    let control = BrControlPlane::new(RecordingExecutor::default());
    let err = control
        .search_business_requests(BrSearchRequest {
            filters: vec![BrQueryFilter::new("SUBMIT_DATE", FilterOperator::Gt, "soon")],
            ..BrSearchRequest::default()
        })
        .await
        .expect_err("bad date should fail");
    assert!(matches!(err, ControlError::Filter(_)));
    assert!(control.executor().calls().is_empty());
}

#[tokio::test]
async fn slow_queries_time_out() {
    let executor = RecordingExecutor {
        delay: Some(Duration::from_millis(200)),
        ..RecordingExecutor::default()
    };
    let control = BrControlPlane::new(executor).with_query_timeout(Duration::from_millis(10));
    let err = control.list_statuses().await.expect_err("query should time out");
    assert!(matches!(err, ControlError::Timeout(_)));
}

#[tokio::test]
async fn search_fields_describe_operators() {
    let control = BrControlPlane::new(RecordingExecutor::default());
    let fields = control.search_fields();
    let submit = fields
        .iter()
        .find(|info| info.field.name == "SUBMIT_DATE")
        .expect("date field should be listed");
    assert!(submit.operators.contains(&">="));
    let title = fields
        .iter()
        .find(|info| info.field.name == "BR_SHORT_TITLE")
        .expect("text field should be listed");
    assert_eq!(title.operators, vec!["LIKE"]);
}
