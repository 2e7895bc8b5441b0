use br_core::query::BrSearchRequest;
use br_core::store::QueryExecutor;
use br_store::{BrQueryFilter, BrQueryMetadata, FilterError, FilterOperator};
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::{BrMcp, helpers};

const DEFAULT_LIMIT: u32 = 100;

/// Filter on an allow-listed search field.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct FilterParam {
    /// Search field name, see `list_search_fields`.
    pub name: String,
    /// Comparison for date fields: `=`, `<>`, `<`, `<=`, `>`, `>=`. Ignored for text fields.
    pub operator: Option<String>,
    pub value: String,
}

impl TryFrom<FilterParam> for BrQueryFilter {
    type Error = FilterError;

    fn try_from(param: FilterParam) -> Result<Self, Self::Error> {
        let operator = match param.operator.as_deref() {
            Some(operator) => operator.parse()?,
            None => FilterOperator::default(),
        };
        Ok(Self::new(param.name, operator, param.value))
    }
}

/// Parameters for a filtered business request search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchBusinessRequestsParams {
    pub br_numbers: Option<Vec<i64>>,
    pub statuses: Option<Vec<i64>>,
    pub filters: Option<Vec<FilterParam>>,
    /// Row cap, defaults to 100. Zero removes the cap.
    pub limit: Option<u32>,
    /// Only active business requests, defaults to true.
    pub active: Option<bool>,
}

impl TryFrom<SearchBusinessRequestsParams> for BrSearchRequest {
    type Error = FilterError;

    fn try_from(params: SearchBusinessRequestsParams) -> Result<Self, Self::Error> {
        let filters = params
            .filters
            .unwrap_or_default()
            .into_iter()
            .map(BrQueryFilter::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            br_numbers: params.br_numbers.unwrap_or_default(),
            statuses: params.statuses.unwrap_or_default(),
            filters,
            limit: Some(params.limit.unwrap_or(DEFAULT_LIMIT)),
            active: params.active.unwrap_or(true),
        })
    }
}

/// Parameters for fetching business requests by number.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetBusinessRequestsParams {
    pub br_numbers: Vec<i64>,
    /// Only active business requests, defaults to true.
    pub active: Option<bool>,
}

/// Summary of the result cached for the current session.
#[derive(Debug, Clone, Serialize)]
struct SessionContext {
    metadata: BrQueryMetadata,
    #[serde(rename = "TotalCount")]
    total_count: i64,
}

#[tool_router(router = tool_router_search, vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[tool(description = "Search business requests by BR numbers, status ids and field filters. Returns {br, metadata, TotalCount}.")]
    async fn search_business_requests(
        &self,
        Parameters(params): Parameters<SearchBusinessRequestsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let request = BrSearchRequest::try_from(params)
            .map_err(|err| helpers::mcp_err(ErrorCode::INVALID_PARAMS, err.to_string()))?;
        let result = self
            .control
            .search_business_requests(request)
            .await
            .map_err(helpers::map_err)?;
        let content = Content::json(&result)?;
        self.remember(result).await;
        Ok(CallToolResult::success(vec![content]))
    }

    #[tool(description = "Fetch business requests by BR number, without a row cap.")]
    async fn get_business_requests(
        &self,
        Parameters(params): Parameters<GetBusinessRequestsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .control
            .get_business_requests(params.br_numbers, params.active.unwrap_or(true))
            .await
            .map_err(helpers::map_err)?;
        let content = Content::json(&result)?;
        self.remember(result).await;
        Ok(CallToolResult::success(vec![content]))
    }

    #[tool(description = "Return the metadata of the last business request result in this session.")]
    async fn get_business_requests_context(&self) -> Result<CallToolResult, ErrorData> {
        let Some(result) = self.cached_result().await else {
            return Err(helpers::mcp_err(
                ErrorCode::INVALID_REQUEST,
                "no business request result in this session; run a search first",
            ));
        };
        let context = SessionContext {
            metadata: result.metadata,
            total_count: result.total_count,
        };
        Ok(CallToolResult::success(vec![Content::json(context)?]))
    }
}

#[cfg(test)]
mod tests {
    use br_store::QueryParam;

    use super::*;
    use crate::testing;

    fn filter(name: &str, operator: Option<&str>, value: &str) -> FilterParam {
        FilterParam {
            name: name.to_string(),
            operator: operator.map(ToString::to_string),
            value: value.to_string(),
        }
    }

    #[test]
    fn params_apply_defaults() {
        let request = BrSearchRequest::try_from(SearchBusinessRequestsParams::default())
            .expect("defaults convert");
        assert_eq!(request.limit, Some(DEFAULT_LIMIT));
        assert!(request.active);
        assert!(request.filters.is_empty());
    }

    #[test]
    fn zero_limit_is_kept_as_no_cap() {
        let request = BrSearchRequest::try_from(SearchBusinessRequestsParams {
            limit: Some(0),
            ..SearchBusinessRequestsParams::default()
        })
        .expect("convert");
        assert_eq!(request.effective_limit(), None);
    }

    #[test]
    fn filter_operators_are_parsed() {
        let parsed = BrQueryFilter::try_from(filter("SUBMIT_DATE", Some(">="), "2024-01-01"))
            .expect("valid operator");
        assert_eq!(parsed.operator, FilterOperator::Ge);

        let err = BrQueryFilter::try_from(filter("SUBMIT_DATE", Some("; DROP"), "x"))
            .expect_err("operator outside the allow-list");
        assert_eq!(err, FilterError::InvalidOperator("; DROP".to_string()));
    }

    #[tokio::test]
    async fn context_requires_a_previous_search() {
        let server = testing::server(vec![testing::row(3, 12)]);
        let err = server
            .get_business_requests_context()
            .await
            .expect_err("nothing cached yet");
        assert_eq!(err.code, ErrorCode::INVALID_REQUEST);

        server
            .search_business_requests(Parameters(SearchBusinessRequestsParams {
                filters: Some(vec![filter("BR_SHORT_TITLE", None, "network")]),
                ..SearchBusinessRequestsParams::default()
            }))
            .await
            .expect("search");
        let cached = server.cached_result().await.expect("cached result");
        assert_eq!(cached.total_count, 12);
        assert_eq!(cached.metadata.limit, Some(DEFAULT_LIMIT));
        assert!(server.get_business_requests_context().await.is_ok());

        let params = server.control().executor().params.lock().expect("lock").clone();
        assert_eq!(
            params[0],
            vec![
                QueryParam::Text("%network%".to_string()),
                QueryParam::Int(i64::from(DEFAULT_LIMIT)),
            ]
        );
    }

    #[tokio::test]
    async fn bad_operator_is_invalid_params() {
        let server = testing::server(Vec::new());
        let err = server
            .search_business_requests(Parameters(SearchBusinessRequestsParams {
                filters: Some(vec![filter("CLOSED_DATE", Some("LIKE"), "2024-01-01")]),
                ..SearchBusinessRequestsParams::default()
            }))
            .await
            .expect_err("operator rejected");
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(server.cached_result().await.is_none());
    }

    #[tokio::test]
    async fn get_business_requests_requires_numbers() {
        let server = testing::server(Vec::new());
        let err = server
            .get_business_requests(Parameters(GetBusinessRequestsParams {
                br_numbers: Vec::new(),
                active: None,
            }))
            .await
            .expect_err("empty list rejected");
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }
}
