//! MCP server implementation for the business request service.
//!
//! This crate wires the control plane and file context into rmcp tool and
//! prompt handlers and exposes the stdio and streamable HTTP transports.

mod helpers;
mod prompts;
mod tools;
pub mod server;

use std::sync::Arc;

use br_core::control::BrControlPlane;
use br_core::services::FileContext;
use br_core::store::QueryExecutor;
use br_store::BrQueryResult;
use rmcp::{
    ErrorData,
    RoleServer,
    ServerHandler,
    handler::server::router::prompt::PromptRouter,
    handler::server::tool::ToolRouter,
    prompt_handler,
    service::RequestContext,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{
    CallToolResult,
    Content,
    GetPromptRequestParams,
    GetPromptResult,
    ListPromptsResult,
    PaginatedRequestParams,
    ServerCapabilities,
    ServerInfo,
};
use tokio::sync::RwLock;

pub use prompts::PromptArgs;
pub use tools::files::{SearchFilesParams, VectorizeFileParams};
pub use tools::search::{FilterParam, GetBusinessRequestsParams, SearchBusinessRequestsParams};

const SERVER_INSTRUCTIONS: &str = r"br-mcp answers questions about business requests (BRs) stored in the EDR data warehouse.

Workflow:
1. Call `list_search_fields` to see which fields can be filtered and which operators they accept,
   and `list_statuses` to map status names to status ids.
2. Search with `search_business_requests`:
   - `br_numbers`: restrict to specific BR numbers.
   - `statuses`: restrict to status ids.
   - `filters`: `{name, operator?, value}`. Text fields match by substring, date fields take
     `YYYY-MM-DD` and one of `=`, `<>`, `<`, `<=`, `>`, `>=`.
   - `limit`: row cap, default 100 (0 for no cap). `active`: only active BRs, default true.
3. Fetch known BRs directly with `get_business_requests`.
4. `get_business_requests_context` returns the metadata of the last result in this session.

Notes:
- Results include `TotalCount`, the number of matching BRs before the row cap.
- Unknown filter fields are ignored and reported in `metadata.dropped_filters`.
- `vectorize_file` uploads a base64 file into the shared context and `search_files` searches it.
- `health` returns `ok`.";

/// MCP server wrapper around the control plane, file context and session cache.
pub struct BrMcp<E: QueryExecutor> {
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
    control: BrControlPlane<E>,
    files: FileContext,
    last_result: Arc<RwLock<Option<BrQueryResult>>>,
}

impl<E: QueryExecutor> Clone for BrMcp<E> {
    fn clone(&self) -> Self {
        Self {
            tool_router: self.tool_router.clone(),
            prompt_router: self.prompt_router.clone(),
            control: self.control.clone(),
            files: self.files.clone(),
            last_result: self.last_result.clone(),
        }
    }
}

impl<E: QueryExecutor> BrMcp<E> {
    /// Creates a server with an empty session cache.
    #[must_use]
    pub fn new(control: BrControlPlane<E>, files: FileContext) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_search()
            + Self::tool_router_lookup()
            + Self::tool_router_files()
            + Self::tool_router_context();
        Self {
            tool_router,
            prompt_router: Self::prompt_router_br(),
            control,
            files,
            last_result: Arc::new(RwLock::new(None)),
        }
    }

    #[must_use]
    pub const fn control(&self) -> &BrControlPlane<E> {
        &self.control
    }

    #[must_use]
    pub const fn files(&self) -> &FileContext {
        &self.files
    }

    /// Last search result produced in this session.
    pub async fn cached_result(&self) -> Option<BrQueryResult> {
        self.last_result.read().await.clone()
    }

    pub(crate) async fn remember(&self, result: BrQueryResult) {
        *self.last_result.write().await = Some(result);
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
#[prompt_handler]
impl<E: QueryExecutor> ServerHandler for BrMcp<E> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use br_core::control::BrControlPlane;
    use br_core::services::{FileContext, FileContextConfig};
    use br_core::store::{QueryExecutor, StoreResult};
    use br_store::{QueryParam, Row};
    use serde_json::json;

    use crate::BrMcp;

    /// Executor returning canned rows and recording the bound parameters.
    #[derive(Default)]
    pub(crate) struct CannedExecutor {
        pub(crate) rows: Vec<Row>,
        pub(crate) params: Mutex<Vec<Vec<QueryParam>>>,
    }

    impl QueryExecutor for CannedExecutor {
        async fn execute(&self, _sql: &str, params: &[QueryParam]) -> StoreResult<Vec<Row>> {
            self.params.lock().expect("params lock").push(params.to_vec());
            Ok(self.rows.clone())
        }
    }

    pub(crate) fn row(number: i64, total: i64) -> Row {
        json!({ "BR_NMBR": number, "BR_SHORT_TITLE": "Network refresh", "TotalCount": total })
            .as_object()
            .cloned()
            .expect("row literal is an object")
    }

    pub(crate) fn server(rows: Vec<Row>) -> BrMcp<CannedExecutor> {
        let executor = CannedExecutor {
            rows,
            ..CannedExecutor::default()
        };
        BrMcp::new(
            BrControlPlane::new(executor),
            FileContext::new(FileContextConfig::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_enables_tools_and_prompts() {
        let info = testing::server(Vec::new()).get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.prompts.is_some());
        assert!(info.instructions.is_some_and(|text| text.contains("search_business_requests")));
    }

    #[tokio::test]
    async fn clones_share_session_cache() {
        let server = testing::server(vec![testing::row(1, 1)]);
        let clone = server.clone();
        assert!(clone.cached_result().await.is_none());

        let result = server
            .control()
            .get_business_requests(vec![1], true)
            .await
            .expect("lookup");
        server.remember(result).await;
        assert_eq!(clone.cached_result().await.map(|result| result.total_count), Some(1));
    }

    #[tokio::test]
    async fn separate_instances_do_not_share_cache() {
        let first = testing::server(vec![testing::row(1, 1)]);
        let second = BrMcp::new(first.control().clone(), first.files().clone());

        let result = first
            .control()
            .get_business_requests(vec![1], true)
            .await
            .expect("lookup");
        first.remember(result).await;
        assert!(second.cached_result().await.is_none());
    }
}
