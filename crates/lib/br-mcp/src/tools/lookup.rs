use br_core::store::QueryExecutor;
use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    tool,
    tool_router,
};
use serde::Serialize;

use crate::{BrMcp, helpers};

#[derive(Debug, Serialize)]
struct StatusList {
    statuses: Vec<br_store::Row>,
}

#[tool_router(router = tool_router_lookup, vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[tool(description = "List the fields accepted by search filters, with their kind (text or date) and supported operators.")]
    async fn list_search_fields(&self) -> Result<CallToolResult, ErrorData> {
        let fields = self.control.search_fields();
        Ok(CallToolResult::success(vec![Content::json(fields)?]))
    }

    #[tool(description = "List business request statuses (id, English and French names, active flag).")]
    async fn list_statuses(&self) -> Result<CallToolResult, ErrorData> {
        let statuses = self
            .control
            .list_statuses()
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(StatusList { statuses })?]))
    }
}
