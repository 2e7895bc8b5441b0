use br_core::store::QueryExecutor;
use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::BrMcp;

/// Payload listing the MCP commands of this server.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List the MCP commands of this server.".to_string(),
                "health - Returns 'ok'.".to_string(),
                "search_business_requests - Search BRs by numbers, status ids and field filters."
                    .to_string(),
                "get_business_requests - Fetch BRs by number without a row cap.".to_string(),
                "get_business_requests_context - Metadata of the last result in this session."
                    .to_string(),
                "list_search_fields - Fields accepted by filters, with kinds and operators."
                    .to_string(),
                "list_statuses - Status ids with English and French names.".to_string(),
                "vectorize_file - Upload a base64 file into the shared context.".to_string(),
                "search_files - Search the uploaded files for a term.".to_string(),
                "list_files - List the uploaded files.".to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[tool(description = "List the MCP commands to get context with how this MCP server works.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }
}
