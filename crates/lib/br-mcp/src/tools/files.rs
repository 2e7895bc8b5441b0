use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use br_core::services::FileSearch;
use br_core::store::QueryExecutor;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ErrorCode},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{BrMcp, helpers};

fn default_filename() -> String {
    "uploaded_file".to_string()
}

/// Parameters for uploading a file into the shared context.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct VectorizeFileParams {
    /// File content, base64 encoded.
    pub file_content: String,
    #[serde(default = "default_filename")]
    pub filename: String,
}

/// Parameters for searching the uploaded files.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchFilesParams {
    pub term: String,
}

fn search_message(term: &str, search: &FileSearch) -> String {
    match search {
        FileSearch::NoFiles => "No files available in context.".to_string(),
        FileSearch::Matches(indexes) if indexes.is_empty() => {
            format!("No occurrences of '{term}' found in context files.")
        }
        FileSearch::Matches(indexes) => indexes
            .iter()
            .map(|index| format!("Found '{term}' in file {index}"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[tool_router(router = tool_router_files, vis = "pub")]
impl<E: QueryExecutor> BrMcp<E> {
    #[tool(description = "Upload a file (base64 content) to the server context for RAG operations.")]
    async fn vectorize_file(
        &self,
        Parameters(params): Parameters<VectorizeFileParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let content = STANDARD
            .decode(params.file_content.trim())
            .map_err(|err| {
                helpers::mcp_err(
                    ErrorCode::INVALID_PARAMS,
                    format!("file_content is not valid base64: {err}"),
                )
            })?;
        let receipt = self
            .files
            .add(&params.filename, content)
            .await
            .map_err(|err| helpers::mcp_err(ErrorCode::INVALID_PARAMS, err.to_string()))?;
        if let Some(evicted) = &receipt.evicted {
            info!(%evicted, "file context full, evicted oldest file");
        }
        info!(filename = %receipt.filename, size = receipt.size, "file stored in context");

        Ok(CallToolResult::success(vec![Content::text(format!(
            "File '{}' ({} bytes) successfully received and ready for vectorization.",
            receipt.filename, receipt.size
        ))]))
    }

    #[tool(description = "Search context files for a specific term.")]
    async fn search_files(
        &self,
        Parameters(params): Parameters<SearchFilesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let search = self.files.search(&params.term).await;
        Ok(CallToolResult::success(vec![Content::text(search_message(
            &params.term,
            &search,
        ))]))
    }

    #[tool(description = "List the files currently held in the context.")]
    async fn list_files(&self) -> Result<CallToolResult, ErrorData> {
        let files = self.files.list().await;
        Ok(CallToolResult::success(vec![Content::json(files)?]))
    }
}
