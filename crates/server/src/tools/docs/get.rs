//! docs_get tool implementation.
//!
//! Retrieves a stored document by url.

use docshelf_core::{DocStore, Document};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{json_result, require_arg};

/// Parameters for the docs_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocsGetParams {
    /// Absolute url of the page.
    pub url: String,
}

/// Output from the docs_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocsGetOutput {
    pub url: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
}

/// Implementation of the docs_get tool.
///
/// A missing url is a normal result with `found: false`.
pub async fn get_impl(store: &DocStore, params: DocsGetParams) -> Result<CallToolResult, McpError> {
    require_arg("url", &params.url)?;

    let document = store.get_document_by_url(&params.url).await?;
    json_result(&DocsGetOutput { url: params.url, found: document.is_some(), document })
}
