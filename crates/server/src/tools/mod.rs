//! MCP tool implementations.
//!
//! This module contains all tools exposed by the docshelf server.

pub mod docs;
pub mod queries_search;

pub use docs::{DocsActiveParams, DocsGetParams, DocsSearchParams, DomainParams};
pub use queries_search::QueriesSearchParams;

use crate::error::ToolError;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Wrap a tool output as pretty-printed JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::SerializeFailed(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Reject blank string arguments.
pub(crate) fn require_arg(field: &str, value: &str) -> Result<(), McpError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidInput(format!("{field} must not be empty")).into());
    }
    Ok(())
}
