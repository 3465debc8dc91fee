//! Structured errors for the docshelf server.
//!
//! Store errors convert into MCP errors in `docshelf-core`; these cover
//! failures that only exist at the tool boundary.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Errors raised by tool handlers themselves.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool arguments (e.g., empty query).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be encoded.
    #[error("SERIALIZE_FAILED: {0}")]
    SerializeFailed(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::SerializeFailed(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_codes() {
        let err: McpError = ToolError::InvalidInput("query must not be empty".into()).into();
        assert_eq!(err.code, ErrorCode(-32602));
        assert_eq!(err.message, "query must not be empty");

        let err: McpError = ToolError::SerializeFailed("bad".into()).into();
        assert_eq!(err.code, ErrorCode(-32603));
    }
}
