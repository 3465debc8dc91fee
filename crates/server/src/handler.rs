//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    DocsActiveParams, DocsGetParams, DocsSearchParams, DomainParams, QueriesSearchParams, docs,
    queries_search::queries_search_impl,
};
use docshelf_core::{AppConfig, DocStore};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for docshelf.
#[derive(Clone)]
pub struct DocshelfServer {
    tool_router: ToolRouter<Self>,
    store: DocStore,
    config: Arc<AppConfig>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl DocshelfServer {
    /// Create a new server handler over an opened store.
    pub fn new(store: DocStore, config: AppConfig) -> Self {
        Self { tool_router: Self::tool_router(), store, config: Arc::new(config) }
    }

    #[tool(description = "List the documentation pages visible for a domain, with the active crawl generation.")]
    async fn docs_active(&self, params: Parameters<DocsActiveParams>) -> Result<CallToolResult, McpError> {
        docs::active_impl(&self.store, params.0).await
    }

    /// Search stored documentation.
    ///
    /// Only pages of each domain's active generation are searched, so results
    /// never mix a finished crawl with one still in progress.
    #[tool(
        description = "Case-insensitive substring search over stored docs, optionally in one domain."
    )]
    async fn docs_search(&self, params: Parameters<DocsSearchParams>) -> Result<CallToolResult, McpError> {
        docs::search_impl(&self.store, &self.config, params.0).await
    }

    #[tool(description = "Get a stored documentation page by url. Returns found=false if the url was never stored.")]
    async fn docs_get(&self, params: Parameters<DocsGetParams>) -> Result<CallToolResult, McpError> {
        docs::get_impl(&self.store, params.0).await
    }

    #[tool(description = "Search previously answered questions. Returns query ids, previews, age in days and library.")]
    async fn queries_search(&self, params: Parameters<QueriesSearchParams>) -> Result<CallToolResult, McpError> {
        queries_search_impl(&self.store, &self.config, params.0).await
    }

    #[tool(description = "Delete every stored page of a domain. The next crawl starts from scratch.")]
    async fn docs_reset(&self, params: Parameters<DomainParams>) -> Result<CallToolResult, McpError> {
        docs::reset_impl(&self.store, params.0).await
    }

    #[tool(
        description = "Remove pages left by cancelled crawls of a domain. Fails while a crawl of the domain is running."
    )]
    async fn docs_sweep(&self, params: Parameters<DomainParams>) -> Result<CallToolResult, McpError> {
        docs::sweep_impl(&self.store, params.0).await
    }
}

impl ServerHandler for DocshelfServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "docshelf".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
