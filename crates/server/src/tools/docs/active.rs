//! docs_active tool implementation.
//!
//! Lists the documents currently visible for a domain.

use docshelf_core::{DocStore, Document, Generation};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{json_result, require_arg};

/// Parameters for the docs_active tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocsActiveParams {
    /// Domain to list, e.g. "react.dev".
    pub domain: String,

    /// Include full page content in the listing.
    #[serde(default)]
    pub include_content: bool,
}

/// One visible page.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActivePage {
    pub url: String,
    pub path: String,
    pub content_hash: String,
    pub content_refreshed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Output from the docs_active tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocsActiveOutput {
    pub domain: String,
    /// The active generation, absent if the domain was never crawled.
    pub generation: Option<Generation>,
    pub count: usize,
    pub pages: Vec<ActivePage>,
}

fn to_page(doc: Document, include_content: bool) -> ActivePage {
    ActivePage {
        url: doc.url,
        path: doc.path,
        content_hash: doc.content_hash,
        content_refreshed_at: doc.content_refreshed_at,
        content: include_content.then_some(doc.content),
    }
}

/// Implementation of the docs_active tool.
pub async fn active_impl(store: &DocStore, params: DocsActiveParams) -> Result<CallToolResult, McpError> {
    require_arg("domain", &params.domain)?;

    let generation = store.active_generation(&params.domain).await?;
    let pages: Vec<ActivePage> = store
        .read_active(&params.domain)
        .await?
        .into_iter()
        .map(|doc| to_page(doc, params.include_content))
        .collect();

    tracing::debug!(domain = %params.domain, count = pages.len(), "listed active documents");
    json_result(&DocsActiveOutput { domain: params.domain, generation, count: pages.len(), pages })
}
