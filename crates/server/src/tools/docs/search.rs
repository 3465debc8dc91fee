//! docs_search tool implementation.
//!
//! Substring search over the active documents of one or all domains.

use docshelf_core::{AppConfig, DocStore};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{json_result, require_arg};

/// Characters of context kept on each side of the first match.
const SNIPPET_RADIUS: usize = 120;

/// Parameters for the docs_search tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DocsSearchParams {
    /// Text to look for (case-insensitive, matched literally).
    pub query: String,

    /// Restrict results to this domain.
    #[serde(default)]
    pub domain: Option<String>,

    /// Maximum number of results (defaults to the configured limit).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One search result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub url: String,
    pub domain: String,
    pub path: String,
    pub snippet: String,
    /// 1-indexed, most recently inserted first.
    pub rank: usize,
}

/// Output from the docs_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocsSearchOutput {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// Cut a window of `content` around the first case-insensitive match of `term`.
///
/// Falls back to the start of the content when lowercasing changes byte
/// offsets or the term is not found.
fn snippet(content: &str, term: &str) -> String {
    let lowered = content.to_lowercase();
    let start = match lowered.find(&term.to_lowercase()) {
        Some(pos) if lowered.len() == content.len() => pos,
        _ => 0,
    };

    let mut from = start.saturating_sub(SNIPPET_RADIUS);
    while !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (start + term.len() + SNIPPET_RADIUS).min(content.len());
    while !content.is_char_boundary(to) {
        to += 1;
    }

    let mut out = String::new();
    if from > 0 {
        out.push_str("...");
    }
    out.push_str(content[from..to].trim());
    if to < content.len() {
        out.push_str("...");
    }
    out
}

/// Implementation of the docs_search tool.
pub async fn search_impl(
    store: &DocStore, config: &AppConfig, params: DocsSearchParams,
) -> Result<CallToolResult, McpError> {
    require_arg("query", &params.query)?;
    if let Some(domain) = &params.domain {
        require_arg("domain", domain)?;
    }

    let limit = config.search_limit(params.limit);
    let docs = store.search(&params.query, params.domain.as_deref(), limit).await?;

    let results: Vec<SearchHit> = docs
        .into_iter()
        .enumerate()
        .map(|(i, doc)| SearchHit {
            snippet: snippet(&doc.content, &params.query),
            url: doc.url,
            domain: doc.domain,
            path: doc.path,
            rank: i + 1,
        })
        .collect();

    tracing::debug!(query = %params.query, domain = ?params.domain, limit, hits = results.len(), "searched documents");
    json_result(&DocsSearchOutput { query: params.query, results })
}
