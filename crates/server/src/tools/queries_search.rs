//! queries_search tool implementation.
//!
//! Looks up previously answered questions in the query log so an agent can
//! reuse an answer instead of researching it again.

use docshelf_core::store::CacheHit;
use docshelf_core::{AppConfig, DocStore};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{json_result, require_arg};

/// Parameters for the queries_search tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueriesSearchParams {
    /// Text to look for in logged queries (case-insensitive).
    pub query: String,

    /// Maximum number of hits (defaults to the configured limit).
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Output from the queries_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueriesSearchOutput {
    pub query: String,
    pub hits: Vec<CacheHit>,
}

/// Implementation of the queries_search tool.
pub async fn queries_search_impl(
    store: &DocStore, config: &AppConfig, params: QueriesSearchParams,
) -> Result<CallToolResult, McpError> {
    require_arg("query", &params.query)?;

    let hits = store
        .search_queries(&params.query, config.search_limit(params.limit))
        .await?;
    json_result(&QueriesSearchOutput { query: params.query, hits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::output;
    use docshelf_core::store::NewQuery;

    #[tokio::test]
    async fn test_queries_search_finds_logged_question() {
        let store = DocStore::open_in_memory().await.unwrap();
        store
            .save_query(NewQuery {
                query: "How do I use useEffect cleanup?".into(),
                output: "Return a function from the effect.".into(),
                library: Some("react".into()),
                version: Some("19".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .save_query(NewQuery { query: "Vue computed props".into(), output: "...".into(), ..Default::default() })
            .await
            .unwrap();

        let params = QueriesSearchParams { query: "USEEFFECT".into(), limit: None };
        let out: QueriesSearchOutput =
            output(&queries_search_impl(&store, &AppConfig::default(), params).await.unwrap());

        assert_eq!(out.hits.len(), 1);
        assert_eq!(out.hits[0].library.as_deref(), Some("react"));
        assert_eq!(out.hits[0].age_days, 0);
    }

    #[tokio::test]
    async fn test_queries_search_empty_query() {
        let store = DocStore::open_in_memory().await.unwrap();
        let result = queries_search_impl(&store, &AppConfig::default(), QueriesSearchParams::default()).await;
        assert!(result.is_err());
    }
}
