//! docs_reset and docs_sweep tool implementations.

use docshelf_core::DocStore;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{json_result, require_arg};

/// Parameters for tools that act on a whole domain.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DomainParams {
    /// Domain to act on, e.g. "react.dev".
    pub domain: String,
}

/// Output from the docs_reset and docs_sweep tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeletedOutput {
    pub domain: String,
    /// Number of documents deleted.
    pub deleted: u64,
}

/// Delete every stored document of a domain.
pub async fn reset_impl(store: &DocStore, params: DomainParams) -> Result<CallToolResult, McpError> {
    require_arg("domain", &params.domain)?;
    let deleted = store.delete_domain(&params.domain).await?;
    json_result(&DeletedOutput { domain: params.domain, deleted })
}

/// Clean up after cancelled crawls of a domain.
///
/// Fails with a conflict error while a crawl of the domain is running.
pub async fn sweep_impl(store: &DocStore, params: DomainParams) -> Result<CallToolResult, McpError> {
    require_arg("domain", &params.domain)?;
    let deleted = store.sweep_abandoned(&params.domain).await?;
    json_result(&DeletedOutput { domain: params.domain, deleted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{output, seed};
    use docshelf_core::{CrawlPolicy, CrawledPage};
    use rmcp::model::ErrorCode;

    #[tokio::test]
    async fn test_reset_domain() {
        let store = DocStore::open_in_memory().await.unwrap();
        seed(&store, "example.com", &[("/page1", "one"), ("/page2", "two")]).await;
        seed(&store, "other.com", &[("/page", "other")]).await;

        let params = DomainParams { domain: "example.com".to_string() };
        let out: DeletedOutput = output(&reset_impl(&store, params).await.unwrap());
        assert_eq!(out.deleted, 2);
        assert_eq!(store.read_active("other.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_after_abort() {
        let store = DocStore::open_in_memory().await.unwrap();
        seed(&store, "example.com", &[("/page1", "one")]).await;

        let mut session = store.begin_crawl("example.com", CrawlPolicy::default()).await.unwrap();
        session
            .record(&CrawledPage::new("https://example.com/draft", "/draft", "draft"))
            .await
            .unwrap();
        session.abort().await.unwrap();

        let params = DomainParams { domain: "example.com".to_string() };
        let out: DeletedOutput = output(&sweep_impl(&store, params).await.unwrap());
        assert_eq!(out.deleted, 1);
        assert_eq!(store.read_active("example.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_during_crawl_conflicts() {
        let store = DocStore::open_in_memory().await.unwrap();
        let session = store.begin_crawl("example.com", CrawlPolicy::default()).await.unwrap();

        let params = DomainParams { domain: "example.com".to_string() };
        let err = sweep_impl(&store, params).await.unwrap_err();
        assert_eq!(err.code, ErrorCode(-32010));
        session.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_blank_domain() {
        let store = DocStore::open_in_memory().await.unwrap();
        let result = reset_impl(&store, DomainParams { domain: String::new() }).await;
        assert!(result.is_err());
    }
}
