//! Document MCP tools.
//!
//! Read access to the active generation of each domain, plus the two
//! maintenance operations agents may trigger.

pub mod active;
pub mod get;
pub mod maintenance;
pub mod search;

pub use active::{DocsActiveParams, active_impl};
pub use get::{DocsGetParams, get_impl};
pub use maintenance::{DomainParams, reset_impl, sweep_impl};
pub use search::{DocsSearchParams, search_impl};
