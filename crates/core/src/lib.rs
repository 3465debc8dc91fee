//! Core types and shared functionality for docshelf.
//!
//! This crate provides:
//! - A generational document store with SQLite backend
//! - Crawl sessions that swap a domain's documents atomically
//! - Unified error types
//! - Configuration loading and validation

pub mod config;
pub mod crawl;
pub mod error;
pub mod store;

pub use config::AppConfig;
pub use crawl::{CrawlPolicy, CrawlReport, CrawlSession, CrawledPage};
pub use error::Error;
pub use store::{DocStore, Document, Generation, GenerationId, GenerationStatus, UpsertOutcome};
