//! Document-index collaborator contract.
//!
//! The embedding/document store is external to the core: Stratus depends only
//! on the upsert/query contract defined by [`DocumentIndex`], never on store
//! internals. Collections are named by [`crate::scope::derive_index_name`];
//! a backend must keep distinct collections physically separate.
//!
//! [`memory::InMemoryIndex`] ships as a deterministic in-process backend for
//! development and tests.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A stored (text, metadata) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// A query hit with its relevance score (higher is more relevant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    pub score: f64,
}

/// Exact-match metadata filter: every `(key, value)` pair must match.
pub type MetadataFilter = Map<String, Value>;

/// The store contract the core consumes.
///
/// Querying or scanning a collection that does not exist returns an empty
/// result, not an error; `upsert` creates collections implicitly.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Backend name (e.g. "in-memory").
    fn backend(&self) -> &str;

    /// Insert or replace a document by id.
    async fn upsert(&self, collection: &str, doc: Document) -> Result<()>;

    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Nearest-neighbour query by text relevance, best first.
    async fn query(
        &self,
        collection: &str,
        text: &str,
        filter: Option<&MetadataFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredDoc>>;

    /// Enumerate documents matching a filter, unranked.
    async fn scan(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<Document>>;

    /// Replace a document's metadata in place. Returns false when absent.
    async fn update_metadata(
        &self,
        collection: &str,
        id: &str,
        metadata: Map<String, Value>,
    ) -> Result<bool>;

    /// Delete a document by id. Returns false when absent.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Drop a whole collection. Returns false when absent.
    async fn delete_collection(&self, collection: &str) -> Result<bool>;

    /// List collection names starting with `prefix` (empty prefix: all).
    async fn list_collections(&self, prefix: &str) -> Result<Vec<String>>;

    /// Document count for a collection (0 when absent).
    async fn count(&self, collection: &str) -> Result<usize>;
}

/// True when every filter pair matches the document metadata exactly.
pub(crate) fn matches_filter(metadata: &Map<String, Value>, filter: Option<&MetadataFilter>) -> bool {
    match filter {
        None => true,
        Some(filter) => filter
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected)),
    }
}
