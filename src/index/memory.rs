//! In-process document index — deterministic backend for development and
//! tests. Relevance is lexical: cosine over the token sets of query and
//! document text, so ranking is reproducible without an embedding model.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{matches_filter, Document, DocumentIndex, MetadataFilter, ScoredDoc};
use crate::error::Result;

type Collection = BTreeMap<String, Document>;

/// A [`DocumentIndex`] holding everything in a `RwLock`ed map.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Cosine similarity over token sets, in `[0, 1]`.
fn lexical_score(query: &HashSet<String>, doc_text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let doc = tokenize(doc_text);
    if doc.is_empty() {
        return 0.0;
    }
    let overlap = query.intersection(&doc).count();
    overlap as f64 / ((query.len() as f64).sqrt() * (doc.len() as f64).sqrt())
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    fn backend(&self) -> &str {
        "in-memory"
    }

    async fn upsert(&self, collection: &str, doc: Document) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn query(
        &self,
        collection: &str,
        text: &str,
        filter: Option<&MetadataFilter>,
        top_k: usize,
    ) -> Result<Vec<ScoredDoc>> {
        let query_tokens = tokenize(text);
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<ScoredDoc> = docs
            .values()
            .filter(|doc| matches_filter(&doc.metadata, filter))
            .map(|doc| ScoredDoc {
                id: doc.id.clone(),
                text: doc.text.clone(),
                metadata: doc.metadata.clone(),
                score: lexical_score(&query_tokens, &doc.text),
            })
            .collect();

        // Score descending, id ascending for a stable order under ties.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn scan(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .values()
            .filter(|doc| matches_filter(&doc.metadata, filter))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_metadata(
        &self,
        collection: &str,
        id: &str,
        metadata: Map<String, Value>,
    ) -> Result<bool> {
        let mut collections = self.collections.write().await;
        match collections.get_mut(collection).and_then(|c| c.get_mut(id)) {
            Some(doc) => {
                doc.metadata = metadata;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .is_some_and(|c| c.remove(id).is_some()))
    }

    async fn delete_collection(&self, collection: &str) -> Result<bool> {
        let mut collections = self.collections.write().await;
        Ok(collections.remove(collection).is_some())
    }

    async fn list_collections(&self, prefix: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, Collection::len))
    }
}
