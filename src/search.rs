//! Fan-out search — one query across heterogeneous index groups.
//!
//! Each requested group resolves to the concrete collections in scope (a
//! group may span several physical indexes, e.g. session + long-term memory
//! under `memory`), queries them concurrently, and merges into one ranked
//! list per group: score descending, ties broken by most recent
//! `created_at`/`indexed_at`. Groups run concurrently under a per-group
//! deadline; a failed or timed-out group yields an empty list plus an error
//! marker and never blocks the other groups.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::index::{DocumentIndex, ScoredDoc};
use crate::scope::{derive_index_name, index_prefix, Domain, ScopeKey};

/// A logical search target spanning one or more physical domains.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IndexGroup {
    /// Session + long-term conversational memory.
    Memory,
    /// Agent decision records.
    Decisions,
    /// Declared-state + live resource inventory.
    Inventory,
    /// Free-form tenant knowledge.
    General,
}

impl IndexGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Decisions => "decisions",
            Self::Inventory => "inventory",
            Self::General => "general",
        }
    }

    /// The physical domains this group spans.
    pub fn domains(&self) -> &'static [Domain] {
        match self {
            Self::Memory => &[Domain::MemorySession, Domain::MemoryLongterm],
            Self::Decisions => &[Domain::Decisions],
            Self::Inventory => &[Domain::InventoryState, Domain::InventoryLive],
            Self::General => &[Domain::General],
        }
    }
}

impl std::fmt::Display for IndexGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One merged hit within a group's ranked list.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub score: f64,
}

/// A group's ranked results, or its error marker when the group failed.
#[derive(Debug, Default, Serialize)]
pub struct GroupResults {
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a group member resolves to physical collections.
#[derive(Debug, Clone)]
enum CollectionSelector {
    /// Fully specified scope: address the one derived collection directly.
    Exact(String),
    /// Partial scope: list everything under the delimiter-terminated prefix.
    Prefix(String),
}

/// Recency for tie-breaking, from `created_at` then `indexed_at` metadata.
fn hit_timestamp(metadata: &Map<String, Value>) -> DateTime<Utc> {
    ["created_at", "indexed_at"]
        .iter()
        .find_map(|key| {
            metadata
                .get(*key)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Merge per-index hit lists into one ranked list capped at `top_k`.
fn merge_ranked(mut hits: Vec<ScoredDoc>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| hit_timestamp(&b.metadata).cmp(&hit_timestamp(&a.metadata)))
    });
    hits.truncate(top_k);
    hits.into_iter()
        .map(|doc| SearchHit {
            id: doc.id,
            content: doc.text,
            metadata: doc.metadata,
            score: doc.score,
        })
        .collect()
}

/// Fans one query out across groups and merges ranked results.
#[derive(Clone)]
pub struct SearchCoordinator {
    index: Arc<dyn DocumentIndex>,
    group_timeout: Duration,
}

impl SearchCoordinator {
    pub fn new(index: Arc<dyn DocumentIndex>, group_timeout: Duration) -> Self {
        Self {
            index,
            group_timeout,
        }
    }

    /// Search every requested group concurrently.
    ///
    /// Scope-key validation happens up front for all groups — a scope
    /// violation aborts the whole operation before any store I/O. After
    /// that, failures stay contained to their group.
    pub async fn search(
        &self,
        query: &str,
        scope: &ScopeKey,
        groups: &[IndexGroup],
        top_k_per_group: usize,
    ) -> Result<BTreeMap<IndexGroup, GroupResults>> {
        // Pre-derive every selector so ScopeViolation is fatal before I/O.
        let mut selectors: Vec<(IndexGroup, Vec<CollectionSelector>)> =
            Vec::with_capacity(groups.len());
        for group in groups {
            let domain_selectors = group
                .domains()
                .iter()
                .map(|domain| {
                    if scope.is_fully_specified() {
                        derive_index_name(*domain, scope).map(CollectionSelector::Exact)
                    } else {
                        index_prefix(*domain, scope).map(CollectionSelector::Prefix)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            selectors.push((*group, domain_selectors));
        }

        let tasks = selectors.into_iter().map(|(group, domain_selectors)| {
            let run = self.search_group(query, domain_selectors, top_k_per_group);
            async move {
                match tokio::time::timeout(self.group_timeout, run).await {
                    Ok(Ok(hits)) => (group, GroupResults { hits, error: None }),
                    Ok(Err(e)) => (
                        group,
                        GroupResults {
                            hits: Vec::new(),
                            error: Some(e.to_string()),
                        },
                    ),
                    Err(_) => (
                        group,
                        GroupResults {
                            hits: Vec::new(),
                            error: Some(
                                Error::GroupTimeout {
                                    group: group.as_str().into(),
                                    timeout_ms: self.group_timeout.as_millis() as u64,
                                }
                                .to_string(),
                            ),
                        },
                    ),
                }
            }
        });

        Ok(join_all(tasks).await.into_iter().collect())
    }

    /// Convenience wrapper for the single-group path.
    pub async fn search_group_scoped(
        &self,
        query: &str,
        scope: &ScopeKey,
        group: IndexGroup,
        top_k: usize,
    ) -> Result<GroupResults> {
        let mut results = self.search(query, scope, &[group], top_k).await?;
        Ok(results.remove(&group).unwrap_or_default())
    }

    /// Query every collection the group's selectors resolve to, concurrently,
    /// and merge into one ranked list.
    async fn search_group(
        &self,
        query: &str,
        domain_selectors: Vec<CollectionSelector>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut collections = Vec::new();
        for selector in &domain_selectors {
            match selector {
                CollectionSelector::Exact(name) => collections.push(name.clone()),
                CollectionSelector::Prefix(prefix) => {
                    collections.extend(self.index.list_collections(prefix).await?);
                }
            }
        }

        let queries = collections
            .iter()
            .map(|collection| self.index.query(collection, query, None, top_k));
        let mut all_hits = Vec::new();
        for outcome in join_all(queries).await {
            all_hits.extend(outcome?);
        }

        Ok(merge_ranked(all_hits, top_k))
    }
}
