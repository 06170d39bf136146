//! Memory lifecycle — session/long-term memories and agent decisions.
//!
//! Session and long-term memories live in physically separate indexes;
//! promotion is a move (delete + re-insert), never an in-place type change.
//! `accessed_at`/`access_count` bump on every direct get and every search
//! hit, never on store. Decisions are immutable once created; their
//! searchable content is context + reasoning + outcome.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::{Document, DocumentIndex};
use crate::scope::{derive_index_name, Domain, ScopeKey, ScopeLocks};
use crate::search::{IndexGroup, SearchCoordinator};

/// Separator between the three decision text parts in indexed content.
const DECISION_SEPARATOR: &str = "\n---\n";

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Scoped to one conversation; candidate for promotion or cleanup.
    Session,
    /// Retained across sessions.
    Longterm,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Longterm => "longterm",
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::Session => Domain::MemorySession,
            Self::Longterm => Domain::MemoryLongterm,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "session" => Ok(Self::Session),
            "longterm" => Ok(Self::Longterm),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub memory_id: String,
    pub content: String,
    pub memory_type: MemoryType,
    /// In `[0.0, 1.0]`; drives cleanup retention.
    pub importance_score: f64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u32,
}

#[derive(Debug, Serialize)]
pub struct MemoryHit {
    pub memory: MemoryEntry,
    pub score: f64,
}

/// An immutable agent decision record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision_id: String,
    pub session_id: String,
    pub decision_type: String,
    pub context_text: String,
    pub reasoning_text: String,
    pub outcome_text: String,
    pub confidence_score: f64,
    pub related_resource_types: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DecisionHit {
    pub decision: Decision,
    pub score: f64,
}

/// Filters for memory search, applied after the ranked merge.
#[derive(Debug, Default)]
pub struct MemoryFilter {
    pub session_id: Option<String>,
    pub min_importance: f64,
    pub tags: Vec<String>,
}

/// Filters for decision search.
#[derive(Debug, Default)]
pub struct DecisionFilter {
    pub decision_type: Option<String>,
    pub session_id: Option<String>,
    pub min_confidence: f64,
}

// ── Metadata round-trips ──────────────────────────────────────────────────────

fn tags_value(tags: &[String]) -> Value {
    Value::Array(tags.iter().map(|t| Value::String(t.clone())).collect())
}

fn tags_from(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn timestamp_from(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn memory_metadata(memory: &MemoryEntry) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("memory_id".into(), memory.memory_id.clone().into());
    meta.insert("memory_type".into(), memory.memory_type.as_str().into());
    meta.insert("importance_score".into(), memory.importance_score.into());
    meta.insert("tags".into(), tags_value(&memory.tags));
    meta.insert(
        "session_id".into(),
        memory.session_id.clone().unwrap_or_default().into(),
    );
    meta.insert("created_at".into(), memory.created_at.to_rfc3339().into());
    meta.insert("accessed_at".into(), memory.accessed_at.to_rfc3339().into());
    meta.insert("access_count".into(), memory.access_count.into());
    meta
}

fn memory_from_parts(content: &str, metadata: &Map<String, Value>) -> Result<MemoryEntry> {
    let memory_type = metadata
        .get("memory_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse::<MemoryType>()
        .map_err(Error::normalization)?;
    Ok(MemoryEntry {
        memory_id: metadata
            .get("memory_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        content: content.to_string(),
        memory_type,
        importance_score: metadata
            .get("importance_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.5),
        tags: tags_from(metadata.get("tags")),
        session_id: metadata
            .get("session_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        created_at: timestamp_from(metadata.get("created_at")),
        accessed_at: timestamp_from(metadata.get("accessed_at")),
        access_count: metadata
            .get("access_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    })
}

fn decision_metadata(decision: &Decision) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("decision_id".into(), decision.decision_id.clone().into());
    meta.insert("session_id".into(), decision.session_id.clone().into());
    meta.insert("decision_type".into(), decision.decision_type.clone().into());
    meta.insert("confidence_score".into(), decision.confidence_score.into());
    meta.insert(
        "related_resource_types".into(),
        tags_value(&decision.related_resource_types),
    );
    meta.insert("tags".into(), tags_value(&decision.tags));
    meta.insert("created_at".into(), decision.created_at.to_rfc3339().into());
    meta
}

pub(crate) fn decision_from_parts(content: &str, metadata: &Map<String, Value>) -> Decision {
    let mut parts = content.splitn(3, DECISION_SEPARATOR);
    let context_text = parts.next().unwrap_or_default().to_string();
    let reasoning_text = parts.next().unwrap_or_default().to_string();
    let outcome_text = parts.next().unwrap_or_default().to_string();
    let get = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Decision {
        decision_id: get("decision_id"),
        session_id: get("session_id"),
        decision_type: get("decision_type"),
        context_text,
        reasoning_text,
        outcome_text,
        confidence_score: metadata
            .get("confidence_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.5),
        related_resource_types: tags_from(metadata.get("related_resource_types")),
        tags: tags_from(metadata.get("tags")),
        created_at: timestamp_from(metadata.get("created_at")),
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Lifecycle operations over the memory and decision indexes.
#[derive(Clone)]
pub struct MemoryService {
    index: Arc<dyn DocumentIndex>,
    coordinator: SearchCoordinator,
    locks: ScopeLocks,
}

impl MemoryService {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        coordinator: SearchCoordinator,
        locks: ScopeLocks,
    ) -> Self {
        Self {
            index,
            coordinator,
            locks,
        }
    }

    /// Store a new memory. Access metadata starts untouched.
    pub async fn store(
        &self,
        scope: &ScopeKey,
        content: &str,
        memory_type: MemoryType,
        session_id: Option<String>,
        importance_score: f64,
        tags: Vec<String>,
    ) -> Result<MemoryEntry> {
        let collection = derive_index_name(memory_type.domain(), scope)?;
        let now = Utc::now();
        let memory = MemoryEntry {
            memory_id: Uuid::now_v7().to_string(),
            content: content.to_string(),
            memory_type,
            importance_score,
            tags,
            session_id,
            created_at: now,
            accessed_at: now,
            access_count: 0,
        };

        self.index
            .upsert(
                &collection,
                Document {
                    id: memory.memory_id.clone(),
                    text: memory.content.clone(),
                    metadata: memory_metadata(&memory),
                },
            )
            .await?;
        Ok(memory)
    }

    /// Locate a memory across the type indexes without touching access
    /// metadata. Returns the entry and its collection.
    async fn find(
        &self,
        scope: &ScopeKey,
        memory_id: &str,
        type_hint: Option<MemoryType>,
    ) -> Result<Option<(MemoryEntry, String)>> {
        let types: &[MemoryType] = match type_hint {
            Some(MemoryType::Session) => &[MemoryType::Session],
            Some(MemoryType::Longterm) => &[MemoryType::Longterm],
            None => &[MemoryType::Session, MemoryType::Longterm],
        };
        for memory_type in types {
            let collection = derive_index_name(memory_type.domain(), scope)?;
            if let Some(doc) = self.index.get(&collection, memory_id).await? {
                return Ok(Some((memory_from_parts(&doc.text, &doc.metadata)?, collection)));
            }
        }
        Ok(None)
    }

    /// Direct lookup; bumps `accessed_at` and `access_count` on a hit.
    pub async fn get(
        &self,
        scope: &ScopeKey,
        memory_id: &str,
        type_hint: Option<MemoryType>,
    ) -> Result<Option<MemoryEntry>> {
        let Some((mut memory, collection)) = self.find(scope, memory_id, type_hint).await? else {
            return Ok(None);
        };
        memory.accessed_at = Utc::now();
        memory.access_count += 1;
        self.index
            .update_metadata(&collection, memory_id, memory_metadata(&memory))
            .await?;
        Ok(Some(memory))
    }

    /// Ranked memory search through the fan-out coordinator's single-group
    /// path, with post-merge filters. Returned hits get an access bump.
    pub async fn search(
        &self,
        scope: &ScopeKey,
        query: &str,
        filter: &MemoryFilter,
        top_k: usize,
    ) -> Result<Vec<MemoryHit>> {
        let group = self
            .coordinator
            .search_group_scoped(query, scope, IndexGroup::Memory, top_k)
            .await?;
        if let Some(error) = group.error {
            return Err(Error::Store(error));
        }

        let mut hits = Vec::new();
        for hit in group.hits {
            let memory = memory_from_parts(&hit.content, &hit.metadata)?;
            if let Some(session_id) = &filter.session_id {
                if memory.memory_type == MemoryType::Session
                    && memory.session_id.as_deref() != Some(session_id)
                {
                    continue;
                }
            }
            if memory.importance_score < filter.min_importance {
                continue;
            }
            if !filter.tags.is_empty() && !filter.tags.iter().any(|t| memory.tags.contains(t)) {
                continue;
            }
            hits.push(MemoryHit {
                memory,
                score: hit.score,
            });
        }

        // Access tracking for everything returned.
        let now = Utc::now();
        for hit in &mut hits {
            hit.memory.accessed_at = now;
            hit.memory.access_count += 1;
            let collection = derive_index_name(hit.memory.memory_type.domain(), scope)?;
            self.index
                .update_metadata(&collection, &hit.memory.memory_id, memory_metadata(&hit.memory))
                .await?;
        }
        Ok(hits)
    }

    /// Move a session memory to the long-term index, preserving id, tags,
    /// and content, stamping `promoted_at`.
    pub async fn promote(&self, scope: &ScopeKey, memory_id: &str) -> Result<MemoryEntry> {
        let session_collection = derive_index_name(Domain::MemorySession, scope)?;
        let longterm_collection = derive_index_name(Domain::MemoryLongterm, scope)?;

        let lock = self.locks.lock_for(&session_collection);
        let _guard = lock.lock().await;

        let doc = self
            .index
            .get(&session_collection, memory_id)
            .await?
            .ok_or_else(|| Error::not_found("memory", memory_id))?;
        let mut memory = memory_from_parts(&doc.text, &doc.metadata)?;
        memory.memory_type = MemoryType::Longterm;

        let mut metadata = memory_metadata(&memory);
        metadata.insert("promoted_at".into(), Utc::now().to_rfc3339().into());

        self.index
            .upsert(
                &longterm_collection,
                Document {
                    id: memory.memory_id.clone(),
                    text: memory.content.clone(),
                    metadata,
                },
            )
            .await?;
        self.index.delete(&session_collection, memory_id).await?;
        Ok(memory)
    }

    /// In-place importance update, re-indexed so searches see the new score.
    pub async fn update_importance(
        &self,
        scope: &ScopeKey,
        memory_id: &str,
        importance_score: f64,
        type_hint: Option<MemoryType>,
    ) -> Result<bool> {
        let Some((mut memory, collection)) = self.find(scope, memory_id, type_hint).await? else {
            return Ok(false);
        };
        memory.importance_score = importance_score;
        self.index
            .update_metadata(&collection, memory_id, memory_metadata(&memory))
            .await
    }

    pub async fn delete(
        &self,
        scope: &ScopeKey,
        memory_id: &str,
        type_hint: Option<MemoryType>,
    ) -> Result<bool> {
        let Some((_, collection)) = self.find(scope, memory_id, type_hint).await? else {
            return Ok(false);
        };
        self.index.delete(&collection, memory_id).await
    }

    /// Delete a session's SESSION memories; with `keep_important`, entries
    /// at or above the threshold stay. Returns the count deleted.
    pub async fn cleanup_session(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        keep_important: bool,
        importance_threshold: f64,
    ) -> Result<usize> {
        let collection = derive_index_name(Domain::MemorySession, scope)?;
        let lock = self.locks.lock_for(&collection);
        let _guard = lock.lock().await;

        let mut filter = Map::new();
        filter.insert("session_id".into(), Value::String(session_id.into()));
        let docs = self.index.scan(&collection, Some(&filter), usize::MAX).await?;

        let mut deleted = 0;
        for doc in docs {
            let memory = memory_from_parts(&doc.text, &doc.metadata)?;
            if keep_important && memory.importance_score >= importance_threshold {
                continue;
            }
            if self.index.delete(&collection, &memory.memory_id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // ── Decisions ─────────────────────────────────────────────────────────────

    /// Record an immutable agent decision.
    #[allow(clippy::too_many_arguments)]
    pub async fn store_decision(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        decision_type: &str,
        context_text: &str,
        reasoning_text: &str,
        outcome_text: &str,
        confidence_score: f64,
        related_resource_types: Vec<String>,
        tags: Vec<String>,
    ) -> Result<Decision> {
        let collection = derive_index_name(Domain::Decisions, scope)?;
        let decision = Decision {
            decision_id: Uuid::now_v7().to_string(),
            session_id: session_id.to_string(),
            decision_type: decision_type.to_string(),
            context_text: context_text.to_string(),
            reasoning_text: reasoning_text.to_string(),
            outcome_text: outcome_text.to_string(),
            confidence_score,
            related_resource_types,
            tags,
            created_at: Utc::now(),
        };

        let content = format!(
            "{}{sep}{}{sep}{}",
            decision.context_text,
            decision.reasoning_text,
            decision.outcome_text,
            sep = DECISION_SEPARATOR
        );
        self.index
            .upsert(
                &collection,
                Document {
                    id: decision.decision_id.clone(),
                    text: content,
                    metadata: decision_metadata(&decision),
                },
            )
            .await?;
        Ok(decision)
    }

    pub async fn get_decision(
        &self,
        scope: &ScopeKey,
        decision_id: &str,
    ) -> Result<Option<Decision>> {
        let collection = derive_index_name(Domain::Decisions, scope)?;
        Ok(self
            .index
            .get(&collection, decision_id)
            .await?
            .map(|doc| decision_from_parts(&doc.text, &doc.metadata)))
    }

    /// Ranked decision search with post-merge filters.
    pub async fn search_decisions(
        &self,
        scope: &ScopeKey,
        query: &str,
        filter: &DecisionFilter,
        top_k: usize,
    ) -> Result<Vec<DecisionHit>> {
        let group = self
            .coordinator
            .search_group_scoped(query, scope, IndexGroup::Decisions, top_k)
            .await?;
        if let Some(error) = group.error {
            return Err(Error::Store(error));
        }

        Ok(group
            .hits
            .into_iter()
            .map(|hit| {
                let decision = decision_from_parts(&hit.content, &hit.metadata);
                DecisionHit {
                    decision,
                    score: hit.score,
                }
            })
            .filter(|hit| {
                filter
                    .decision_type
                    .as_deref()
                    .is_none_or(|t| hit.decision.decision_type == t)
                    && filter
                        .session_id
                        .as_deref()
                        .is_none_or(|s| hit.decision.session_id == s)
                    && hit.decision.confidence_score >= filter.min_confidence
            })
            .collect())
    }

    /// Decisions whose `related_resource_types` name the given type.
    pub async fn decisions_for_resource_type(
        &self,
        scope: &ScopeKey,
        resource_type: &str,
        top_k: usize,
    ) -> Result<Vec<Decision>> {
        let hits = self
            .search_decisions(scope, resource_type, &DecisionFilter::default(), top_k)
            .await?;
        Ok(hits
            .into_iter()
            .filter(|hit| {
                hit.decision
                    .related_resource_types
                    .iter()
                    .any(|t| t == resource_type)
            })
            .map(|hit| hit.decision)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use std::time::Duration;

    fn scope() -> ScopeKey {
        ScopeKey::tenant("acme")
    }

    fn service() -> MemoryService {
        let index: Arc<dyn DocumentIndex> = Arc::new(InMemoryIndex::new());
        let coordinator = SearchCoordinator::new(index.clone(), Duration::from_millis(500));
        MemoryService::new(index, coordinator, ScopeLocks::new())
    }

    #[tokio::test]
    async fn store_does_not_touch_access_metadata() {
        let svc = service();
        let memory = svc
            .store(&scope(), "replica lag fix", MemoryType::Session, None, 0.5, vec![])
            .await
            .unwrap();
        assert_eq!(memory.access_count, 0);
        assert_eq!(memory.accessed_at, memory.created_at);
    }

    #[tokio::test]
    async fn get_bumps_access_count() {
        let svc = service();
        let memory = svc
            .store(&scope(), "note", MemoryType::Longterm, None, 0.5, vec![])
            .await
            .unwrap();

        let first = svc
            .get(&scope(), &memory.memory_id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.access_count, 1);

        let second = svc
            .get(&scope(), &memory.memory_id, Some(MemoryType::Longterm))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.access_count, 2);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let svc = service();
        assert!(svc.get(&scope(), "nope", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_spans_both_types_and_bumps_access() {
        let svc = service();
        svc.store(
            &scope(),
            "postgres connection pool exhausted",
            MemoryType::Session,
            Some("s1".into()),
            0.5,
            vec![],
        )
        .await
        .unwrap();
        svc.store(
            &scope(),
            "postgres tuning checklist",
            MemoryType::Longterm,
            None,
            0.5,
            vec![],
        )
        .await
        .unwrap();

        let hits = svc
            .search(&scope(), "postgres", &MemoryFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.memory.access_count == 1));
    }

    #[tokio::test]
    async fn search_filters_importance_and_tags() {
        let svc = service();
        svc.store(
            &scope(),
            "critical outage runbook",
            MemoryType::Longterm,
            None,
            0.9,
            vec!["runbook".into()],
        )
        .await
        .unwrap();
        svc.store(
            &scope(),
            "minor outage note",
            MemoryType::Longterm,
            None,
            0.2,
            vec!["note".into()],
        )
        .await
        .unwrap();

        let filter = MemoryFilter {
            min_importance: 0.5,
            ..Default::default()
        };
        let hits = svc.search(&scope(), "outage", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.content.contains("critical"));

        let filter = MemoryFilter {
            tags: vec!["note".into()],
            ..Default::default()
        };
        let hits = svc.search(&scope(), "outage", &filter, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].memory.content.contains("minor"));
    }

    #[tokio::test]
    async fn promote_moves_between_indexes() {
        let svc = service();
        let memory = svc
            .store(
                &scope(),
                "promote me",
                MemoryType::Session,
                Some("s1".into()),
                0.8,
                vec!["keep".into()],
            )
            .await
            .unwrap();

        let promoted = svc.promote(&scope(), &memory.memory_id).await.unwrap();
        assert_eq!(promoted.memory_type, MemoryType::Longterm);
        assert_eq!(promoted.memory_id, memory.memory_id);
        assert_eq!(promoted.content, "promote me");
        assert_eq!(promoted.tags, vec!["keep".to_string()]);

        // Absent from session, present in longterm.
        assert!(svc
            .get(&scope(), &memory.memory_id, Some(MemoryType::Session))
            .await
            .unwrap()
            .is_none());
        let found = svc
            .get(&scope(), &memory.memory_id, Some(MemoryType::Longterm))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.content, "promote me");
    }

    #[tokio::test]
    async fn promote_missing_is_not_found() {
        let svc = service();
        let err = svc.promote(&scope(), "nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_importance_reflects_in_search() {
        let svc = service();
        let memory = svc
            .store(&scope(), "tunable note", MemoryType::Longterm, None, 0.2, vec![])
            .await
            .unwrap();

        let updated = svc
            .update_importance(&scope(), &memory.memory_id, 0.95, None)
            .await
            .unwrap();
        assert!(updated);

        let filter = MemoryFilter {
            min_importance: 0.9,
            ..Default::default()
        };
        let hits = svc
            .search(&scope(), "tunable note", &filter, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_keeps_important_memories() {
        let svc = service();
        svc.store(
            &scope(),
            "vital incident summary",
            MemoryType::Session,
            Some("s1".into()),
            0.9,
            vec![],
        )
        .await
        .unwrap();
        svc.store(
            &scope(),
            "scratch note",
            MemoryType::Session,
            Some("s1".into()),
            0.3,
            vec![],
        )
        .await
        .unwrap();
        // A different session is untouched.
        svc.store(
            &scope(),
            "other session note",
            MemoryType::Session,
            Some("s2".into()),
            0.1,
            vec![],
        )
        .await
        .unwrap();

        let deleted = svc
            .cleanup_session(&scope(), "s1", true, 0.7)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let filter = MemoryFilter {
            session_id: Some("s1".into()),
            ..Default::default()
        };
        let hits = svc.search(&scope(), "note summary", &filter, 10).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.memory.content.as_str()).collect();
        assert!(contents.contains(&"vital incident summary"));
        assert!(!contents.contains(&"scratch note"));
    }

    #[tokio::test]
    async fn cleanup_without_keep_important_deletes_all() {
        let svc = service();
        for importance in [0.9, 0.3] {
            svc.store(
                &scope(),
                "session memory",
                MemoryType::Session,
                Some("s1".into()),
                importance,
                vec![],
            )
            .await
            .unwrap();
        }
        let deleted = svc
            .cleanup_session(&scope(), "s1", false, 0.7)
            .await
            .unwrap();
        assert_eq!(deleted, 2);
    }

    #[tokio::test]
    async fn decision_round_trip() {
        let svc = service();
        let decision = svc
            .store_decision(
                &scope(),
                "s1",
                "scale-out",
                "API latency rising under load",
                "Horizontal scaling is cheaper than larger instances here",
                "Added two replicas behind the balancer",
                0.8,
                vec!["compute-instance".into()],
                vec!["capacity".into()],
            )
            .await
            .unwrap();

        let fetched = svc
            .get_decision(&scope(), &decision.decision_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.context_text, "API latency rising under load");
        assert_eq!(
            fetched.reasoning_text,
            "Horizontal scaling is cheaper than larger instances here"
        );
        assert_eq!(fetched.outcome_text, "Added two replicas behind the balancer");
        assert_eq!(fetched.decision_type, "scale-out");
    }

    #[tokio::test]
    async fn decision_search_filters() {
        let svc = service();
        svc.store_decision(
            &scope(),
            "s1",
            "scale-out",
            "replica capacity planning",
            "reasoning",
            "outcome",
            0.9,
            vec![],
            vec![],
        )
        .await
        .unwrap();
        svc.store_decision(
            &scope(),
            "s2",
            "rollback",
            "replica capacity regression",
            "reasoning",
            "outcome",
            0.4,
            vec![],
            vec![],
        )
        .await
        .unwrap();

        let filter = DecisionFilter {
            min_confidence: 0.5,
            ..Default::default()
        };
        let hits = svc
            .search_decisions(&scope(), "replica capacity", &filter, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].decision.decision_type, "scale-out");

        let filter = DecisionFilter {
            session_id: Some("s2".into()),
            ..Default::default()
        };
        let hits = svc
            .search_decisions(&scope(), "replica capacity", &filter, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].decision.decision_type, "rollback");
    }

    #[tokio::test]
    async fn decisions_for_resource_type_checks_relations() {
        let svc = service();
        svc.store_decision(
            &scope(),
            "s1",
            "resize",
            "bucket storage class review",
            "reasoning",
            "outcome",
            0.7,
            vec!["bucket".into()],
            vec![],
        )
        .await
        .unwrap();
        svc.store_decision(
            &scope(),
            "s1",
            "resize",
            "bucket mention without relation",
            "reasoning",
            "outcome",
            0.7,
            vec!["compute-instance".into()],
            vec![],
        )
        .await
        .unwrap();

        let decisions = svc
            .decisions_for_resource_type(&scope(), "bucket", 10)
            .await
            .unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].related_resource_types, vec!["bucket".to_string()]);
    }
}
