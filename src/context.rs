//! Agent-context assembly and free-form general context.
//!
//! [`ContextBuilder`] splits a character budget across the requested groups
//! and renders each group's ranked items under a labeled section header.
//! Budget policy: groups are walked in declaration order and each receives
//! `remaining / remaining_groups`, so budget a group leaves unused flows to
//! the groups after it. Items are always emitted whole — the first item
//! that does not fit ends its section.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;
use crate::index::{Document, DocumentIndex};
use crate::memory::decision_from_parts;
use crate::scope::{derive_index_name, Domain, ScopeKey};
use crate::search::{IndexGroup, SearchCoordinator, SearchHit};
use crate::sessions::{Role, SessionService};

/// How many messages the sessions section draws from the tail of a session.
const SESSION_TAIL: usize = 10;

/// A section source for agent-context building. `Sessions` reads the live
/// session blob; the rest query their index group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContextGroup {
    Sessions,
    Memory,
    Decisions,
    Inventory,
    General,
}

impl ContextGroup {
    fn section_title(&self) -> &'static str {
        match self {
            Self::Sessions => "Session Context",
            Self::Memory => "Relevant Memories",
            Self::Decisions => "Past Decisions",
            Self::Inventory => "Infrastructure Inventory",
            Self::General => "General Notes",
        }
    }

    fn index_group(&self) -> Option<IndexGroup> {
        match self {
            Self::Sessions => None,
            Self::Memory => Some(IndexGroup::Memory),
            Self::Decisions => Some(IndexGroup::Decisions),
            Self::Inventory => Some(IndexGroup::Inventory),
            Self::General => Some(IndexGroup::General),
        }
    }
}

/// The assembled context blob plus per-group inclusion counts.
#[derive(Debug, Serialize)]
pub struct AgentContext {
    pub context: String,
    /// Items actually included per group, post-truncation.
    pub sources: BTreeMap<ContextGroup, usize>,
    pub session_id: String,
}

fn meta_str<'a>(metadata: &'a Map<String, Value>, key: &str) -> &'a str {
    metadata.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Render one ranked hit as a whole context item.
fn render_hit(group: ContextGroup, hit: &SearchHit) -> String {
    match group {
        ContextGroup::Memory => {
            format!("- {} (relevance: {:.2})", hit.content, hit.score)
        }
        ContextGroup::Decisions => {
            let decision = decision_from_parts(&hit.content, &hit.metadata);
            format!(
                "- Decision: {}\n  Reasoning: {}\n  Outcome: {}",
                decision.decision_type, decision.reasoning_text, decision.outcome_text
            )
        }
        ContextGroup::Inventory => format!(
            "- Resource: {}/{}\n  Region: {}\n  Source: {}",
            meta_str(&hit.metadata, "resource_type"),
            meta_str(&hit.metadata, "resource_id"),
            meta_str(&hit.metadata, "region"),
            meta_str(&hit.metadata, "source"),
        ),
        ContextGroup::General | ContextGroup::Sessions => format!("- {}", hit.content),
    }
}

/// Budget-aware context assembly over the fan-out coordinator.
#[derive(Clone)]
pub struct ContextBuilder {
    coordinator: SearchCoordinator,
    sessions: SessionService,
    /// Items retrieved per group before budgeting.
    retrieve_k: usize,
}

impl ContextBuilder {
    pub fn new(coordinator: SearchCoordinator, sessions: SessionService, retrieve_k: usize) -> Self {
        Self {
            coordinator,
            sessions,
            retrieve_k,
        }
    }

    /// Build a bounded context blob for the agent.
    ///
    /// `max_units` is a character budget. Each included group renders under
    /// its own header; `sources` counts the items that made it in.
    pub async fn build(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        query: &str,
        include_groups: &[ContextGroup],
        max_units: usize,
    ) -> Result<AgentContext> {
        // Retrieval phase: one fan-out for the index-backed groups, a
        // session read for the pseudo-group.
        let index_groups: Vec<IndexGroup> = include_groups
            .iter()
            .filter_map(ContextGroup::index_group)
            .collect();
        let mut group_results = if index_groups.is_empty() {
            BTreeMap::new()
        } else {
            self.coordinator
                .search(query, scope, &index_groups, self.retrieve_k)
                .await?
        };

        let mut items_per_group: BTreeMap<ContextGroup, Vec<String>> = BTreeMap::new();
        for group in include_groups {
            let items = match group.index_group() {
                Some(index_group) => group_results
                    .remove(&index_group)
                    .map(|results| {
                        results
                            .hits
                            .iter()
                            .map(|hit| render_hit(*group, hit))
                            .collect()
                    })
                    .unwrap_or_default(),
                None => self.session_items(scope, session_id).await,
            };
            items_per_group.insert(*group, items);
        }

        // Allocation phase: declaration order, running remainder.
        let mut sections: Vec<String> = Vec::new();
        let mut sources: BTreeMap<ContextGroup, usize> = BTreeMap::new();
        let mut remaining = max_units;

        for (position, group) in include_groups.iter().enumerate() {
            let groups_left = include_groups.len() - position;
            let share = remaining / groups_left;
            let items = items_per_group.remove(group).unwrap_or_default();

            let header = format!("## {}\n", group.section_title());
            let mut used = header.len();
            let mut included = 0;
            let mut body = String::new();

            for item in &items {
                let cost = item.len() + 1; // newline after each item
                if used + cost > share {
                    break;
                }
                body.push_str(item);
                body.push('\n');
                used += cost;
                included += 1;
            }

            sources.insert(*group, included);
            if included > 0 {
                sections.push(format!("{header}{body}"));
                remaining = remaining.saturating_sub(used);
            }
        }

        Ok(AgentContext {
            context: sections.join("\n"),
            sources,
            session_id: session_id.to_string(),
        })
    }

    /// The tail of the session's message history, one item per message.
    async fn session_items(&self, scope: &ScopeKey, session_id: &str) -> Vec<String> {
        let Ok(Some(session)) = self.sessions.get(scope, session_id).await else {
            return Vec::new();
        };
        session
            .messages
            .iter()
            .rev()
            .take(SESSION_TAIL)
            .rev()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                };
                format!("[{role}]: {}", message.content)
            })
            .collect()
    }
}

// ── General context ───────────────────────────────────────────────────────────

/// A free-form knowledge note indexed under [`Domain::General`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralContextEntry {
    pub context_id: String,
    pub content: String,
    pub context_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub indexed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GeneralContextHit {
    pub entry: GeneralContextEntry,
    pub score: f64,
}

fn general_metadata(entry: &GeneralContextEntry) -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("context_id".into(), entry.context_id.clone().into());
    meta.insert("context_type".into(), entry.context_type.clone().into());
    meta.insert("custom".into(), Value::Object(entry.metadata.clone()));
    meta.insert("indexed_at".into(), entry.indexed_at.to_rfc3339().into());
    meta
}

fn general_from_parts(content: &str, metadata: &Map<String, Value>) -> GeneralContextEntry {
    GeneralContextEntry {
        context_id: meta_str(metadata, "context_id").to_string(),
        content: content.to_string(),
        context_type: meta_str(metadata, "context_type").to_string(),
        metadata: metadata
            .get("custom")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        indexed_at: metadata
            .get("indexed_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
    }
}

/// Store/search/list/delete for general context notes.
#[derive(Clone)]
pub struct GeneralContextService {
    index: Arc<dyn DocumentIndex>,
    coordinator: SearchCoordinator,
}

impl GeneralContextService {
    pub fn new(index: Arc<dyn DocumentIndex>, coordinator: SearchCoordinator) -> Self {
        Self { index, coordinator }
    }

    pub async fn store(
        &self,
        scope: &ScopeKey,
        content: &str,
        context_type: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<GeneralContextEntry> {
        let collection = derive_index_name(Domain::General, scope)?;
        let entry = GeneralContextEntry {
            context_id: Uuid::now_v7().to_string(),
            content: content.to_string(),
            context_type: context_type.to_string(),
            metadata: metadata.unwrap_or_default(),
            indexed_at: Utc::now(),
        };
        self.index
            .upsert(
                &collection,
                Document {
                    id: entry.context_id.clone(),
                    text: entry.content.clone(),
                    metadata: general_metadata(&entry),
                },
            )
            .await?;
        Ok(entry)
    }

    pub async fn search(
        &self,
        scope: &ScopeKey,
        query: &str,
        context_type: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<GeneralContextHit>> {
        let group = self
            .coordinator
            .search_group_scoped(query, scope, IndexGroup::General, top_k)
            .await?;
        if let Some(error) = group.error {
            return Err(crate::error::Error::Store(error));
        }
        Ok(group
            .hits
            .into_iter()
            .map(|hit| GeneralContextHit {
                entry: general_from_parts(&hit.content, &hit.metadata),
                score: hit.score,
            })
            .filter(|hit| context_type.is_none_or(|t| hit.entry.context_type == t))
            .collect())
    }

    pub async fn list(
        &self,
        scope: &ScopeKey,
        context_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<GeneralContextEntry>> {
        let collection = derive_index_name(Domain::General, scope)?;
        let mut filter = Map::new();
        if let Some(context_type) = context_type {
            filter.insert("context_type".into(), Value::String(context_type.into()));
        }
        let filter = (!filter.is_empty()).then_some(&filter);
        let docs = self.index.scan(&collection, filter, limit).await?;
        Ok(docs
            .iter()
            .map(|doc| general_from_parts(&doc.text, &doc.metadata))
            .collect())
    }

    pub async fn get(
        &self,
        scope: &ScopeKey,
        context_id: &str,
    ) -> Result<Option<GeneralContextEntry>> {
        let collection = derive_index_name(Domain::General, scope)?;
        Ok(self
            .index
            .get(&collection, context_id)
            .await?
            .map(|doc| general_from_parts(&doc.text, &doc.metadata)))
    }

    pub async fn delete(&self, scope: &ScopeKey, context_id: &str) -> Result<bool> {
        let collection = derive_index_name(Domain::General, scope)?;
        self.index.delete(&collection, context_id).await
    }
}
