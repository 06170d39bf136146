//! HTTP surface — JSON endpoints over the core services.
//!
//! Tenant identity comes from the `x-tenant-id` header, with optional
//! `x-account-id`, `x-project-id`, and `x-environment` narrowing the scope.
//! Handlers translate [`Error`] variants to statuses via its `IntoResponse`.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::context::ContextGroup;
use crate::error::{Error, Result};
use crate::memory::{DecisionFilter, MemoryFilter, MemoryType};
use crate::resource::ResourceSource;
use crate::scope::ScopeKey;
use crate::search::IndexGroup;
use crate::server::AppState;
use crate::sessions::{Role, SessionMessage};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/stats", get(stats))
        // memories
        .route("/v1/memories", post(store_memory))
        .route("/v1/memories/search", get(search_memories))
        .route("/v1/memories/cleanup", post(cleanup_session))
        .route("/v1/memories/{id}", get(get_memory).delete(delete_memory))
        .route("/v1/memories/{id}/promote", post(promote_memory))
        .route("/v1/memories/{id}/importance", patch(update_importance))
        // decisions
        .route("/v1/decisions", post(store_decision))
        .route("/v1/decisions/search", get(search_decisions))
        .route("/v1/decisions/{id}", get(get_decision))
        // general context
        .route(
            "/v1/context/general",
            post(store_general).get(list_general),
        )
        .route("/v1/context/general/search", get(search_general))
        .route(
            "/v1/context/general/{id}",
            get(get_general).delete(delete_general),
        )
        // declared state + live inventory
        .route("/v1/state/upload", post(upload_state))
        .route("/v1/state", get(list_state))
        .route("/v1/live/fetch", post(fetch_live))
        .route("/v1/live/sync", post(sync_live))
        .route("/v1/live", get(list_live))
        .route("/v1/compare", post(compare))
        // unified search + agent context
        .route("/v1/search", post(unified_search))
        .route("/v1/context/build", post(build_context))
        // sessions
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route(
            "/v1/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/v1/sessions/{id}/messages",
            post(add_message).get(get_messages),
        )
        .route("/v1/sessions/{id}/extend", post(extend_session))
        .route("/v1/sessions/{id}/context", patch(update_session_context))
        .route("/v1/sessions/{id}/state", patch(update_session_state))
        .with_state(state)
}

/// Scope key from request headers; a missing tenant is a scope violation.
fn scope_from(headers: &HeaderMap) -> Result<ScopeKey> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let tenant_id = header("x-tenant-id")
        .ok_or_else(|| Error::ScopeViolation("missing x-tenant-id header".into()))?;
    Ok(ScopeKey {
        tenant_id,
        account_id: header("x-account-id"),
        project_id: header("x-project-id"),
        environment: header("x-environment"),
    })
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "stratus"}))
}

async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let domains = state.inventory.stats(&scope).await?;
    let sessions = state.sessions.count(&scope).await?;
    Ok(Json(json!({"domains": domains, "sessions": sessions})))
}

// ── Memories ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StoreMemoryBody {
    content: String,
    memory_type: MemoryType,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_importance")]
    importance_score: f64,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_importance() -> f64 {
    0.5
}

async fn store_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StoreMemoryBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let memory = state
        .memory
        .store(
            &scope,
            &body.content,
            body.memory_type,
            body.session_id,
            body.importance_score,
            body.tags,
        )
        .await?;
    Ok(Json(serde_json::to_value(memory)?))
}

#[derive(Deserialize)]
struct MemorySearchQuery {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    min_importance: f64,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn search_memories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<MemorySearchQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let filter = MemoryFilter {
        session_id: params.session_id,
        min_importance: params.min_importance,
        tags: params.tag.into_iter().collect(),
    };
    let top_k = params
        .top_k
        .unwrap_or(state.config.retrieval.top_k_per_group);
    let hits = state.memory.search(&scope, &params.query, &filter, top_k).await?;
    let total = hits.len();
    Ok(Json(json!({"results": hits, "total": total})))
}

async fn get_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    match state.memory.get(&scope, &id, None).await? {
        Some(memory) => Ok(Json(serde_json::to_value(memory)?)),
        None => Err(Error::not_found("memory", id)),
    }
}

async fn delete_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let deleted = state.memory.delete(&scope, &id, None).await?;
    Ok(Json(json!({"deleted": deleted})))
}

async fn promote_memory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let memory = state.memory.promote(&scope, &id).await?;
    Ok(Json(serde_json::to_value(memory)?))
}

#[derive(Deserialize)]
struct ImportanceBody {
    importance_score: f64,
}

async fn update_importance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ImportanceBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let updated = state
        .memory
        .update_importance(&scope, &id, body.importance_score, None)
        .await?;
    if !updated {
        return Err(Error::not_found("memory", id));
    }
    Ok(Json(json!({"updated": true})))
}

#[derive(Deserialize)]
struct CleanupBody {
    session_id: String,
    #[serde(default = "default_true")]
    keep_important: bool,
    #[serde(default)]
    importance_threshold: Option<f64>,
}

fn default_true() -> bool {
    true
}

async fn cleanup_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CleanupBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let threshold = body
        .importance_threshold
        .unwrap_or(state.config.inventory.cleanup_importance_threshold);
    let deleted = state
        .memory
        .cleanup_session(&scope, &body.session_id, body.keep_important, threshold)
        .await?;
    Ok(Json(json!({"deleted_count": deleted})))
}

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StoreDecisionBody {
    session_id: String,
    decision_type: String,
    context: String,
    reasoning: String,
    outcome: String,
    #[serde(default = "default_importance")]
    confidence_score: f64,
    #[serde(default)]
    related_resource_types: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

async fn store_decision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StoreDecisionBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let decision = state
        .memory
        .store_decision(
            &scope,
            &body.session_id,
            &body.decision_type,
            &body.context,
            &body.reasoning,
            &body.outcome,
            body.confidence_score,
            body.related_resource_types,
            body.tags,
        )
        .await?;
    Ok(Json(serde_json::to_value(decision)?))
}

#[derive(Deserialize)]
struct DecisionSearchQuery {
    query: String,
    #[serde(default)]
    decision_type: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    min_confidence: f64,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn search_decisions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DecisionSearchQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let filter = DecisionFilter {
        decision_type: params.decision_type,
        session_id: params.session_id,
        min_confidence: params.min_confidence,
    };
    let top_k = params
        .top_k
        .unwrap_or(state.config.retrieval.top_k_per_group);
    let hits = state
        .memory
        .search_decisions(&scope, &params.query, &filter, top_k)
        .await?;
    let total = hits.len();
    Ok(Json(json!({"results": hits, "total": total})))
}

async fn get_decision(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    match state.memory.get_decision(&scope, &id).await? {
        Some(decision) => Ok(Json(serde_json::to_value(decision)?)),
        None => Err(Error::not_found("decision", id)),
    }
}

// ── General context ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StoreGeneralBody {
    content: String,
    #[serde(default = "default_context_type")]
    context_type: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

fn default_context_type() -> String {
    "general".into()
}

async fn store_general(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<StoreGeneralBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let entry = state
        .general
        .store(&scope, &body.content, &body.context_type, body.metadata)
        .await?;
    Ok(Json(serde_json::to_value(entry)?))
}

#[derive(Deserialize)]
struct GeneralListQuery {
    #[serde(default)]
    context_type: Option<String>,
    #[serde(default = "default_list_limit")]
    limit: usize,
}

fn default_list_limit() -> usize {
    100
}

async fn list_general(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<GeneralListQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let entries = state
        .general
        .list(&scope, params.context_type.as_deref(), params.limit)
        .await?;
    let total = entries.len();
    Ok(Json(json!({"results": entries, "total": total})))
}

#[derive(Deserialize)]
struct GeneralSearchQuery {
    query: String,
    #[serde(default)]
    context_type: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
}

async fn search_general(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<GeneralSearchQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let top_k = params
        .top_k
        .unwrap_or(state.config.retrieval.top_k_per_group);
    let hits = state
        .general
        .search(&scope, &params.query, params.context_type.as_deref(), top_k)
        .await?;
    let total = hits.len();
    Ok(Json(json!({"results": hits, "total": total})))
}

async fn get_general(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    match state.general.get(&scope, &id).await? {
        Some(entry) => Ok(Json(serde_json::to_value(entry)?)),
        None => Err(Error::not_found("context", id)),
    }
}

async fn delete_general(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let deleted = state.general.delete(&scope, &id).await?;
    Ok(Json(json!({"deleted": deleted})))
}

// ── Declared state + live inventory ───────────────────────────────────────────

#[derive(Deserialize)]
struct UploadStateBody {
    content: String,
    #[serde(default)]
    region: Option<String>,
}

async fn upload_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UploadStateBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let region = body
        .region
        .unwrap_or_else(|| state.config.inventory.default_region.clone());
    let report = state
        .inventory
        .upload_state(&scope, &body.content, &region)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

#[derive(Deserialize)]
struct ResourceListQuery {
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default = "default_list_limit")]
    limit: usize,
}

async fn list_resources_of(
    state: &AppState,
    headers: &HeaderMap,
    params: ResourceListQuery,
    source: ResourceSource,
) -> Result<Json<Value>> {
    let scope = scope_from(headers)?;
    let resources = state
        .inventory
        .list_resources(
            &scope,
            source,
            params.resource_type.as_deref(),
            params.region.as_deref(),
            params.limit,
        )
        .await?;
    let total = resources.len();
    Ok(Json(json!({"results": resources, "total": total})))
}

async fn list_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ResourceListQuery>,
) -> Result<Json<Value>> {
    list_resources_of(&state, &headers, params, ResourceSource::Declared).await
}

async fn list_live(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ResourceListQuery>,
) -> Result<Json<Value>> {
    list_resources_of(&state, &headers, params, ResourceSource::Live).await
}

#[derive(Deserialize)]
struct FetchLiveBody {
    #[serde(default)]
    region: Option<String>,
    resource_types: Vec<String>,
    #[serde(default = "default_true")]
    index_results: bool,
}

async fn fetch_live(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FetchLiveBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let region = body
        .region
        .unwrap_or_else(|| state.config.inventory.default_region.clone());
    let report = state
        .inventory
        .fetch_live(&scope, &region, &body.resource_types, body.index_results)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

#[derive(Deserialize)]
struct SyncBody {
    #[serde(default)]
    region: Option<String>,
    resource_types: Vec<String>,
}

async fn sync_live(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SyncBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let region = body
        .region
        .unwrap_or_else(|| state.config.inventory.default_region.clone());
    let report = state
        .reconcile
        .sync_from_provider(&scope, &region, &body.resource_types)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

#[derive(Deserialize)]
struct CompareBody {
    resource_type: String,
}

async fn compare(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CompareBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let report = state
        .reconcile
        .compare(&scope, &body.resource_type, None)
        .await?;
    Ok(Json(serde_json::to_value(report)?))
}

// ── Unified search + agent context ────────────────────────────────────────────

#[derive(Deserialize)]
struct UnifiedSearchBody {
    query: String,
    groups: Vec<IndexGroup>,
    #[serde(default)]
    top_k_per_group: Option<usize>,
}

async fn unified_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UnifiedSearchBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let top_k = body
        .top_k_per_group
        .unwrap_or(state.config.retrieval.top_k_per_group);
    let results = state
        .search
        .search(&body.query, &scope, &body.groups, top_k)
        .await?;
    Ok(Json(serde_json::to_value(results)?))
}

#[derive(Deserialize)]
struct BuildContextBody {
    session_id: String,
    query: String,
    include_groups: Vec<ContextGroup>,
    #[serde(default)]
    max_tokens: Option<usize>,
}

async fn build_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BuildContextBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let max_units = body
        .max_tokens
        .map(|tokens| tokens * state.config.retrieval.chars_per_token)
        .unwrap_or_else(|| state.config.context_char_budget());
    let built = state
        .context
        .build(
            &scope,
            &body.session_id,
            &body.query,
            &body.include_groups,
            max_units,
        )
        .await?;
    Ok(Json(serde_json::to_value(built)?))
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CreateSessionBody {
    model_ref: String,
    #[serde(default)]
    initial_context: Option<Map<String, Value>>,
    #[serde(default)]
    ttl_seconds: Option<u64>,
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let session = state
        .sessions
        .create(&scope, &body.model_ref, body.initial_context, body.ttl_seconds)
        .await?;
    Ok(Json(serde_json::to_value(session)?))
}

#[derive(Deserialize)]
struct SessionListQuery {
    #[serde(default)]
    model_ref: Option<String>,
    #[serde(default = "default_true")]
    active_only: bool,
}

async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SessionListQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let sessions = state
        .sessions
        .list(&scope, params.model_ref.as_deref(), params.active_only)
        .await?;
    let total = sessions.len();
    Ok(Json(json!({"results": sessions, "total": total})))
}

async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    match state.sessions.get(&scope, &id).await? {
        Some(session) => Ok(Json(serde_json::to_value(session)?)),
        None => Err(Error::not_found("session", id)),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let deleted = state.sessions.delete(&scope, &id).await?;
    Ok(Json(json!({"deleted": deleted})))
}

#[derive(Deserialize)]
struct AddMessageBody {
    role: Role,
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn add_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AddMessageBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let message = SessionMessage {
        role: body.role,
        content: body.content,
        timestamp: chrono::Utc::now(),
        metadata: body.metadata,
    };
    let session = state.sessions.add_message(&scope, &id, message).await?;
    Ok(Json(json!({"message_count": session.messages.len()})))
}

#[derive(Deserialize)]
struct MessagesQuery {
    #[serde(default = "default_message_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_message_limit() -> usize {
    50
}

async fn get_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let messages = state
        .sessions
        .get_messages(&scope, &id, params.limit, params.offset)
        .await?;
    let total = messages.len();
    Ok(Json(json!({"results": messages, "total": total})))
}

#[derive(Deserialize)]
struct ExtendBody {
    additional_seconds: u64,
}

async fn extend_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ExtendBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let session = state
        .sessions
        .extend_ttl(&scope, &id, body.additional_seconds)
        .await?;
    Ok(Json(
        json!({"ttl_seconds": session.ttl_seconds, "expires_at": session.expires_at}),
    ))
}

#[derive(Deserialize)]
struct MappingPatchBody {
    fields: Map<String, Value>,
    #[serde(default = "default_true")]
    merge: bool,
}

async fn update_session_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MappingPatchBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let session = state
        .sessions
        .update_context(&scope, &id, body.fields, body.merge)
        .await?;
    Ok(Json(json!({"context": session.context})))
}

async fn update_session_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<MappingPatchBody>,
) -> Result<Json<Value>> {
    let scope = scope_from(&headers)?;
    let session = state
        .sessions
        .update_state(&scope, &id, body.fields, body.merge)
        .await?;
    Ok(Json(json!({"state": session.state})))
}
