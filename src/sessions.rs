//! Ephemeral sessions — store contract, in-process backend, and the
//! read-modify-write service layer.
//!
//! A session is one atomic blob per key: every mutation reads the whole
//! blob, modifies it, and writes it back while holding that key's lock.
//! Liveness is judged by the explicit `expires_at` timestamp recomputed on
//! every write; the store's native TTL is asserted alongside as verification,
//! never as the sole source of truth.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::scope::{session_key, session_prefix, ScopeKey, ScopeLocks};

// ── Store contract ────────────────────────────────────────────────────────────

/// Key-value collaborator with per-key expiration.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g. "in-memory").
    fn backend(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a fresh TTL.
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;

    /// Reset the TTL of an existing key. Returns false when absent.
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool>;

    /// List live keys starting with `prefix`.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>>;

    /// Seconds remaining before expiry, `None` when absent or expired.
    async fn ttl(&self, key: &str) -> Result<Option<u64>>;

    async fn delete(&self, key: &str) -> Result<bool>;
}

/// In-process [`SessionStore`] with explicit expiry timestamps.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<HashMap<String, (String, DateTime<Utc>)>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(expires_at: &DateTime<Utc>) -> bool {
        *expires_at > Utc::now()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend(&self) -> &str {
        "in-memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| Self::live(expires_at))
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        let expires_at = Utc::now() + Duration::seconds(ttl_seconds as i64);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some((_, expires_at)) if Self::live(expires_at) => {
                *expires_at = Utc::now() + Duration::seconds(ttl_seconds as i64);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, (_, expires_at))| key.starts_with(prefix) && Self::live(expires_at))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(_, expires_at)| {
            let remaining = (*expires_at - Utc::now()).num_seconds();
            (remaining > 0).then_some(remaining as u64)
        }))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}

// ── Session types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The full session blob as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub tenant_id: String,
    /// Identifier of the downstream model this session converses with.
    pub model_ref: String,
    pub messages: Vec<SessionMessage>,
    pub context: Map<String, Value>,
    pub state: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ttl_seconds: u64,
    /// Explicit expiry, recomputed on every write and extend.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Listing row for a tenant's sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub model_ref: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_remaining: Option<u64>,
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Read-modify-write session operations over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    locks: ScopeLocks,
    default_ttl: u64,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, locks: ScopeLocks, default_ttl: u64) -> Self {
        Self {
            store,
            locks,
            default_ttl,
        }
    }

    /// Create a session with a fresh id and TTL.
    pub async fn create(
        &self,
        scope: &ScopeKey,
        model_ref: &str,
        initial_context: Option<Map<String, Value>>,
        ttl_seconds: Option<u64>,
    ) -> Result<Session> {
        let session_id = Uuid::now_v7().to_string();
        let key = session_key(scope, &session_id)?;
        let ttl = ttl_seconds.unwrap_or(self.default_ttl);
        let now = Utc::now();

        let session = Session {
            session_id,
            tenant_id: scope.tenant_id.clone(),
            model_ref: model_ref.to_string(),
            messages: Vec::new(),
            context: initial_context.unwrap_or_default(),
            state: Map::new(),
            created_at: now,
            last_activity: now,
            ttl_seconds: ttl,
            expires_at: now + Duration::seconds(ttl as i64),
        };

        self.store
            .set(&key, serde_json::to_string(&session)?, ttl)
            .await?;
        Ok(session)
    }

    /// Fetch a session; expired sessions read as absent even if the store
    /// still holds the blob.
    pub async fn get(&self, scope: &ScopeKey, session_id: &str) -> Result<Option<Session>> {
        let key = session_key(scope, session_id)?;
        let Some(blob) = self.store.get(&key).await? else {
            return Ok(None);
        };
        let session: Session = serde_json::from_str(&blob)?;
        Ok(session.is_live(Utc::now()).then_some(session))
    }

    /// Read-modify-write the whole blob under this session's lock.
    ///
    /// Refreshes `last_activity`, recomputes `expires_at` from the remaining
    /// lifetime, and re-asserts the store TTL on write.
    pub async fn update<F>(&self, scope: &ScopeKey, session_id: &str, mutate: F) -> Result<Session>
    where
        F: FnOnce(&mut Session),
    {
        let key = session_key(scope, session_id)?;
        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().await;

        let mut session = self
            .get(scope, session_id)
            .await?
            .ok_or_else(|| Error::not_found("session", session_id))?;

        mutate(&mut session);

        let now = Utc::now();
        let remaining = (session.expires_at - now).num_seconds().max(1) as u64;
        session.last_activity = now;
        session.expires_at = now + Duration::seconds(remaining as i64);

        self.store
            .set(&key, serde_json::to_string(&session)?, remaining)
            .await?;
        Ok(session)
    }

    pub async fn add_message(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        message: SessionMessage,
    ) -> Result<Session> {
        self.update(scope, session_id, |session| {
            session.messages.push(message);
        })
        .await
    }

    pub async fn get_messages(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<SessionMessage>> {
        let Some(session) = self.get(scope, session_id).await? else {
            return Ok(Vec::new());
        };
        Ok(session
            .messages
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    /// Merge (or replace) the session's context mapping.
    pub async fn update_context(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        context: Map<String, Value>,
        merge: bool,
    ) -> Result<Session> {
        self.update(scope, session_id, |session| {
            if merge {
                session.context.extend(context);
            } else {
                session.context = context;
            }
        })
        .await
    }

    /// Merge (or replace) the session's state mapping.
    pub async fn update_state(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        state: Map<String, Value>,
        merge: bool,
    ) -> Result<Session> {
        self.update(scope, session_id, |session| {
            if merge {
                session.state.extend(state);
            } else {
                session.state = state;
            }
        })
        .await
    }

    /// Push the expiry out by `additional_seconds`.
    pub async fn extend_ttl(
        &self,
        scope: &ScopeKey,
        session_id: &str,
        additional_seconds: u64,
    ) -> Result<Session> {
        let key = session_key(scope, session_id)?;
        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().await;

        let mut session = self
            .get(scope, session_id)
            .await?
            .ok_or_else(|| Error::not_found("session", session_id))?;

        let now = Utc::now();
        let remaining = (session.expires_at - now).num_seconds().max(0) as u64;
        let new_ttl = remaining + additional_seconds;
        session.ttl_seconds = new_ttl;
        session.expires_at = now + Duration::seconds(new_ttl as i64);
        session.last_activity = now;

        self.store
            .set(&key, serde_json::to_string(&session)?, new_ttl)
            .await?;
        Ok(session)
    }

    /// List a tenant's sessions, most recent activity first.
    pub async fn list(
        &self,
        scope: &ScopeKey,
        model_ref: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<SessionSummary>> {
        let prefix = session_prefix(scope)?;
        let keys = self.store.scan(&prefix).await?;
        let now = Utc::now();

        let mut summaries = Vec::new();
        for key in keys {
            let Some(blob) = self.store.get(&key).await? else {
                continue;
            };
            let Ok(session) = serde_json::from_str::<Session>(&blob) else {
                continue;
            };
            if let Some(model_ref) = model_ref {
                if session.model_ref != model_ref {
                    continue;
                }
            }
            if active_only && !session.is_live(now) {
                continue;
            }
            let ttl_remaining = self.store.ttl(&key).await?;
            summaries.push(SessionSummary {
                session_id: session.session_id,
                model_ref: session.model_ref,
                created_at: session.created_at,
                last_activity: session.last_activity,
                message_count: session.messages.len(),
                ttl_remaining,
            });
        }

        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(summaries)
    }

    pub async fn delete(&self, scope: &ScopeKey, session_id: &str) -> Result<bool> {
        let key = session_key(scope, session_id)?;
        self.store.delete(&key).await
    }

    /// Delete every session for a tenant; returns the count removed.
    pub async fn clear_tenant(&self, scope: &ScopeKey) -> Result<usize> {
        let prefix = session_prefix(scope)?;
        let keys = self.store.scan(&prefix).await?;
        let mut deleted = 0;
        for key in &keys {
            if self.store.delete(key).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub async fn count(&self, scope: &ScopeKey) -> Result<usize> {
        let prefix = session_prefix(scope)?;
        Ok(self.store.scan(&prefix).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> SessionService {
        SessionService::new(
            Arc::new(InMemorySessionStore::new()),
            ScopeLocks::new(),
            3600,
        )
    }

    fn message(content: &str) -> SessionMessage {
        SessionMessage {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trip() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let session = svc.create(&scope, "model-a", None, None).await.unwrap();
        assert_eq!(session.ttl_seconds, 3600);

        let fetched = svc.get(&scope, &session.session_id).await.unwrap().unwrap();
        assert_eq!(fetched.session_id, session.session_id);
        assert_eq!(fetched.model_ref, "model-a");
        assert!(fetched.messages.is_empty());
    }

    #[tokio::test]
    async fn sessions_are_tenant_isolated() {
        let svc = service();
        let session = svc
            .create(&ScopeKey::tenant("acme"), "m", None, None)
            .await
            .unwrap();
        let other = svc
            .get(&ScopeKey::tenant("globex"), &session.session_id)
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn add_message_appends_and_bumps_activity() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let session = svc.create(&scope, "m", None, None).await.unwrap();

        svc.add_message(&scope, &session.session_id, message("hello"))
            .await
            .unwrap();
        let updated = svc
            .add_message(&scope, &session.session_id, message("again"))
            .await
            .unwrap();

        assert_eq!(updated.messages.len(), 2);
        assert!(updated.last_activity >= session.last_activity);
        assert_eq!(updated.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let svc = service();
        let err = svc
            .add_message(&ScopeKey::tenant("acme"), "nope", message("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn context_merge_and_replace() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let session = svc.create(&scope, "m", None, None).await.unwrap();
        let id = &session.session_id;

        let ctx1 = json!({"region": "us-east-1"}).as_object().cloned().unwrap();
        svc.update_context(&scope, id, ctx1, true).await.unwrap();

        let ctx2 = json!({"account": "123"}).as_object().cloned().unwrap();
        let merged = svc.update_context(&scope, id, ctx2, true).await.unwrap();
        assert_eq!(merged.context.len(), 2);

        let ctx3 = json!({"only": "this"}).as_object().cloned().unwrap();
        let replaced = svc.update_context(&scope, id, ctx3, false).await.unwrap();
        assert_eq!(replaced.context.len(), 1);
        assert_eq!(replaced.context["only"], "this");
    }

    #[tokio::test]
    async fn extend_ttl_pushes_expiry_out() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let session = svc.create(&scope, "m", None, Some(100)).await.unwrap();

        let extended = svc
            .extend_ttl(&scope, &session.session_id, 500)
            .await
            .unwrap();
        assert!(extended.ttl_seconds >= 500);
        assert!(extended.expires_at > session.expires_at);
    }

    #[tokio::test]
    async fn expired_session_reads_as_absent() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let session = svc.create(&scope, "m", None, Some(0)).await.unwrap();

        let fetched = svc.get(&scope, &session.session_id).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn list_sorts_by_activity_and_filters_model() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        let a = svc.create(&scope, "model-a", None, None).await.unwrap();
        let b = svc.create(&scope, "model-b", None, None).await.unwrap();

        // Touch `a` so it is the most recent.
        svc.add_message(&scope, &a.session_id, message("ping"))
            .await
            .unwrap();

        let all = svc.list(&scope, None, true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].session_id, a.session_id);

        let only_b = svc.list(&scope, Some("model-b"), true).await.unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].session_id, b.session_id);
    }

    #[tokio::test]
    async fn clear_tenant_counts_deletions() {
        let svc = service();
        let scope = ScopeKey::tenant("acme");
        svc.create(&scope, "m", None, None).await.unwrap();
        svc.create(&scope, "m", None, None).await.unwrap();
        assert_eq!(svc.count(&scope).await.unwrap(), 2);

        let deleted = svc.clear_tenant(&scope).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(svc.count(&scope).await.unwrap(), 0);
    }
}
