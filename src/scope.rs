//! Index addressing and tenant isolation.
//!
//! Every physical collection name and session key is derived from a
//! [`ScopeKey`] — the sole isolation unit. Derivation is pure and
//! deterministic: the full component list is embedded in fixed field order
//! with a reserved delimiter, so two distinct scope keys can never map to the
//! same name. A scope key with fewer fields addresses the superset of entries
//! under any more specific key via [`index_prefix`] listing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Reserved delimiter between name components. Never valid inside a field.
pub const DELIMITER: &str = "__";

/// Placeholder for an absent scope field, keeping names positionally fixed.
const PLACEHOLDER: &str = "-";

/// The tenant/account/project/environment partition a request operates in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl ScopeKey {
    /// Tenant-only scope — the broadest addressable partition.
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            account_id: None,
            project_id: None,
            environment: None,
        }
    }

    /// Tenant + account scope, the common unit for inventory data.
    pub fn account(tenant_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            account_id: Some(account_id.into()),
            project_id: None,
            environment: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// All fields in fixed order; `None` for absent ones.
    fn fields(&self) -> [Option<&str>; 4] {
        [
            Some(self.tenant_id.as_str()),
            self.account_id.as_deref(),
            self.project_id.as_deref(),
            self.environment.as_deref(),
        ]
    }

    /// True when every field is populated: the scope addresses exactly one
    /// collection per domain and needs no prefix listing.
    pub fn is_fully_specified(&self) -> bool {
        self.account_id.is_some() && self.project_id.is_some() && self.environment.is_some()
    }
}

/// The physical index domains Stratus partitions data into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Session-scoped conversational memory.
    MemorySession,
    /// Long-term conversational memory.
    MemoryLongterm,
    /// Agent decision records.
    Decisions,
    /// Resources from declared-state snapshots.
    InventoryState,
    /// Resources from live cloud polling.
    InventoryLive,
    /// Free-form tenant knowledge notes.
    General,
}

impl Domain {
    /// Single-token label; never contains the scope delimiter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MemorySession => "memory-session",
            Self::MemoryLongterm => "memory-longterm",
            Self::Decisions => "decisions",
            Self::InventoryState => "inventory-state",
            Self::InventoryLive => "inventory-live",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject field values that could break name derivation out of its scope.
fn validate_field(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::ScopeViolation("empty scope field".into()));
    }
    if value == PLACEHOLDER {
        return Err(Error::ScopeViolation(format!(
            "scope field is the reserved placeholder {PLACEHOLDER:?}"
        )));
    }
    if value.contains(DELIMITER) {
        return Err(Error::ScopeViolation(format!(
            "scope field {value:?} contains the reserved delimiter {DELIMITER:?}"
        )));
    }
    Ok(())
}

/// Derive the physical collection name for a domain within a scope.
///
/// Layout: `domain__tenant__account__project__environment`, with `-` filling
/// absent fields so names stay positionally unambiguous. Pure — no I/O.
pub fn derive_index_name(domain: Domain, scope: &ScopeKey) -> Result<String> {
    let mut parts = vec![domain.as_str().to_string()];
    for field in scope.fields() {
        match field {
            Some(value) => {
                validate_field(value)?;
                parts.push(value.to_string());
            }
            None => parts.push(PLACEHOLDER.to_string()),
        }
    }
    Ok(parts.join(DELIMITER))
}

/// Prefix addressing the superset of collections under this scope.
///
/// Omitted fields act as wildcards from the first absence onward: listing
/// collections with this prefix reaches every more specific scope derived
/// from `scope`. The prefix ends on a delimiter, so a field value that is a
/// strict prefix of a sibling's value never over-matches. For a fully
/// specified scope, use [`derive_index_name`] and address the collection
/// directly instead of listing.
pub fn index_prefix(domain: Domain, scope: &ScopeKey) -> Result<String> {
    let mut parts = vec![domain.as_str().to_string()];
    for field in scope.fields() {
        match field {
            Some(value) => {
                validate_field(value)?;
                parts.push(value.to_string());
            }
            None => break,
        }
    }
    let mut prefix = parts.join(DELIMITER);
    prefix.push_str(DELIMITER);
    Ok(prefix)
}

/// Derive the ephemeral-store key for a session blob.
pub fn session_key(scope: &ScopeKey, session_id: &str) -> Result<String> {
    validate_field(&scope.tenant_id)?;
    if session_id.is_empty() || session_id.contains(':') {
        return Err(Error::ScopeViolation(format!(
            "invalid session id {session_id:?}"
        )));
    }
    Ok(format!("session:{}:{}", scope.tenant_id, session_id))
}

/// Pattern matching every session key for a tenant.
pub fn session_prefix(scope: &ScopeKey) -> Result<String> {
    validate_field(&scope.tenant_id)?;
    Ok(format!("session:{}:", scope.tenant_id))
}

/// Per-derived-key async mutex registry.
///
/// Mutation cycles (sync writes, promote/cleanup, session read-modify-write)
/// hold the lock for their key for the whole read-modify-write; operations
/// against different keys never contend.
#[derive(Clone, Default)]
pub struct ScopeLocks {
    inner: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock guarding `key`.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().expect("scope lock registry poisoned");
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_scope() -> ScopeKey {
        ScopeKey::account("acme", "123456789012")
            .with_project("web")
            .with_environment("prod")
    }

    #[test]
    fn derive_embeds_all_fields_in_order() {
        let name = derive_index_name(Domain::InventoryLive, &full_scope()).unwrap();
        assert_eq!(name, "inventory-live__acme__123456789012__web__prod");
    }

    #[test]
    fn derive_fills_absent_fields_with_placeholder() {
        let name = derive_index_name(Domain::MemorySession, &ScopeKey::tenant("acme")).unwrap();
        assert_eq!(name, "memory-session__acme__-__-__-");
    }

    #[test]
    fn derive_is_deterministic() {
        let a = derive_index_name(Domain::Decisions, &full_scope()).unwrap();
        let b = derive_index_name(Domain::Decisions, &full_scope()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_scopes_never_collide() {
        // Same field value in different positions must not alias.
        let by_account = ScopeKey::account("acme", "shared");
        let by_project = ScopeKey::tenant("acme").with_project("shared");
        let a = derive_index_name(Domain::General, &by_account).unwrap();
        let b = derive_index_name(Domain::General, &by_project).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn delimiter_in_field_is_rejected_before_io() {
        let scope = ScopeKey::tenant("acme__evil");
        let err = derive_index_name(Domain::General, &scope).unwrap_err();
        assert!(matches!(err, Error::ScopeViolation(_)));
    }

    #[test]
    fn empty_and_placeholder_fields_are_rejected() {
        assert!(derive_index_name(Domain::General, &ScopeKey::tenant("")).is_err());
        assert!(derive_index_name(Domain::General, &ScopeKey::tenant("-")).is_err());
    }

    #[test]
    fn prefix_of_broader_scope_matches_narrower_names() {
        let broad = index_prefix(Domain::InventoryLive, &ScopeKey::tenant("acme")).unwrap();
        let narrow = derive_index_name(Domain::InventoryLive, &full_scope()).unwrap();
        assert!(narrow.starts_with(&broad));
    }

    #[test]
    fn prefix_does_not_match_sibling_tenants() {
        // "acme" must not prefix-match "acme2" collections.
        let broad = index_prefix(Domain::General, &ScopeKey::tenant("acme")).unwrap();
        let sibling = derive_index_name(Domain::General, &ScopeKey::tenant("acme2")).unwrap();
        assert!(!sibling.starts_with(&broad));
    }

    #[test]
    fn fully_specified_detection() {
        assert!(full_scope().is_fully_specified());
        assert!(!ScopeKey::tenant("acme").is_fully_specified());
        assert!(!ScopeKey::account("acme", "a").with_project("p").is_fully_specified());
    }

    #[test]
    fn session_key_layout() {
        let key = session_key(&ScopeKey::tenant("acme"), "0192-abc").unwrap();
        assert_eq!(key, "session:acme:0192-abc");
        assert!(session_key(&ScopeKey::tenant("acme"), "has:colon").is_err());
    }

    #[tokio::test]
    async fn locks_are_per_key() {
        let locks = ScopeLocks::new();
        let a = locks.lock_for("k1");
        let b = locks.lock_for("k2");
        let _ga = a.lock().await;
        // A different key must not block.
        let _gb = b.lock().await;
        // The same key hands back the same mutex.
        assert!(Arc::ptr_eq(&a, &locks.lock_for("k1")));
    }
}
