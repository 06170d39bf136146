//! Resource inventory — ingesting declared snapshots, polling live
//! resources, and listing what is indexed.
//!
//! Declared and live resources live in separate collections per scope
//! ([`Domain::InventoryState`] / [`Domain::InventoryLive`]); a resource's
//! document id is `type/id`, so `(resource_type, resource_id, source)` is
//! unique within a scope and re-ingestion replaces rather than duplicates.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::index::{Document, DocumentIndex};
use crate::provider::InventorySource;
use crate::resource::{normalize_live, Resource, ResourceSource};
use crate::scope::{derive_index_name, index_prefix, Domain, ScopeKey, ScopeLocks};
use crate::snapshot::parse_snapshot;

/// Outcome of a declared-snapshot upload.
#[derive(Debug, Serialize)]
pub struct StateUploadReport {
    pub resources_indexed: usize,
    pub errors: Vec<String>,
}

/// Outcome of a live fetch, with per-type counts and per-type errors.
#[derive(Debug, Serialize)]
pub struct LiveFetchReport {
    pub resources_fetched: usize,
    pub resources_indexed: usize,
    pub by_type: BTreeMap<String, usize>,
    pub errors: Vec<String>,
}

/// Normalized result of a per-type provider poll.
///
/// `failed_types` lists the resource types whose fetch errored; callers that
/// mutate the index from this outcome must leave those types untouched.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub resources: Vec<Resource>,
    pub errors: Vec<String>,
    pub failed_types: Vec<String>,
}

/// Per-domain index statistics for one scope.
#[derive(Debug, Serialize)]
pub struct DomainStats {
    pub domain: Domain,
    pub collections: usize,
    pub documents: usize,
}

pub(crate) fn resource_doc_id(resource_type: &str, resource_id: &str) -> String {
    format!("{resource_type}/{resource_id}")
}

pub(crate) fn resource_document(resource: &Resource) -> Document {
    Document {
        id: resource_doc_id(&resource.resource_type, &resource.resource_id),
        text: resource.document_text(),
        metadata: resource.to_metadata(),
    }
}

fn source_domain(source: ResourceSource) -> Domain {
    match source {
        ResourceSource::Declared => Domain::InventoryState,
        ResourceSource::Live => Domain::InventoryLive,
    }
}

/// Declared-state and live-inventory ingestion over the document index.
#[derive(Clone)]
pub struct InventoryService {
    index: Arc<dyn DocumentIndex>,
    source: Arc<dyn InventorySource>,
    locks: ScopeLocks,
}

impl InventoryService {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        source: Arc<dyn InventorySource>,
        locks: ScopeLocks,
    ) -> Self {
        Self {
            index,
            source,
            locks,
        }
    }

    fn account_of(scope: &ScopeKey) -> Result<&str> {
        scope.account_id.as_deref().ok_or_else(|| {
            crate::error::Error::ScopeViolation(
                "inventory operations require an account-scoped key".into(),
            )
        })
    }

    /// Parse and index a declared-state snapshot.
    ///
    /// Malformed individual records are skipped and reported in the result,
    /// never dropped silently.
    pub async fn upload_state(
        &self,
        scope: &ScopeKey,
        content: &str,
        default_region: &str,
    ) -> Result<StateUploadReport> {
        let account_id = Self::account_of(scope)?;
        let collection = derive_index_name(Domain::InventoryState, scope)?;

        let parsed = parse_snapshot(content, default_region, account_id, Utc::now())?;
        let mut errors = parsed.errors;

        let lock = self.locks.lock_for(&collection);
        let _guard = lock.lock().await;

        let mut indexed = 0;
        for resource in &parsed.resources {
            match self
                .index
                .upsert(&collection, resource_document(resource))
                .await
            {
                Ok(()) => indexed += 1,
                Err(e) => errors.push(format!(
                    "{}/{}: {e}",
                    resource.resource_type, resource.resource_id
                )),
            }
        }

        if !errors.is_empty() {
            warn!(count = errors.len(), "state upload skipped records");
        }
        Ok(StateUploadReport {
            resources_indexed: indexed,
            errors,
        })
    }

    /// Fetch live resources per type concurrently and normalize them.
    ///
    /// A provider failure for one type is reported in `errors` and does not
    /// abort the other types.
    pub async fn fetch_normalized(
        &self,
        scope: &ScopeKey,
        region: &str,
        resource_types: &[String],
    ) -> Result<FetchOutcome> {
        let account_id = Self::account_of(scope)?;
        let now = Utc::now();

        let fetches = resource_types
            .iter()
            .map(|rt| async move { (rt.clone(), self.source.fetch(rt, region).await) });
        let fetched = join_all(fetches).await;

        let mut outcome = FetchOutcome::default();
        for (resource_type, result) in fetched {
            match result {
                Ok(records) => {
                    for raw in &records {
                        match normalize_live(raw, region, account_id, now) {
                            Ok(resource) => outcome.resources.push(resource),
                            Err(e) => outcome.errors.push(format!("{resource_type}: {e}")),
                        }
                    }
                }
                Err(e) => {
                    outcome.errors.push(e.to_string());
                    outcome.failed_types.push(resource_type);
                }
            }
        }
        Ok(outcome)
    }

    /// Fetch live resources and (optionally) index them.
    pub async fn fetch_live(
        &self,
        scope: &ScopeKey,
        region: &str,
        resource_types: &[String],
        index_results: bool,
    ) -> Result<LiveFetchReport> {
        let collection = derive_index_name(Domain::InventoryLive, scope)?;
        let outcome = self.fetch_normalized(scope, region, resource_types).await?;
        let (resources, mut errors) = (outcome.resources, outcome.errors);

        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for resource in &resources {
            *by_type.entry(resource.resource_type.clone()).or_default() += 1;
        }

        let mut indexed = 0;
        if index_results {
            let lock = self.locks.lock_for(&collection);
            let _guard = lock.lock().await;
            for resource in &resources {
                match self
                    .index
                    .upsert(&collection, resource_document(resource))
                    .await
                {
                    Ok(()) => indexed += 1,
                    Err(e) => errors.push(format!(
                        "{}/{}: {e}",
                        resource.resource_type, resource.resource_id
                    )),
                }
            }
        }

        Ok(LiveFetchReport {
            resources_fetched: resources.len(),
            resources_indexed: indexed,
            by_type,
            errors,
        })
    }

    /// List indexed resources for one source, optionally filtered by type
    /// and region. Documents that fail to decode are skipped with a warning.
    pub async fn list_resources(
        &self,
        scope: &ScopeKey,
        source: ResourceSource,
        resource_type: Option<&str>,
        region: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Resource>> {
        let collection = derive_index_name(source_domain(source), scope)?;

        let mut filter = Map::new();
        if let Some(rt) = resource_type {
            filter.insert("resource_type".into(), Value::String(rt.into()));
        }
        if let Some(region) = region {
            filter.insert("region".into(), Value::String(region.into()));
        }
        let filter = (!filter.is_empty()).then_some(&filter);

        let docs = self.index.scan(&collection, filter, limit).await?;
        let mut resources = Vec::with_capacity(docs.len());
        for doc in &docs {
            match Resource::from_document(&doc.text, &doc.metadata) {
                Ok(resource) => resources.push(resource),
                Err(e) => warn!(id = %doc.id, %collection, "skipping undecodable resource: {e}"),
            }
        }
        Ok(resources)
    }

    /// Drop one source's collection for a scope. Returns whether it existed.
    pub async fn purge_source(&self, scope: &ScopeKey, source: ResourceSource) -> Result<bool> {
        let collection = derive_index_name(source_domain(source), scope)?;
        let lock = self.locks.lock_for(&collection);
        let _guard = lock.lock().await;
        self.index.delete_collection(&collection).await
    }

    /// Collection and document counts per domain under a scope.
    pub async fn stats(&self, scope: &ScopeKey) -> Result<Vec<DomainStats>> {
        let domains = [
            Domain::MemorySession,
            Domain::MemoryLongterm,
            Domain::Decisions,
            Domain::InventoryState,
            Domain::InventoryLive,
            Domain::General,
        ];
        let mut stats = Vec::with_capacity(domains.len());
        for domain in domains {
            let names = if scope.is_fully_specified() {
                let name = derive_index_name(domain, scope)?;
                if self.index.count(&name).await? > 0 {
                    vec![name]
                } else {
                    Vec::new()
                }
            } else {
                let prefix = index_prefix(domain, scope)?;
                self.index.list_collections(&prefix).await?
            };
            let mut documents = 0;
            for name in &names {
                documents += self.index.count(name).await?;
            }
            stats.push(DomainStats {
                domain,
                collections: names.len(),
                documents,
            });
        }
        Ok(stats)
    }
}
