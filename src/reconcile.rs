//! Reconciliation — syncing the live index against fresh polls and
//! detecting drift between the declared and live views.
//!
//! Sync classifies every `resource_id` into exactly one of ADDED / UPDATED /
//! REMOVED / UNCHANGED against the previously-indexed live set, then applies
//! the mutations so the index exactly reflects the fresh set; running it
//! twice with the same input classifies nothing on the second pass. Compare
//! joins the declared and live sets on `resource_id` and reports per-key
//! attribute differences without any type coercion.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::index::DocumentIndex;
use crate::inventory::{resource_doc_id, resource_document, InventoryService};
use crate::resource::{Resource, ResourceSource};
use crate::scope::{derive_index_name, Domain, ScopeKey, ScopeLocks};

/// Upper bound on materialized set size per compare/sync load.
const SCAN_LIMIT: usize = 10_000;

/// Classification outcome of one sync run.
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Total mutations applied (everything except UNCHANGED).
    pub fn mutation_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

/// One attribute key whose values differ between the two views.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeDiff {
    pub key: String,
    pub declared: Option<Value>,
    pub live: Option<Value>,
}

/// A joined resource pair whose attributes differ on at least one key.
#[derive(Debug, Serialize)]
pub struct ResourceDrift {
    pub resource_id: String,
    pub resource_type: String,
    pub differing_keys: Vec<AttributeDiff>,
}

/// Identifying fields of a resource present in only one view.
#[derive(Debug, Serialize)]
pub struct ResourceRef {
    pub resource_id: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

impl From<&Resource> for ResourceRef {
    fn from(r: &Resource) -> Self {
        Self {
            resource_id: r.resource_id.clone(),
            resource_type: r.resource_type.clone(),
            resource_name: r.resource_name.clone(),
        }
    }
}

/// Drift report for one resource type within a scope.
#[derive(Debug, Serialize)]
pub struct CompareReport {
    pub resource_type: String,
    /// Declared but not live: externally deleted or not yet applied.
    pub state_only: Vec<ResourceRef>,
    /// Live but not declared: unmanaged / out-of-band.
    pub live_only: Vec<ResourceRef>,
    pub differences: Vec<ResourceDrift>,
    pub matched: usize,
    pub drift_detected: bool,
}

/// Structural per-key diff over two attribute mappings.
///
/// Key order is irrelevant; values are never coerced (`3` and `"3"` differ).
pub fn diff_attributes(declared: &Map<String, Value>, live: &Map<String, Value>) -> Vec<AttributeDiff> {
    let mut keys: Vec<&String> = declared.keys().chain(live.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| declared.get(*key) != live.get(*key))
        .map(|key| AttributeDiff {
            key: key.clone(),
            declared: declared.get(key).cloned(),
            live: live.get(key).cloned(),
        })
        .collect()
}

/// The diff/sync engine over the inventory collections.
#[derive(Clone)]
pub struct ReconcileService {
    index: Arc<dyn DocumentIndex>,
    inventory: InventoryService,
    locks: ScopeLocks,
}

impl ReconcileService {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        inventory: InventoryService,
        locks: ScopeLocks,
    ) -> Self {
        Self {
            index,
            inventory,
            locks,
        }
    }

    /// Sync the indexed live set for `resource_types` to match `fresh`.
    ///
    /// Both sets are fully materialized before classification. The apply
    /// step runs per resource type in a detached task, so caller
    /// cancellation cannot leave a type half-applied.
    pub async fn sync(
        &self,
        scope: &ScopeKey,
        resource_types: &[String],
        fresh: Vec<Resource>,
    ) -> Result<SyncReport> {
        let collection = derive_index_name(Domain::InventoryLive, scope)?;
        let type_set: HashSet<&str> = resource_types.iter().map(String::as_str).collect();

        let lock = self.locks.lock_for(&collection);
        let _guard = lock.lock().await;

        // Materialize the previously-indexed set for the types in play.
        let mut indexed: HashMap<(String, String), Resource> = HashMap::new();
        for doc in self.index.scan(&collection, None, SCAN_LIMIT).await? {
            if let Ok(resource) = Resource::from_document(&doc.text, &doc.metadata) {
                if type_set.contains(resource.resource_type.as_str()) {
                    indexed.insert(
                        (resource.resource_type.clone(), resource.resource_id.clone()),
                        resource,
                    );
                }
            }
        }

        let mut report = SyncReport::default();
        let mut fresh_keys: HashSet<(String, String)> = HashSet::new();

        // Per-type mutation plans: upserts and deletions.
        let mut plans: BTreeMap<String, (Vec<Resource>, Vec<String>)> = BTreeMap::new();

        for resource in fresh {
            if !type_set.contains(resource.resource_type.as_str()) {
                continue;
            }
            let key = (resource.resource_type.clone(), resource.resource_id.clone());
            fresh_keys.insert(key.clone());
            match indexed.get(&key) {
                Some(existing) if existing.attributes == resource.attributes => {
                    report.unchanged.push(resource.resource_id.clone());
                }
                Some(_) => {
                    report.updated.push(resource.resource_id.clone());
                    plans
                        .entry(resource.resource_type.clone())
                        .or_default()
                        .0
                        .push(resource);
                }
                None => {
                    report.added.push(resource.resource_id.clone());
                    plans
                        .entry(resource.resource_type.clone())
                        .or_default()
                        .0
                        .push(resource);
                }
            }
        }

        for ((resource_type, resource_id), _) in &indexed {
            if !fresh_keys.contains(&(resource_type.clone(), resource_id.clone())) {
                report.removed.push(resource_id.clone());
                plans
                    .entry(resource_type.clone())
                    .or_default()
                    .1
                    .push(resource_id.clone());
            }
        }

        // Apply each type's plan detached from the caller: either all of a
        // type's mutations land or (on store failure) the failure is
        // reported for that type.
        for (resource_type, (upserts, deletions)) in plans {
            let index = self.index.clone();
            let collection = collection.clone();
            let handle = tokio::spawn(async move {
                for resource in &upserts {
                    index
                        .upsert(&collection, resource_document(resource))
                        .await?;
                }
                for resource_id in &deletions {
                    index
                        .delete(&collection, &resource_doc_id(&resource_type, resource_id))
                        .await?;
                }
                Ok::<_, crate::error::Error>(resource_type)
            });
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => report.errors.push(e.to_string()),
                Err(e) => report.errors.push(format!("apply task failed: {e}")),
            }
        }

        report.added.sort();
        report.updated.sort();
        report.removed.sort();
        report.unchanged.sort();
        Ok(report)
    }

    /// Poll the provider and sync. Types whose fetch failed are excluded
    /// from classification entirely, so a provider outage never deletes
    /// that type's indexed resources.
    pub async fn sync_from_provider(
        &self,
        scope: &ScopeKey,
        region: &str,
        resource_types: &[String],
    ) -> Result<SyncReport> {
        let outcome = self
            .inventory
            .fetch_normalized(scope, region, resource_types)
            .await?;

        let failed: HashSet<&str> = outcome.failed_types.iter().map(String::as_str).collect();
        let types_ok: Vec<String> = resource_types
            .iter()
            .filter(|rt| !failed.contains(rt.as_str()))
            .cloned()
            .collect();

        let mut report = self.sync(scope, &types_ok, outcome.resources).await?;
        report.errors.extend(outcome.errors);
        Ok(report)
    }

    /// Join the declared and live views of one resource type and report
    /// drift. When `live_override` is given it stands in for the indexed
    /// live set (freshly-fetched comparison).
    pub async fn compare(
        &self,
        scope: &ScopeKey,
        resource_type: &str,
        live_override: Option<Vec<Resource>>,
    ) -> Result<CompareReport> {
        let declared = self
            .inventory
            .list_resources(
                scope,
                ResourceSource::Declared,
                Some(resource_type),
                None,
                SCAN_LIMIT,
            )
            .await?;
        let live = match live_override {
            Some(live) => live
                .into_iter()
                .filter(|r| r.resource_type == resource_type)
                .collect(),
            None => {
                self.inventory
                    .list_resources(
                        scope,
                        ResourceSource::Live,
                        Some(resource_type),
                        None,
                        SCAN_LIMIT,
                    )
                    .await?
            }
        };

        let declared_by_id: BTreeMap<&str, &Resource> = declared
            .iter()
            .map(|r| (r.resource_id.as_str(), r))
            .collect();
        let live_by_id: BTreeMap<&str, &Resource> =
            live.iter().map(|r| (r.resource_id.as_str(), r)).collect();

        let mut report = CompareReport {
            resource_type: resource_type.to_string(),
            state_only: Vec::new(),
            live_only: Vec::new(),
            differences: Vec::new(),
            matched: 0,
            drift_detected: false,
        };

        for (resource_id, declared_res) in &declared_by_id {
            match live_by_id.get(resource_id) {
                None => report.state_only.push(ResourceRef::from(*declared_res)),
                Some(live_res) => {
                    let diffs = diff_attributes(&declared_res.attributes, &live_res.attributes);
                    if diffs.is_empty() {
                        report.matched += 1;
                    } else {
                        report.differences.push(ResourceDrift {
                            resource_id: resource_id.to_string(),
                            resource_type: resource_type.to_string(),
                            differing_keys: diffs,
                        });
                    }
                }
            }
        }

        for (resource_id, live_res) in &live_by_id {
            if !declared_by_id.contains_key(resource_id) {
                report.live_only.push(ResourceRef::from(*live_res));
            }
        }

        report.drift_detected = !report.differences.is_empty();
        Ok(report)
    }
}
