//! Cloud inventory collaborator contract.
//!
//! The provider query layer is external: the core consumes its structured
//! output only. A failed fetch for one resource type surfaces as
//! [`crate::error::Error::Provider`] and never aborts the other types.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};

/// Source of raw live-resource records, keyed by resource type and region.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Provider name (e.g. "fixture").
    fn provider(&self) -> &str;

    /// Fetch raw records for one resource type in one region.
    async fn fetch(&self, resource_type: &str, region: &str) -> Result<Vec<Value>>;
}

/// Canned inventory for development and tests: records registered per
/// `(resource_type, region)`, with optional per-type failures.
#[derive(Default)]
pub struct FixtureSource {
    records: HashMap<(String, String), Vec<Value>>,
    failures: HashMap<String, String>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(
        mut self,
        resource_type: &str,
        region: &str,
        records: Vec<Value>,
    ) -> Self {
        self.records
            .insert((resource_type.to_string(), region.to_string()), records);
        self
    }

    /// Make every fetch for `resource_type` fail with `reason`.
    pub fn with_failure(mut self, resource_type: &str, reason: &str) -> Self {
        self.failures
            .insert(resource_type.to_string(), reason.to_string());
        self
    }
}

#[async_trait]
impl InventorySource for FixtureSource {
    fn provider(&self) -> &str {
        "fixture"
    }

    async fn fetch(&self, resource_type: &str, region: &str) -> Result<Vec<Value>> {
        if let Some(reason) = self.failures.get(resource_type) {
            return Err(Error::Provider {
                resource_type: resource_type.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .records
            .get(&(resource_type.to_string(), region.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
