//! Declared-state snapshot parsing.
//!
//! Lifts the resource instances out of an uploaded state snapshot into
//! canonical declared [`Resource`]s. Understands the version-4 layout
//! (`resources[].instances[].attributes`) and the legacy `modules` layout of
//! version 3 and below. Records missing required fields are skipped and
//! reported, never dropped silently.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::resource::{normalize_declared, Resource};

/// Result of parsing one snapshot: the normalized resources plus one entry
/// per record that failed normalization.
#[derive(Debug, Default)]
pub struct ParsedSnapshot {
    pub resources: Vec<Resource>,
    pub errors: Vec<String>,
}

/// Parse a declared-state snapshot document.
///
/// Malformed JSON fails the whole snapshot; individual malformed records are
/// collected in [`ParsedSnapshot::errors`].
pub fn parse_snapshot(
    content: &str,
    default_region: &str,
    account_id: &str,
    indexed_at: DateTime<Utc>,
) -> Result<ParsedSnapshot> {
    let state: Value = serde_json::from_str(content)
        .map_err(|e| Error::normalization(format!("snapshot is not valid JSON: {e}")))?;

    let version = state.get("version").and_then(Value::as_i64).unwrap_or(4);
    if version >= 4 {
        Ok(parse_v4(&state, default_region, account_id, indexed_at))
    } else {
        Ok(parse_legacy(&state, default_region, account_id, indexed_at))
    }
}

fn parse_v4(
    state: &Value,
    default_region: &str,
    account_id: &str,
    indexed_at: DateTime<Utc>,
) -> ParsedSnapshot {
    let mut out = ParsedSnapshot::default();

    let resources = state
        .get("resources")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for block in &resources {
        let resource_type = block.get("type").and_then(Value::as_str).unwrap_or_default();
        let block_name = block.get("name").and_then(Value::as_str).unwrap_or("?");
        let instances = block
            .get("instances")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for instance in &instances {
            let attributes = instance.get("attributes").cloned().unwrap_or(Value::Null);
            match normalize_declared(
                resource_type,
                &attributes,
                default_region,
                account_id,
                indexed_at,
            ) {
                Ok(resource) => out.resources.push(resource),
                Err(e) => out
                    .errors
                    .push(format!("{resource_type}.{block_name}: {e}")),
            }
        }
    }

    out
}

/// Version 3 and below: resources keyed `"type.name"` under `modules[]`,
/// with attributes at `primary.attributes`.
fn parse_legacy(
    state: &Value,
    default_region: &str,
    account_id: &str,
    indexed_at: DateTime<Utc>,
) -> ParsedSnapshot {
    let mut out = ParsedSnapshot::default();

    let modules = state
        .get("modules")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for module in &modules {
        let Some(resources) = module.get("resources").and_then(Value::as_object) else {
            continue;
        };
        for (resource_key, resource_data) in resources {
            let resource_type = resource_key.split('.').next().unwrap_or(resource_key);
            let attributes = resource_data
                .get("primary")
                .and_then(|p| p.get("attributes"))
                .cloned()
                .unwrap_or(Value::Null);
            match normalize_declared(
                resource_type,
                &attributes,
                default_region,
                account_id,
                indexed_at,
            ) {
                Ok(resource) => out.resources.push(resource),
                Err(e) => out.errors.push(format!("{resource_key}: {e}")),
            }
        }
    }

    out
}
