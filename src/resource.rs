//! Canonical cloud-resource representation.
//!
//! Declared-state records and live-polled records arrive in provider-specific
//! shapes; [`normalize_declared`] and [`normalize_live`] lift both into the
//! single [`Resource`] form at the boundary, tagged with a [`ResourceSource`],
//! so downstream logic never branches on raw shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Which collection pipeline produced a resource record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    /// Parsed from an uploaded declared-state snapshot.
    Declared,
    /// Polled from the cloud provider's APIs.
    Live,
}

impl ResourceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Live => "live",
        }
    }
}

impl std::fmt::Display for ResourceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "declared" => Ok(Self::Declared),
            "live" => Ok(Self::Live),
            _ => Err(format!("unknown resource source: {s}")),
        }
    }
}

/// One cloud-infrastructure object, regardless of source.
///
/// `(resource_type, resource_id, source)` is unique within a scope key;
/// `resource_id` is the join key between the declared and live views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Provider-defined kind, e.g. `compute-instance`.
    pub resource_type: String,
    /// Provider-assigned identifier, unique within region + account.
    pub resource_id: String,
    /// User-assigned logical name, when the provider exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// Normalized attribute mapping. Compared structurally — key order is
    /// irrelevant, value types are not coerced.
    pub attributes: Map<String, Value>,
    pub source: ResourceSource,
    pub region: String,
    pub account_id: String,
    pub indexed_at: DateTime<Utc>,
}

fn required_str(raw: &Value, key: &str) -> Result<String> {
    match raw.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(Error::normalization(format!(
            "record missing required field {key:?}"
        ))),
    }
}

fn optional_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalize a raw live-inventory record from the provider collaborator.
///
/// Expected shape: `resource_type` and `resource_id` (required), optional
/// `resource_name` and `region`, and an `attributes` object.
pub fn normalize_live(
    raw: &Value,
    default_region: &str,
    account_id: &str,
    indexed_at: DateTime<Utc>,
) -> Result<Resource> {
    let attributes = match raw.get("attributes") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(Error::normalization("attributes is not an object"));
        }
        None => Map::new(),
    };

    Ok(Resource {
        resource_type: required_str(raw, "resource_type")?,
        resource_id: required_str(raw, "resource_id")?,
        resource_name: optional_str(raw, "resource_name"),
        attributes,
        source: ResourceSource::Live,
        region: optional_str(raw, "region").unwrap_or_else(|| default_region.to_string()),
        account_id: account_id.to_string(),
        indexed_at,
    })
}

/// Normalize one declared-state instance into a [`Resource`].
///
/// The instance's full attribute object becomes `attributes`; the id comes
/// from the `id` attribute, the name from `name` or the `Name` tag.
pub fn normalize_declared(
    resource_type: &str,
    instance: &Value,
    default_region: &str,
    account_id: &str,
    indexed_at: DateTime<Utc>,
) -> Result<Resource> {
    if resource_type.is_empty() {
        return Err(Error::normalization("record missing required field \"type\""));
    }
    let attributes = match instance {
        Value::Object(map) => map.clone(),
        _ => return Err(Error::normalization("instance attributes is not an object")),
    };
    let resource_id = required_str(instance, "id")?;
    let resource_name = optional_str(instance, "name").or_else(|| {
        instance
            .get("tags")
            .and_then(|tags| tags.get("Name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    Ok(Resource {
        resource_type: resource_type.to_string(),
        resource_id,
        resource_name,
        attributes,
        source: ResourceSource::Declared,
        region: optional_str(instance, "region").unwrap_or_else(|| default_region.to_string()),
        account_id: account_id.to_string(),
        indexed_at,
    })
}

impl Resource {
    /// Searchable text for the document index: the attribute mapping as JSON.
    pub fn document_text(&self) -> String {
        Value::Object(self.attributes.clone()).to_string()
    }

    /// Flatten identifying fields into index metadata for round-tripping.
    pub fn to_metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("resource_type".into(), self.resource_type.clone().into());
        meta.insert("resource_id".into(), self.resource_id.clone().into());
        meta.insert(
            "resource_name".into(),
            self.resource_name.clone().unwrap_or_default().into(),
        );
        meta.insert("source".into(), self.source.as_str().into());
        meta.insert("region".into(), self.region.clone().into());
        meta.insert("account_id".into(), self.account_id.clone().into());
        meta.insert("indexed_at".into(), self.indexed_at.to_rfc3339().into());
        meta
    }

    /// Rebuild a resource from an indexed document's text + metadata.
    pub fn from_document(text: &str, metadata: &Map<String, Value>) -> Result<Self> {
        let attributes = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => {
                let mut map = Map::new();
                map.insert("raw".into(), text.into());
                map
            }
        };
        let get = |key: &str| {
            metadata
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let source = get("source")
            .parse::<ResourceSource>()
            .map_err(Error::normalization)?;
        let indexed_at = metadata
            .get("indexed_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default();

        Ok(Self {
            resource_type: get("resource_type"),
            resource_id: get("resource_id"),
            resource_name: Some(get("resource_name")).filter(|s| !s.is_empty()),
            attributes,
            source,
            region: get("region"),
            account_id: get("account_id"),
            indexed_at,
        })
    }
}
