//! Bundle construction and inspection.
//!
//! [`BundleBuilder`] assembles batch and transaction Bundles entry by entry,
//! in the order the server must apply them. The free functions read the
//! parts of response Bundles (searchset, history, batch-response,
//! transaction-response) that scenarios check.
//!
//! # Example
//!
//! ```rust
//! use helios_conformance::bundle::{BundleBuilder, new_urn_uuid};
//! use serde_json::json;
//!
//! let patient_urn = new_urn_uuid();
//! let bundle = BundleBuilder::transaction()
//!     .create_with_full_url(&patient_urn, json!({"resourceType": "Patient"}))
//!     .create(json!({
//!         "resourceType": "Observation",
//!         "subject": {"reference": patient_urn},
//!     }))
//!     .build();
//!
//! assert_eq!(bundle["type"], "transaction");
//! assert_eq!(bundle["entry"][1]["request"]["url"], "Observation");
//! ```

use serde_json::{Value, json};

use crate::location::ResourceLocation;
use crate::search::SearchParams;

/// Batch or transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// Entries processed independently.
    Batch,
    /// Entries processed atomically, in order.
    Transaction,
}

impl BundleKind {
    /// The Bundle `type` code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Transaction => "transaction",
        }
    }
}

/// Builder for batch and transaction Bundles.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    kind: BundleKind,
    entries: Vec<Value>,
}

impl BundleBuilder {
    /// Starts a batch Bundle.
    pub fn batch() -> Self {
        Self {
            kind: BundleKind::Batch,
            entries: Vec::new(),
        }
    }

    /// Starts a transaction Bundle.
    pub fn transaction() -> Self {
        Self {
            kind: BundleKind::Transaction,
            entries: Vec::new(),
        }
    }

    /// Appends a raw entry.
    pub fn entry(mut self, entry: Value) -> Self {
        self.entries.push(entry);
        self
    }

    /// `POST [type]`.
    pub fn create(self, resource: Value) -> Self {
        let url = resource_type(&resource);
        self.entry(json!({
            "resource": resource,
            "request": {"method": "POST", "url": url},
        }))
    }

    /// `POST [type]` with a `fullUrl` (typically `urn:uuid:`) that later
    /// entries can reference.
    pub fn create_with_full_url(self, full_url: &str, resource: Value) -> Self {
        let url = resource_type(&resource);
        self.entry(json!({
            "fullUrl": full_url,
            "resource": resource,
            "request": {"method": "POST", "url": url},
        }))
    }

    /// `POST [type]` guarded by `ifNoneExist`.
    pub fn conditional_create(self, resource: Value, criteria: &SearchParams) -> Self {
        let url = resource_type(&resource);
        self.entry(json!({
            "resource": resource,
            "request": {
                "method": "POST",
                "url": url,
                "ifNoneExist": criteria.to_query_string(),
            },
        }))
    }

    /// `PUT [type]/[id]`, keyed by the resource's own id.
    pub fn update(self, resource: Value) -> Self {
        let url = format!(
            "{}/{}",
            resource_type(&resource),
            resource.get("id").and_then(Value::as_str).unwrap_or_default()
        );
        self.entry(json!({
            "resource": resource,
            "request": {"method": "PUT", "url": url},
        }))
    }

    /// `GET [url]`.
    pub fn get(self, url: &str) -> Self {
        self.entry(json!({ "request": {"method": "GET", "url": url} }))
    }

    /// `DELETE [url]`.
    pub fn delete(self, url: &str) -> Self {
        self.entry(json!({ "request": {"method": "DELETE", "url": url} }))
    }

    /// Number of entries so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produces the Bundle resource.
    pub fn build(self) -> Value {
        json!({
            "resourceType": "Bundle",
            "type": self.kind.as_str(),
            "entry": self.entries,
        })
    }
}

fn resource_type(resource: &Value) -> String {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Generates a fresh `urn:uuid:` full URL.
pub fn new_urn_uuid() -> String {
    format!("urn:uuid:{}", uuid::Uuid::new_v4())
}

/// Returns the entries of a Bundle (empty when absent).
pub fn entries(bundle: &Value) -> &[Value] {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Returns `Bundle.total`.
pub fn total(bundle: &Value) -> Option<u64> {
    bundle.get("total").and_then(Value::as_u64)
}

/// Returns the URL of the link with the given relation (`self`, `next`...).
pub fn link<'a>(bundle: &'a Value, relation: &str) -> Option<&'a str> {
    bundle
        .get("link")?
        .as_array()?
        .iter()
        .find(|l| l.get("relation").and_then(Value::as_str) == Some(relation))?
        .get("url")?
        .as_str()
}

/// Returns an entry's `search.mode`, defaulting to `match`.
pub fn search_mode(entry: &Value) -> &str {
    entry
        .get("search")
        .and_then(|s| s.get("mode"))
        .and_then(Value::as_str)
        .unwrap_or("match")
}

/// Parses an entry's `response.status` (`"201 Created"`) into a code.
pub fn entry_status(entry: &Value) -> Option<u16> {
    entry
        .get("response")?
        .get("status")?
        .as_str()?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

/// Parses an entry's `response.location`.
pub fn entry_location(entry: &Value) -> Option<ResourceLocation> {
    entry
        .get("response")?
        .get("location")?
        .as_str()
        .and_then(ResourceLocation::parse)
}

/// Returns the status code of every entry, in order.
pub fn entry_statuses(bundle: &Value) -> Vec<Option<u16>> {
    entries(bundle).iter().map(entry_status).collect()
}

/// Returns the resource of every entry that has one.
pub fn resources(bundle: &Value) -> impl Iterator<Item = &Value> {
    entries(bundle).iter().filter_map(|e| e.get("resource"))
}

/// Returns the resources of the given type.
pub fn resources_of_type<'a>(
    bundle: &'a Value,
    resource_type: &'a str,
) -> impl Iterator<Item = &'a Value> + 'a {
    resources(bundle)
        .filter(move |r| r.get("resourceType").and_then(Value::as_str) == Some(resource_type))
}

/// Returns the ids of every entry resource.
pub fn resource_ids(bundle: &Value) -> Vec<String> {
    resources(bundle)
        .filter_map(|r| r.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Returns the ids of primary (`match`) entries only.
pub fn match_ids(bundle: &Value) -> Vec<String> {
    entries(bundle)
        .iter()
        .filter(|e| search_mode(e) == "match")
        .filter_map(|e| e.get("resource")?.get("id")?.as_str())
        .map(str::to_string)
        .collect()
}
