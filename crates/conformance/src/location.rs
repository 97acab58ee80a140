//! Typed parsing of resource locations.
//!
//! Servers report where a resource lives in several places: the `Location`
//! header of a create, `Bundle.entry.response.location` of a batch or
//! transaction response, and `Bundle.entry.fullUrl`. All of them share the
//! shape `[base/]Type/id[/_history/vid]`, which [`ResourceLocation`] parses
//! once so scenarios never split strings themselves.

use std::fmt;
use std::str::FromStr;

/// A parsed `Type/id[/_history/vid]` location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocation {
    /// Resource type, e.g. `Patient`.
    pub resource_type: String,
    /// Logical id.
    pub id: String,
    /// Version id, when the location points at a specific version.
    pub version_id: Option<String>,
}

impl ResourceLocation {
    /// Creates a location without a version.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: None,
        }
    }

    /// Parses a relative or absolute location.
    ///
    /// Returns `None` when the value does not end in a `Type/id` pair (with
    /// an optional `_history/vid` suffix) or the type segment does not look
    /// like a FHIR resource type.
    pub fn parse(value: &str) -> Option<Self> {
        let path = value
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let (resource_type, id, version_id) = match segments.as_slice() {
            [.., ty, id, "_history", vid] => (*ty, *id, Some(*vid)),
            [.., ty, id] => (*ty, *id, None),
            _ => return None,
        };

        if !is_resource_type(resource_type) || id == "_history" {
            return None;
        }

        Some(Self {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            version_id: version_id.map(str::to_string),
        })
    }

    /// Renders the relative reference `Type/id`.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version_id {
            Some(vid) => write!(f, "{}/{}/_history/{}", self.resource_type, self.id, vid),
            None => write!(f, "{}/{}", self.resource_type, self.id),
        }
    }
}

impl FromStr for ResourceLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a resource location: '{}'", s))
    }
}

fn is_resource_type(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}
