//! Request header construction and ETag handling.
//!
//! FHIR conditional interactions are expressed entirely through headers:
//!
//! | Header | Interaction |
//! |--------|-------------|
//! | `If-Match` | Version-aware update (optimistic locking) |
//! | `If-None-Match` | Conditional read (304 Not Modified) |
//! | `If-None-Exist` | Conditional create |

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::error::{ConformanceError, ConformanceResult};

/// The FHIR JSON media type.
pub const FHIR_JSON: &str = "application/fhir+json";

/// `If-Match` request header.
pub const IF_MATCH: HeaderName = header::IF_MATCH;
/// `If-None-Match` request header.
pub const IF_NONE_MATCH: HeaderName = header::IF_NONE_MATCH;
/// `If-None-Exist` request header (FHIR-specific).
pub const IF_NONE_EXIST: HeaderName = HeaderName::from_static("if-none-exist");
/// `ETag` response header.
pub const ETAG: HeaderName = header::ETAG;
/// `Location` response header.
pub const LOCATION: HeaderName = header::LOCATION;

/// Formats a version id as a weak ETag, `W/"<version>"`.
pub fn weak_etag(version_id: &str) -> String {
    format!("W/\"{}\"", version_id)
}

/// Extracts the version id from an ETag value.
///
/// Accepts the weak form `W/"3"`, a quoted strong form `"3"` and a bare `3`.
pub fn etag_version(etag: &str) -> Option<String> {
    let trimmed = etag.trim();
    let unweak = trimmed
        .strip_prefix("W/")
        .or_else(|| trimmed.strip_prefix("w/"))
        .unwrap_or(trimmed);
    let version = unweak.trim_matches('"');
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Builder for the headers of a single request.
///
/// `Accept` and `Content-Type` are always `application/fhir+json` unless a
/// scenario deliberately overrides the content type.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    /// Content-Type of the request body.
    content_type: String,
    /// If-Match (ETag) for version-aware updates.
    if_match: Option<String>,
    /// If-None-Match for conditional reads.
    if_none_match: Option<String>,
    /// If-None-Exist query for conditional creates.
    if_none_exist: Option<String>,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHeaders {
    /// Creates the default FHIR JSON headers.
    pub fn new() -> Self {
        Self {
            content_type: FHIR_JSON.to_string(),
            if_match: None,
            if_none_match: None,
            if_none_exist: None,
        }
    }

    /// Sets the Content-Type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets If-Match to the given ETag.
    pub fn with_if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    /// Sets If-None-Match to the given ETag.
    pub fn with_if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    /// Sets If-None-Exist to an already-encoded query string.
    pub fn with_if_none_exist(mut self, query: impl Into<String>) -> Self {
        self.if_none_exist = Some(query.into());
        self
    }

    /// Returns the If-Match value.
    pub fn if_match(&self) -> Option<&str> {
        self.if_match.as_deref()
    }

    /// Returns the If-None-Exist value.
    pub fn if_none_exist(&self) -> Option<&str> {
        self.if_none_exist.as_deref()
    }

    /// Converts to a reqwest HeaderMap.
    ///
    /// A value that is not valid header text is an error rather than being
    /// dropped, so a conditional request never goes out unconditionally.
    pub fn to_header_map(&self) -> ConformanceResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(header::ACCEPT, HeaderValue::from_static(FHIR_JSON));
        headers.insert(
            header::CONTENT_TYPE,
            header_value(&header::CONTENT_TYPE, &self.content_type)?,
        );

        let conditionals = [
            (IF_MATCH, &self.if_match),
            (IF_NONE_MATCH, &self.if_none_match),
            (IF_NONE_EXIST, &self.if_none_exist),
        ];
        for (name, value) in conditionals {
            if let Some(value) = value.as_deref() {
                let value = header_value(&name, value)?;
                headers.insert(name, value);
            }
        }

        Ok(headers)
    }
}

fn header_value(name: &HeaderName, value: &str) -> ConformanceResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        warn!(header = %name, value = %value, "refusing to send invalid header value");
        ConformanceError::InvalidHeader {
            name: name.to_string(),
            value: value.to_string(),
        }
    })
}
