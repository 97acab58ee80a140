//! Buffered server responses.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::error::ConformanceResult;
use crate::headers::{ETAG, LOCATION, etag_version};
use crate::location::ResourceLocation;

/// A fully-read HTTP response from the server under test.
///
/// The body is buffered so that a response can be inspected any number of
/// times: once by the scenario, again by an assertion, and again when an
/// assertion formats its failure.
#[derive(Debug, Clone)]
pub struct FhirResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl FhirResponse {
    /// Creates a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Reads a reqwest response to completion.
    pub async fn from_reqwest(response: reqwest::Response) -> ConformanceResult<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(Self::new(status, headers, body))
    }

    /// Returns the numeric status code.
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the typed status code.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Returns all response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body text.
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON.
    pub fn json(&self) -> ConformanceResult<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Returns the parsed `Location` header.
    pub fn location(&self) -> Option<ResourceLocation> {
        self.headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(ResourceLocation::parse)
    }

    /// Returns the raw `ETag` header.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|v| v.to_str().ok())
    }

    /// Returns the version id carried by the `ETag` header.
    pub fn etag_version(&self) -> Option<String> {
        self.etag().and_then(etag_version)
    }

    /// Returns the `resourceType` of the body, if it is a JSON resource.
    pub fn resource_type(&self) -> Option<String> {
        self.json()
            .ok()?
            .get("resourceType")?
            .as_str()
            .map(str::to_string)
    }

    /// Returns the first `issue[].diagnostics` when the body is an
    /// OperationOutcome. An issue without diagnostics yields `"No details"`.
    pub fn operation_outcome_diagnostics(&self) -> Option<String> {
        let body = self.json().ok()?;
        if body.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
            return None;
        }
        let issue = body.get("issue")?.as_array()?.first()?;
        Some(
            issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .unwrap_or("No details")
                .to_string(),
        )
    }
}
