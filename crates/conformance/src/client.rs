//! HTTP client for the server under test.
//!
//! [`FhirClient`] maps each FHIR RESTful interaction onto exactly one HTTP
//! round trip and hands back the buffered [`FhirResponse`] without judging
//! it. There is no retry, no backoff and no status interpretation here;
//! transport failures surface as [`ConformanceError::Transport`].
//!
//! | Interaction | Request |
//! |-------------|---------|
//! | create | `POST [base]/[type]` (Bundles go to `POST [base]`) |
//! | read | `GET [base]/[type]/[id]` |
//! | vread | `GET [base]/[type]/[id]/_history/[vid]` |
//! | update | `PUT [base]/[type]/[id]` |
//! | delete | `DELETE [base]/[type]/[id]` |
//! | search | `GET [base]/[type]?[params]` |
//! | conditional create | `POST [base]/[type]` + `If-None-Exist` |
//! | conditional update | `PUT [base]/[type]?[params]` |
//! | conditional delete | `DELETE [base]/[type]?[params]` |
//! | history | `GET [base]/_history`, `[base]/[type]/_history`, `[base]/[type]/[id]/_history` |
//! | capabilities | `GET [base]/metadata` |

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::ConformanceConfig;
use crate::error::{ConformanceError, ConformanceResult};
use crate::headers::RequestHeaders;
use crate::response::FhirResponse;
use crate::search::SearchParams;

/// Which history endpoint to query.
///
/// The three levels are mutually exclusive, so they are variants rather
/// than a pair of optional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryLevel {
    /// `[base]/_history`
    System,
    /// `[base]/[type]/_history`
    Type(String),
    /// `[base]/[type]/[id]/_history`
    Instance {
        /// Resource type.
        resource_type: String,
        /// Logical id.
        id: String,
    },
}

impl HistoryLevel {
    /// Instance-level history.
    pub fn instance(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Instance {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Path of the history endpoint relative to the base.
    pub fn path(&self) -> String {
        match self {
            Self::System => "_history".to_string(),
            Self::Type(resource_type) => format!("{}/_history", resource_type),
            Self::Instance { resource_type, id } => {
                format!("{}/{}/_history", resource_type, id)
            }
        }
    }
}

/// Client for a FHIR R5 RESTful endpoint.
#[derive(Debug, Clone)]
pub struct FhirClient {
    http: reqwest::Client,
    base_url: String,
}

impl FhirClient {
    /// Creates a client from configuration.
    pub fn new(config: &ConformanceConfig) -> ConformanceResult<Self> {
        let base_url = config.base_url().to_string();
        url::Url::parse(&base_url).map_err(|e| ConformanceError::InvalidBaseUrl {
            url: base_url.clone(),
            message: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("helios-conformance/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Creates a client from environment configuration.
    pub fn from_env() -> ConformanceResult<Self> {
        Self::new(&ConformanceConfig::from_env()?)
    }

    /// Returns the base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Creates a resource.
    ///
    /// A `Bundle` is posted to the base URL so the server processes it as a
    /// batch or transaction. Any `id` in the payload is sent unchanged; the
    /// server is expected to ignore it.
    pub async fn create(&self, resource: &Value) -> ConformanceResult<FhirResponse> {
        let resource_type = resource_type_of(resource)?;
        let url = if resource_type == "Bundle" {
            self.base_url.clone()
        } else {
            self.url(resource_type)
        };
        self.send_json(Method::POST, url, RequestHeaders::new(), resource)
            .await
    }

    /// Posts a batch or transaction Bundle to the base URL.
    pub async fn submit_bundle(&self, bundle: &Value) -> ConformanceResult<FhirResponse> {
        self.send_json(
            Method::POST,
            self.base_url.clone(),
            RequestHeaders::new(),
            bundle,
        )
        .await
    }

    /// Reads the current version of a resource.
    pub async fn read(&self, resource_type: &str, id: &str) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.url(&format!("{}/{}", resource_type, id)),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Reads a resource with `If-None-Match`, allowing a 304 response.
    pub async fn read_if_none_match(
        &self,
        resource_type: &str,
        id: &str,
        etag: &str,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.url(&format!("{}/{}", resource_type, id)),
            RequestHeaders::new().with_if_none_match(etag),
            None,
        )
        .await
    }

    /// Reads a specific historical version of a resource.
    pub async fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version_id: &str,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.url(&format!("{}/{}/_history/{}", resource_type, id, version_id)),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Updates a resource at the instance endpoint named by its own `id`.
    ///
    /// With `if_match`, the server must reject the update (409/412) unless
    /// the current version matches the ETag.
    pub async fn update(
        &self,
        resource: &Value,
        if_match: Option<&str>,
    ) -> ConformanceResult<FhirResponse> {
        let resource_type = resource_type_of(resource)?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ConformanceError::MissingField {
                field: "id".to_string(),
            })?;

        let mut headers = RequestHeaders::new();
        if let Some(etag) = if_match {
            headers = headers.with_if_match(etag);
        }

        self.send_json(
            Method::PUT,
            self.url(&format!("{}/{}", resource_type, id)),
            headers,
            resource,
        )
        .await
    }

    /// Deletes a resource.
    pub async fn delete(&self, resource_type: &str, id: &str) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::DELETE,
            self.url(&format!("{}/{}", resource_type, id)),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Searches a resource type.
    pub async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.query_url(resource_type, params),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Creates a resource unless one already matches `criteria`.
    ///
    /// Expected outcomes: 201 when nothing matches, 200 with the existing
    /// resource when exactly one matches, 412 when several match.
    pub async fn conditional_create(
        &self,
        resource: &Value,
        criteria: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        let resource_type = resource_type_of(resource)?;
        let headers = RequestHeaders::new().with_if_none_exist(criteria.to_query_string());
        self.send_json(Method::POST, self.url(resource_type), headers, resource)
            .await
    }

    /// Updates the resource matching `criteria`.
    pub async fn conditional_update(
        &self,
        resource: &Value,
        criteria: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        let resource_type = resource_type_of(resource)?;
        self.send_json(
            Method::PUT,
            self.query_url(resource_type, criteria),
            RequestHeaders::new(),
            resource,
        )
        .await
    }

    /// Deletes the resources matching `criteria`.
    pub async fn conditional_delete(
        &self,
        resource_type: &str,
        criteria: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::DELETE,
            self.query_url(resource_type, criteria),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Reads history at the given level.
    pub async fn history(
        &self,
        level: &HistoryLevel,
        params: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.query_url(&level.path(), params),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Reads the history of one resource instance.
    pub async fn instance_history(
        &self,
        resource_type: &str,
        id: &str,
        params: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        self.history(&HistoryLevel::instance(resource_type, id), params)
            .await
    }

    /// Reads the history of every resource of a type.
    pub async fn type_history(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        self.history(&HistoryLevel::Type(resource_type.to_string()), params)
            .await
    }

    /// Reads system-wide history.
    pub async fn system_history(&self, params: &SearchParams) -> ConformanceResult<FhirResponse> {
        self.history(&HistoryLevel::System, params).await
    }

    /// Fetches the server's CapabilityStatement.
    pub async fn capabilities(&self) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.url("metadata"),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// GETs an absolute URL (such as a Bundle `next` link) or a path
    /// relative to the base.
    pub async fn get_url(&self, url: &str) -> ConformanceResult<FhirResponse> {
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            self.url(url)
        };
        self.send(Method::GET, url, RequestHeaders::new(), None)
            .await
    }

    /// Invokes the destructive `purgeschema` maintenance endpoint.
    pub async fn purge_schema(
        &self,
        resource_type: &str,
        key: &str,
    ) -> ConformanceResult<FhirResponse> {
        self.send(
            Method::GET,
            self.url(&format!("purgeschema/{}/{}", resource_type, key)),
            RequestHeaders::new(),
            None,
        )
        .await
    }

    /// Sends an arbitrary request body, bypassing JSON serialization.
    ///
    /// Used for malformed payloads, wrong media types and wrong methods.
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        headers: RequestHeaders,
        body: Option<Vec<u8>>,
    ) -> ConformanceResult<FhirResponse> {
        self.send(method, self.url(path), headers, body).await
    }

    fn query_url(&self, path: &str, params: &SearchParams) -> String {
        let url = self.url(path);
        if params.is_empty() {
            url
        } else {
            format!("{}?{}", url, params.to_query_string())
        }
    }

    async fn send_json(
        &self,
        method: Method,
        url: String,
        headers: RequestHeaders,
        body: &Value,
    ) -> ConformanceResult<FhirResponse> {
        let bytes = serde_json::to_vec(body)?;
        self.send(method, url, headers, Some(bytes)).await
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        headers: RequestHeaders,
        body: Option<Vec<u8>>,
    ) -> ConformanceResult<FhirResponse> {
        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(headers.to_header_map()?);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = FhirResponse::from_reqwest(request.send().await?).await?;
        debug!(
            method = %method,
            url = %url,
            status = response.status(),
            "FHIR interaction"
        );
        Ok(response)
    }
}

/// Returns the `resourceType` of a payload.
pub fn resource_type_of(resource: &Value) -> ConformanceResult<&str> {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| ConformanceError::MissingField {
            field: "resourceType".to_string(),
        })
}
