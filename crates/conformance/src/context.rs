//! Per-test isolation.
//!
//! A [`TestContext`] is created explicitly at the top of every scenario. It
//! owns the client and a ledger of everything the scenario created, and its
//! [`teardown`](TestContext::teardown) undoes those side effects whether the
//! scenario passed, failed or panicked.
//!
//! Teardown runs in three ordered, best-effort phases:
//!
//! 1. `DELETE` every ledger entry, in creation order.
//! 2. Conditional `DELETE` for every [`CleanupMarker`] the scenario declared.
//!    Markers catch resources created indirectly (e.g. inside a transaction
//!    whose response omits locations).
//! 3. `purgeschema` for every resource type touched, only when a purge key
//!    is configured.
//!
//! No phase fails the test. Problems are logged with `warn!` and collected
//! in the returned [`TeardownReport`].
//!
//! # Example
//!
//! ```rust,no_run
//! use helios_conformance::{CleanupMarker, TestContext, assertions, generators};
//! use serde_json::json;
//!
//! # async fn scenario() -> anyhow::Result<()> {
//! TestContext::from_env()?
//!     .with_marker(CleanupMarker::family("TransactionTest"))
//!     .run(async |ctx| {
//!         let response = ctx.create(&generators::patient(json!({}))).await?;
//!         assertions::assert_created(&response, "Patient")?;
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bundle;
use crate::client::FhirClient;
use crate::config::ConformanceConfig;
use crate::error::ConformanceResult;
use crate::location::ResourceLocation;
use crate::response::FhirResponse;
use crate::search::SearchParams;

/// A search that identifies resources a scenario creates indirectly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupMarker {
    /// Resource type to conditionally delete.
    pub resource_type: String,
    /// Search parameter name.
    pub param: String,
    /// Marker value embedded in the scenario's test data.
    pub value: String,
}

impl CleanupMarker {
    /// Creates a marker for `resource_type?param=value`.
    pub fn new(
        resource_type: impl Into<String>,
        param: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            param: param.into(),
            value: value.into(),
        }
    }

    /// Marker for Patients whose family name is `value`.
    pub fn family(value: impl Into<String>) -> Self {
        Self::new("Patient", "family", value)
    }

    /// The conditional-delete criteria.
    pub fn criteria(&self) -> SearchParams {
        SearchParams::new().param(self.param.clone(), &self.value)
    }
}

/// What teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Ledger entries whose delete returned 200 or 204. A 404 or 410 means
    /// the scenario already removed the resource and is not a failure.
    pub deleted: usize,
    /// Markers whose conditional delete returned 200 or 204.
    pub marker_deletes: usize,
    /// Resource types whose purge answered 2xx.
    pub purged: Vec<String>,
    /// Failures encountered (already logged).
    pub failures: Vec<String>,
}

impl TeardownReport {
    /// Returns true if no teardown step failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Explicit per-test state: client, configuration, creation ledger and
/// cleanup markers.
#[derive(Debug)]
pub struct TestContext {
    client: FhirClient,
    config: ConformanceConfig,
    ledger: Vec<ResourceLocation>,
    markers: Vec<CleanupMarker>,
}

impl TestContext {
    /// Creates a context with an empty ledger.
    pub fn new(config: ConformanceConfig) -> ConformanceResult<Self> {
        let client = FhirClient::new(&config)?;
        Ok(Self {
            client,
            config,
            ledger: Vec::new(),
            markers: Vec::new(),
        })
    }

    /// Creates a context from environment configuration.
    pub fn from_env() -> ConformanceResult<Self> {
        Self::new(ConformanceConfig::from_env()?)
    }

    /// Declares a marker to conditionally delete during teardown.
    pub fn with_marker(mut self, marker: CleanupMarker) -> Self {
        self.markers.push(marker);
        self
    }

    /// Returns the client.
    pub fn client(&self) -> &FhirClient {
        &self.client
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConformanceConfig {
        &self.config
    }

    /// Returns the resources recorded so far, in creation order.
    pub fn ledger(&self) -> &[ResourceLocation] {
        &self.ledger
    }

    /// Returns the declared markers.
    pub fn markers(&self) -> &[CleanupMarker] {
        &self.markers
    }

    /// Records a resource for deletion at teardown. Duplicates are ignored.
    pub fn track(&mut self, resource_type: impl Into<String>, id: impl Into<String>) {
        let location = ResourceLocation::new(resource_type, id);
        if !self.ledger.contains(&location) {
            debug!(resource = %location, "tracking created resource");
            self.ledger.push(location);
        }
    }

    fn track_response(&mut self, response: &FhirResponse) {
        let from_body = response.json().ok().and_then(|body| {
            let resource_type = body.get("resourceType")?.as_str()?.to_string();
            let id = body.get("id")?.as_str()?.to_string();
            Some(ResourceLocation::new(resource_type, id))
        });
        match from_body.or_else(|| response.location()) {
            Some(location) => self.track(location.resource_type, location.id),
            None => warn!(
                status = response.status(),
                "created resource has neither an id nor a Location; it will not be cleaned up"
            ),
        }
    }

    /// Creates a resource, recording it when the server answers 200 or 201.
    pub async fn create(&mut self, resource: &Value) -> ConformanceResult<FhirResponse> {
        let response = self.client.create(resource).await?;
        if matches!(response.status(), 200 | 201) {
            self.track_response(&response);
        }
        Ok(response)
    }

    /// Conditionally creates a resource, recording it when a new one was
    /// created (201).
    pub async fn conditional_create(
        &mut self,
        resource: &Value,
        criteria: &SearchParams,
    ) -> ConformanceResult<FhirResponse> {
        let response = self.client.conditional_create(resource, criteria).await?;
        if response.status() == 201 {
            self.track_response(&response);
        }
        Ok(response)
    }

    /// Updates a resource, recording it when the update created it (201).
    pub async fn update(
        &mut self,
        resource: &Value,
        if_match: Option<&str>,
    ) -> ConformanceResult<FhirResponse> {
        let response = self.client.update(resource, if_match).await?;
        if response.status() == 201 {
            self.track_response(&response);
        }
        Ok(response)
    }

    /// Submits a batch or transaction, recording every entry the server
    /// reports as created.
    pub async fn submit_bundle(&mut self, bundle: &Value) -> ConformanceResult<FhirResponse> {
        let response = self.client.submit_bundle(bundle).await?;
        if let Ok(body) = response.json() {
            for entry in bundle::entries(&body) {
                if bundle::entry_status(entry) == Some(201) {
                    if let Some(location) = bundle::entry_location(entry) {
                        self.track(location.resource_type, location.id);
                    }
                }
            }
        }
        Ok(response)
    }

    /// Runs a scenario body, then tears down regardless of its outcome.
    ///
    /// A panic inside `body` (a failed `assert!`) is re-raised after
    /// teardown has run.
    pub async fn run<T, F>(mut self, body: F) -> anyhow::Result<T>
    where
        F: AsyncFnOnce(&mut TestContext) -> anyhow::Result<T>,
    {
        let outcome = AssertUnwindSafe(body(&mut self)).catch_unwind().await;
        self.teardown().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Undoes the scenario's side effects. Never fails.
    pub async fn teardown(self) -> TeardownReport {
        let mut report = TeardownReport::default();
        let mut touched = BTreeSet::new();

        for location in &self.ledger {
            match self.client.delete(&location.resource_type, &location.id).await {
                Ok(response) => {
                    touched.insert(location.resource_type.clone());
                    match response.status() {
                        200 | 204 => report.deleted += 1,
                        404 | 410 => debug!(
                            resource = %location,
                            status = response.status(),
                            "resource already gone at teardown"
                        ),
                        status => {
                            warn!(resource = %location, status, "teardown delete rejected");
                            report
                                .failures
                                .push(format!("DELETE {}: status {}", location, status));
                        }
                    }
                }
                Err(e) => {
                    warn!(resource = %location, error = %e, "teardown delete failed");
                    report
                        .failures
                        .push(format!("DELETE {}: {}", location, e));
                }
            }
        }

        for marker in &self.markers {
            let criteria = marker.criteria();
            match self
                .client
                .conditional_delete(&marker.resource_type, &criteria)
                .await
            {
                Ok(response) if matches!(response.status(), 200 | 204) => {
                    touched.insert(marker.resource_type.clone());
                    report.marker_deletes += 1;
                }
                Ok(response) if response.status() < 400 || response.status() == 404 => {
                    debug!(
                        resource_type = %marker.resource_type,
                        criteria = %criteria,
                        status = response.status(),
                        "marker cleanup removed nothing"
                    );
                }
                Ok(response) => {
                    warn!(
                        resource_type = %marker.resource_type,
                        criteria = %criteria,
                        status = response.status(),
                        "marker cleanup rejected"
                    );
                    report.failures.push(format!(
                        "DELETE {}?{}: status {}",
                        marker.resource_type,
                        criteria,
                        response.status()
                    ));
                }
                Err(e) => {
                    warn!(
                        resource_type = %marker.resource_type,
                        criteria = %criteria,
                        error = %e,
                        "marker cleanup failed"
                    );
                    report.failures.push(format!(
                        "DELETE {}?{}: {}",
                        marker.resource_type, criteria, e
                    ));
                }
            }
        }

        match self.config.purge_key() {
            Some(key) => {
                for resource_type in &touched {
                    match self.client.purge_schema(resource_type, key).await {
                        Ok(response) if response.status_code().is_success() => {
                            report.purged.push(resource_type.clone())
                        }
                        Ok(response) => {
                            warn!(
                                resource_type = %resource_type,
                                status = response.status(),
                                "schema purge rejected"
                            );
                            report.failures.push(format!(
                                "purgeschema {}: status {}",
                                resource_type,
                                response.status()
                            ));
                        }
                        Err(e) => {
                            warn!(resource_type = %resource_type, error = %e, "schema purge failed");
                            report
                                .failures
                                .push(format!("purgeschema {}: {}", resource_type, e));
                        }
                    }
                }
            }
            None if !touched.is_empty() => {
                debug!("no purge key configured, skipping schema purge");
            }
            None => {}
        }

        info!(
            deleted = report.deleted,
            marker_deletes = report.marker_deletes,
            purged = report.purged.len(),
            failures = report.failures.len(),
            "teardown complete"
        );
        report
    }
}
