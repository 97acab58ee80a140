//! # helios-conformance - FHIR R5 RESTful API Conformance Harness
//!
//! This crate drives a FHIR R5 server purely over HTTP and checks that it
//! honours the [FHIR RESTful API](https://hl7.org/fhir/http.html) contract:
//! CRUD, versioning and history, conditional interactions, search (modifiers,
//! chaining, reverse chaining, composite parameters, `_include`/`_revinclude`,
//! paging), and batch/transaction Bundles. It implements no part of a server.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`client`] | One HTTP round trip per FHIR interaction, no interpretation |
//! | [`generators`] | Valid and deliberately invalid resource payloads |
//! | [`assertions`] | Pass/fail judgments over responses |
//! | [`context`] | Per-test ledger and best-effort teardown |
//! | [`bundle`] | Batch/transaction construction, Bundle inspection |
//! | [`search`] | Ordered, repeatable search parameters |
//! | [`location`] | Typed `Type/id/_history/vid` parsing |
//!
//! Control flows from a scenario through [`FhirClient`] to the server and
//! back as a [`FhirResponse`], which the [`assertions`] judge. A
//! [`TestContext`] wraps each scenario and removes what it created.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use helios_conformance::{TestContext, assertions, generators};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     helios_conformance::init_logging("debug");
//!
//!     TestContext::from_env()?
//!         .run(async |ctx| {
//!             let patient = generators::patient(json!({"gender": "female"}));
//!             let created = assertions::assert_created(&ctx.create(&patient).await?, "Patient")?;
//!
//!             let id = created["id"].as_str().unwrap_or_default();
//!             let read = ctx.client().read("Patient", id).await?;
//!             assertions::assert_read_success(&read, "Patient")?;
//!             Ok(())
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`config`] for the environment variables (`FHIR_BASE_URL`,
//! `FHIR_PURGE_KEY`, ...).

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod assertions;
pub mod bundle;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod generators;
pub mod headers;
pub mod location;
pub mod response;
pub mod search;

pub use client::{FhirClient, HistoryLevel};
pub use config::ConformanceConfig;
pub use context::{CleanupMarker, TeardownReport, TestContext};
pub use error::{AssertionError, AssertionResult, ConformanceError, ConformanceResult};
pub use location::ResourceLocation;
pub use reqwest::Method;
pub use response::FhirResponse;
pub use search::SearchParams;

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "helios_conformance={},reqwest=warn",
            level
        ))
    })
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` takes precedence; otherwise this crate logs at `level`.
///
/// # Panics
///
/// Panics if a global subscriber is already installed. Use
/// [`try_init_logging`] where that can happen.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter(level))
        .init();
}

/// Like [`init_logging`], but does nothing if a subscriber is already set.
///
/// Test binaries call this from every scenario.
pub fn try_init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(env_filter(level))
        .try_init();
}
