//! Harness configuration.
//!
//! Configuration is read from environment variables so that scenario test
//! binaries (whose argv belongs to the libtest runner) and the
//! `fhir-conformance` binary share one source of truth.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FHIR_BASE_URL` | http://localhost:8080/fhir | Base URL of the server under test |
//! | `FHIR_LOG_LEVEL` | info | Log level |
//! | `FHIR_REQUEST_TIMEOUT` | 30 | Per-request timeout (seconds) |
//! | `FHIR_PURGE_KEY` | (unset) | Key for the `purgeschema` maintenance endpoint |
//!
//! # Example
//!
//! ```rust
//! use helios_conformance::ConformanceConfig;
//!
//! let config = ConformanceConfig {
//!     base_url: "http://fhir.example.org/r5/".to_string(),
//!     ..Default::default()
//! };
//! assert_eq!(config.base_url(), "http://fhir.example.org/r5");
//! ```

use std::time::Duration;

use clap::Parser;

/// Default base URL of the server under test.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/fhir";

/// Configuration for the conformance harness.
#[derive(Debug, Clone, Parser)]
#[command(name = "fhir-conformance")]
#[command(about = "FHIR R5 RESTful API conformance harness")]
pub struct ConformanceConfig {
    /// Base URL of the FHIR server under test.
    #[arg(long, env = "FHIR_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "FHIR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Request timeout in seconds.
    #[arg(long, env = "FHIR_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Key for the destructive `purgeschema` endpoint. Purging is skipped
    /// during teardown when unset.
    #[arg(long, env = "FHIR_PURGE_KEY", hide_env_values = true)]
    pub purge_key: Option<String>,
}

impl Default for ConformanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            log_level: "info".to_string(),
            request_timeout: 30,
            purge_key: None,
        }
    }
}

impl ConformanceConfig {
    /// Reads the configuration from environment variables only.
    ///
    /// Command line arguments are ignored: under `cargo test` they belong to
    /// the test runner. A variable that fails to parse is an error; the other
    /// variables are never silently replaced by defaults.
    pub fn from_env() -> Result<Self, clap::Error> {
        Self::try_parse_from(["fhir-conformance"])
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Returns the purge key, if one is configured and non-blank.
    pub fn purge_key(&self) -> Option<&str> {
        self.purge_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match url::Url::parse(self.base_url()) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(format!(
                "Base URL must use http or https, got '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("Base URL '{}' is invalid: {}", self.base_url, e)),
        }

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if matches!(&self.purge_key, Some(key) if key.trim().is_empty()) {
            errors.push("Purge key cannot be blank".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration pointed at a local stub server.
    pub fn for_testing(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            log_level: "debug".to_string(),
            request_timeout: 5,
            purge_key: None,
        }
    }

    /// Sets the purge key.
    pub fn with_purge_key(mut self, key: impl Into<String>) -> Self {
        self.purge_key = Some(key.into());
        self
    }
}
