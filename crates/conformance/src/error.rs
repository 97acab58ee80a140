//! Error types for the conformance harness.
//!
//! Two families of failure exist and are kept apart:
//!
//! | Type | Raised when |
//! |------|-------------|
//! | [`ConformanceError`] | The harness itself cannot do its job (transport, config, malformed input) |
//! | [`AssertionError`] | The server answered, but not the way the FHIR contract requires |
//!
//! The client never interprets status codes. A 404 is a perfectly good
//! [`FhirResponse`](crate::FhirResponse); only the assertion layer turns it
//! into an [`AssertionError`].

use std::fmt;

use thiserror::Error;

/// Maximum number of body characters carried into an assertion failure.
pub const BODY_EXCERPT_LIMIT: usize = 500;

/// Errors raised by the harness while talking to the server under test.
#[derive(Error, Debug)]
pub enum ConformanceError {
    /// The HTTP round trip failed (connection refused, timeout, TLS...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A payload could not be serialized or a response could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured base URL is unusable.
    #[error("invalid base URL '{url}': {message}")]
    InvalidBaseUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// A resource lacks a field the operation needs to build its URL.
    #[error("resource is missing required field '{field}'")]
    MissingField {
        /// Name of the absent field (`resourceType`, `id`).
        field: String,
    },

    /// An operation needs configuration that was not supplied.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// An environment variable holds a value that cannot be parsed.
    #[error("invalid environment configuration: {0}")]
    Environment(#[from] clap::Error),

    /// A request header value is not valid header text.
    #[error("invalid value for header '{name}': {value:?}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// A response failed a FHIR contract check.
    #[error(transparent)]
    Assertion(#[from] AssertionError),
}

/// A failed expectation about a server response.
///
/// Carries enough context to diagnose the failure without re-running the
/// scenario: the status that was observed, the first OperationOutcome
/// diagnostic (when the body is one) and a bounded excerpt of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionError {
    /// What was expected.
    pub message: String,
    /// Status code observed, if the failure concerns a response.
    pub status: Option<u16>,
    /// First `issue[].diagnostics` of an OperationOutcome body.
    pub diagnostics: Option<String>,
    /// Response body, truncated to [`BODY_EXCERPT_LIMIT`] characters.
    pub body: Option<String>,
}

impl AssertionError {
    /// Creates a failure that is not tied to a response (e.g. a field check).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            diagnostics: None,
            body: None,
        }
    }

    /// Attaches response context.
    pub fn with_response(
        mut self,
        status: u16,
        diagnostics: Option<String>,
        body: &str,
    ) -> Self {
        self.status = Some(status);
        self.diagnostics = diagnostics;
        self.body = Some(excerpt(body));
        self
    }
}

impl fmt::Display for AssertionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, " (status {})", status)?;
        }
        if let Some(diagnostics) = &self.diagnostics {
            write!(f, "\nOperationOutcome: {}", diagnostics)?;
        }
        if let Some(body) = &self.body {
            write!(f, "\nResponse: {}", body)?;
        }
        Ok(())
    }
}

impl std::error::Error for AssertionError {}

/// Truncates a body on a character boundary.
pub fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LIMIT).collect()
}

/// Result alias for harness operations.
pub type ConformanceResult<T> = Result<T, ConformanceError>;

/// Result alias for assertions.
pub type AssertionResult<T> = Result<T, AssertionError>;
