//! FHIR response assertions.
//!
//! Each assertion judges a [`FhirResponse`] (or a decoded resource) against
//! the FHIR RESTful contract and either hands back the decoded body or an
//! [`AssertionError`] that carries the status, the first OperationOutcome
//! diagnostic and a body excerpt.
//!
//! | Assertion | Accepts |
//! |-----------|---------|
//! | [`assert_created`] | 201 + `Location` + matching `resourceType` |
//! | [`assert_read_success`] | 200 + matching `resourceType` |
//! | [`assert_updated`] | 200 |
//! | [`assert_deleted`] | 200 or 204 |
//! | [`assert_not_found`] | 404 or 410 + OperationOutcome |
//! | [`assert_bad_request`] | 400 + OperationOutcome |
//! | [`assert_conflict`] | 409 or 412 |
//! | [`assert_bundle`] | 200 + well-formed Bundle |

use serde_json::Value;

use crate::error::{AssertionError, AssertionResult};
use crate::response::FhirResponse;

fn failure(response: &FhirResponse, message: impl Into<String>) -> AssertionError {
    AssertionError::new(message).with_response(
        response.status(),
        response.operation_outcome_diagnostics(),
        response.text(),
    )
}

fn decode(response: &FhirResponse) -> AssertionResult<Value> {
    response
        .json()
        .map_err(|e| failure(response, format!("Response body is not valid JSON: {}", e)))
}

fn resource_type(resource: &Value) -> Option<&str> {
    resource.get("resourceType").and_then(Value::as_str)
}

fn expect_resource_type(
    response: &FhirResponse,
    body: &Value,
    expected: &str,
) -> AssertionResult<()> {
    match resource_type(body) {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(failure(
            response,
            format!("Expected {}, got {}", expected, actual.unwrap_or("no resourceType")),
        )),
    }
}

/// Asserts the exact status code.
pub fn assert_status(
    response: &FhirResponse,
    expected: u16,
    context: &str,
) -> AssertionResult<()> {
    let actual = response.status();
    if actual == expected {
        Ok(())
    } else {
        Err(failure(
            response,
            format!("{}: expected status {}, got {}", context, expected, actual),
        ))
    }
}

/// Asserts the status is one of `allowed`.
pub fn assert_status_in(response: &FhirResponse, allowed: &[u16]) -> AssertionResult<()> {
    let actual = response.status();
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(failure(
            response,
            format!("Expected status in {:?}, got {}", allowed, actual),
        ))
    }
}

/// Asserts a successful create and returns the created resource.
pub fn assert_created(response: &FhirResponse, expected_type: &str) -> AssertionResult<Value> {
    assert_status(response, 201, &format!("{} creation failed", expected_type))?;
    if response.header("location").is_none() {
        return Err(failure(
            response,
            "Location header missing from create response",
        ));
    }
    let body = decode(response)?;
    expect_resource_type(response, &body, expected_type)?;
    Ok(body)
}

/// Asserts a successful read and returns the resource.
pub fn assert_read_success(
    response: &FhirResponse,
    expected_type: &str,
) -> AssertionResult<Value> {
    assert_status(response, 200, &format!("{} read failed", expected_type))?;
    let body = decode(response)?;
    expect_resource_type(response, &body, expected_type)?;
    Ok(body)
}

/// Asserts a successful update and returns the updated resource.
pub fn assert_updated(response: &FhirResponse, expected_type: &str) -> AssertionResult<Value> {
    assert_status(response, 200, &format!("{} update failed", expected_type))?;
    decode(response)
}

/// Asserts a successful delete (200 or 204).
pub fn assert_deleted(response: &FhirResponse) -> AssertionResult<()> {
    match response.status() {
        200 | 204 => Ok(()),
        other => Err(failure(
            response,
            format!("Expected 200 or 204 for delete, got {}", other),
        )),
    }
}

/// Asserts 404 Not Found or 410 Gone with an OperationOutcome body.
pub fn assert_not_found(response: &FhirResponse) -> AssertionResult<Value> {
    let status = response.status();
    if status != 404 && status != 410 {
        return Err(failure(
            response,
            format!("Expected 404 Not Found or 410 Gone, got {}", status),
        ));
    }
    let body = decode(response)?;
    if resource_type(&body) != Some("OperationOutcome") {
        return Err(failure(response, "Expected OperationOutcome for 404/410"));
    }
    Ok(body)
}

/// Asserts 400 Bad Request with an OperationOutcome body.
pub fn assert_bad_request(response: &FhirResponse) -> AssertionResult<Value> {
    assert_status(response, 400, "Expected 400 Bad Request")?;
    let body = decode(response)?;
    if resource_type(&body) != Some("OperationOutcome") {
        return Err(failure(response, "Expected OperationOutcome for 400"));
    }
    Ok(body)
}

/// Asserts an optimistic-locking or precondition conflict (409 or 412).
pub fn assert_conflict(response: &FhirResponse) -> AssertionResult<()> {
    match response.status() {
        409 | 412 => Ok(()),
        other => Err(failure(
            response,
            format!("Expected 409 or 412 for conflict, got {}", other),
        )),
    }
}

/// Asserts a well-formed Bundle and returns it.
///
/// When `expected_type` is given, every entry whose `search.mode` is `match`
/// (the default when absent) must hold that resource type. Entries pulled in
/// by `_include`/`_revinclude` carry mode `include` and are not checked.
pub fn assert_bundle(
    response: &FhirResponse,
    expected_type: Option<&str>,
) -> AssertionResult<Value> {
    assert_status(response, 200, "Bundle search failed")?;
    let bundle = decode(response)?;

    if resource_type(&bundle) != Some("Bundle") {
        return Err(failure(
            response,
            format!(
                "Expected Bundle, got {}",
                resource_type(&bundle).unwrap_or("no resourceType")
            ),
        ));
    }
    if bundle.get("type").is_none() {
        return Err(failure(response, "Bundle missing type field"));
    }
    let total = bundle.get("total").and_then(Value::as_u64).unwrap_or(0);
    if bundle.get("entry").is_none() && total != 0 {
        return Err(failure(response, "Bundle missing entry field"));
    }

    if let Some(expected) = expected_type {
        for entry in crate::bundle::entries(&bundle) {
            if crate::bundle::search_mode(entry) != "match" {
                continue;
            }
            let actual = entry
                .get("resource")
                .and_then(resource_type)
                .unwrap_or("no resourceType");
            if actual != expected {
                return Err(failure(
                    response,
                    format!("Expected {} in bundle, got {}", expected, actual),
                ));
            }
        }
    }

    Ok(bundle)
}

/// Asserts the Bundle holds exactly `expected` entries.
pub fn assert_bundle_count(bundle: &Value, expected: usize) -> AssertionResult<()> {
    let actual = crate::bundle::entries(bundle).len();
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionError::new(format!(
            "Expected {} entries in Bundle, got {}",
            expected, actual
        )))
    }
}

/// Asserts some entry's resource has the given id.
pub fn assert_bundle_contains(bundle: &Value, id: &str) -> AssertionResult<()> {
    let found = crate::bundle::entries(bundle).iter().any(|entry| {
        entry
            .get("resource")
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            == Some(id)
    });
    if found {
        Ok(())
    } else {
        Err(AssertionError::new(format!(
            "Bundle does not contain resource with id={}",
            id
        )))
    }
}

/// Resolves a dotted path (`name.0.family`) against a resource.
///
/// Numeric segments index arrays; other segments select object keys.
pub fn resolve_path<'a>(resource: &'a Value, path: &str) -> AssertionResult<&'a Value> {
    let mut current = resource;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(index) => current.as_array().and_then(|a| a.get(index)).ok_or_else(|| {
                AssertionError::new(format!(
                    "Field path {} not found (array index {} out of bounds)",
                    path, index
                ))
            })?,
            Err(_) => current.get(part).ok_or_else(|| {
                AssertionError::new(format!(
                    "Field path {} not found (missing '{}')",
                    path, part
                ))
            })?,
        };
    }
    Ok(current)
}

/// Asserts a dotted path exists.
pub fn assert_resource_has_field(resource: &Value, path: &str) -> AssertionResult<()> {
    resolve_path(resource, path).map(|_| ())
}

/// Asserts a dotted path exists and equals `expected`.
pub fn assert_resource_field_equals(
    resource: &Value,
    path: &str,
    expected: &Value,
) -> AssertionResult<()> {
    let actual = resolve_path(resource, path)?;
    if actual == expected {
        Ok(())
    } else {
        Err(AssertionError::new(format!(
            "Expected {}={}, got {}",
            path, expected, actual
        )))
    }
}

/// Asserts the body is an OperationOutcome with at least one issue, and
/// optionally that some issue carries `severity`.
pub fn assert_operation_outcome(
    response: &FhirResponse,
    severity: Option<&str>,
) -> AssertionResult<Value> {
    let outcome = decode(response)?;
    if resource_type(&outcome) != Some("OperationOutcome") {
        return Err(failure(
            response,
            format!(
                "Expected OperationOutcome, got {}",
                resource_type(&outcome).unwrap_or("no resourceType")
            ),
        ));
    }
    let issues = outcome
        .get("issue")
        .and_then(Value::as_array)
        .ok_or_else(|| failure(response, "OperationOutcome missing issue array"))?;
    if issues.is_empty() {
        return Err(failure(response, "OperationOutcome has no issues"));
    }

    if let Some(expected) = severity {
        let severities: Vec<&str> = issues
            .iter()
            .filter_map(|i| i.get("severity").and_then(Value::as_str))
            .collect();
        if !severities.contains(&expected) {
            return Err(failure(
                response,
                format!(
                    "Expected issue with severity '{}', got {:?}",
                    expected, severities
                ),
            ));
        }
    }

    Ok(outcome)
}
