//! Live-server scenario support.
//!
//! Scenarios only run when `RUN_FHIR_CONFORMANCE_TESTS=1`; otherwise they
//! print a skip notice and pass. Scenarios within one test binary share the
//! server's data, so they are serialized through [`LIVE_LOCK`].

use helios_conformance::{
    ConformanceResult, SearchParams, TestContext, assertions, bundle, try_init_logging,
};
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

/// Environment variable enabling live scenarios.
pub const LIVE_TESTS_ENV: &str = "RUN_FHIR_CONFORMANCE_TESTS";

static LIVE_LOCK: Mutex<()> = Mutex::const_new(());

/// Returns true when live scenarios are enabled.
pub fn run_live_tests() -> bool {
    std::env::var(LIVE_TESTS_ENV).ok().as_deref() == Some("1")
}

/// Returns a fresh context and the serialization guard, or `None` (after
/// printing a skip notice) when live scenarios are disabled.
pub async fn live_context() -> Option<(TestContext, MutexGuard<'static, ()>)> {
    if !run_live_tests() {
        eprintln!("skipping live FHIR test (set {}=1)", LIVE_TESTS_ENV);
        return None;
    }
    try_init_logging("info");
    let guard = LIVE_LOCK.lock().await;
    let ctx = TestContext::from_env()
        .unwrap_or_else(|e| panic!("invalid conformance configuration: {}", e));
    Some((ctx, guard))
}

/// Returns the `id` of a resource.
pub fn id_of(resource: &Value) -> anyhow::Result<String> {
    resource
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("resource has no id: {}", resource))
}

/// Returns `meta.versionId`, accepting either a string or a number.
pub fn version_of(resource: &Value) -> Option<String> {
    match resource.get("meta")?.get("versionId")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns `meta.versionId` as a number.
pub fn version_number(resource: &Value) -> anyhow::Result<u64> {
    version_of(resource)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("resource has no numeric meta.versionId"))
}

/// Returns `meta.lastUpdated`.
pub fn last_updated(resource: &Value) -> Option<String> {
    resource
        .get("meta")?
        .get("lastUpdated")?
        .as_str()
        .map(str::to_string)
}

/// Creates a resource through the ledger and asserts 201.
pub async fn create(ctx: &mut TestContext, resource: &Value) -> anyhow::Result<Value> {
    let resource_type = resource
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let response = ctx.create(resource).await?;
    Ok(assertions::assert_created(&response, &resource_type)?)
}

/// Creates resources in order and returns their ids.
pub async fn create_all(ctx: &mut TestContext, resources: &[Value]) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::with_capacity(resources.len());
    for resource in resources {
        ids.push(id_of(&create(ctx, resource).await?)?);
    }
    Ok(ids)
}

/// Searches and asserts a Bundle of `resource_type` matches.
pub async fn search(
    ctx: &TestContext,
    resource_type: &str,
    params: SearchParams,
) -> anyhow::Result<Value> {
    let response = ctx.client().search(resource_type, &params).await?;
    Ok(assertions::assert_bundle(&response, Some(resource_type))?)
}

/// Primary-match ids of a search.
pub async fn search_ids(
    ctx: &TestContext,
    resource_type: &str,
    params: SearchParams,
) -> anyhow::Result<Vec<String>> {
    Ok(bundle::match_ids(&search(ctx, resource_type, params).await?))
}

/// Reads a resource and asserts success.
pub async fn read(ctx: &TestContext, resource_type: &str, id: &str) -> ConformanceResult<Value> {
    let response = ctx.client().read(resource_type, id).await?;
    Ok(assertions::assert_read_success(&response, resource_type)?)
}
