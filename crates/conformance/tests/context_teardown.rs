//! Ledger and teardown tests.
//!
//! Drives a [`TestContext`] against the stub server and checks:
//! - Which responses are recorded in the ledger
//! - The order of teardown requests (deletes, markers, purges)
//! - That teardown runs when a scenario errors or panics

mod common;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::stub::{RecordedRequest, StubReply, StubServer};
use futures::FutureExt;
use helios_conformance::bundle::BundleBuilder;
use helios_conformance::{CleanupMarker, TestContext, generators};
use serde_json::json;

/// A stub that behaves like a small FHIR server: POSTs create numbered
/// resources, DELETEs succeed with 204, everything else answers 200.
async fn fhir_like_stub() -> StubServer {
    let counter = Arc::new(AtomicUsize::new(0));
    StubServer::start(move |request: &RecordedRequest| {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/fhir") => StubReply::json(
                200,
                json!({
                    "resourceType": "Bundle",
                    "type": "transaction-response",
                    "entry": [
                        {"response": {"status": "201 Created", "location": "Patient/tx-1/_history/1"}},
                        {"response": {"status": "200 OK", "location": "Patient/existing/_history/3"}},
                        {"response": {"status": "201 Created", "location": "Observation/tx-2/_history/1"}}
                    ]
                }),
            ),
            ("POST", path) => {
                let resource_type = path.trim_start_matches("/fhir/").to_string();
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let id = format!("{}-{}", resource_type.to_lowercase(), n);
                StubReply::json(
                    201,
                    json!({"resourceType": resource_type, "id": id, "meta": {"versionId": "1"}}),
                )
                .with_header("location", &format!("{}/{}/_history/1", resource_type, id))
            }
            ("DELETE", _) => StubReply::empty(204),
            ("PUT", path) if path.ends_with("/brand-new") => StubReply::json(
                201,
                json!({"resourceType": "Patient", "id": "brand-new"}),
            ),
            _ => StubReply::json(200, json!({"resourceType": "Patient", "id": "x"})),
        }
    })
    .await
}

fn summary(requests: &[RecordedRequest]) -> Vec<String> {
    requests
        .iter()
        .map(|r| match &r.query {
            Some(q) => format!("{} {}?{}", r.method, r.path, q),
            None => format!("{} {}", r.method, r.path),
        })
        .collect()
}

#[tokio::test]
async fn test_teardown_order_with_purge_key() {
    let stub = fhir_like_stub().await;
    let config = stub.config().with_purge_key("purge-secret");
    let mut ctx = TestContext::new(config)
        .unwrap()
        .with_marker(CleanupMarker::family("TransactionTest"));

    ctx.create(&generators::patient(json!({}))).await.unwrap();
    ctx.create(&generators::observation(Default::default(), json!({})))
        .await
        .unwrap();
    assert_eq!(ctx.ledger().len(), 2);

    let report = ctx.teardown().await;

    assert_eq!(report.deleted, 2);
    assert_eq!(report.marker_deletes, 1);
    assert_eq!(report.purged, vec!["Observation", "Patient"]);
    assert!(report.is_clean());

    assert_eq!(
        summary(&stub.requests()),
        vec![
            "POST /fhir/Patient",
            "POST /fhir/Observation",
            "DELETE /fhir/Patient/patient-1",
            "DELETE /fhir/Observation/observation-2",
            "DELETE /fhir/Patient?family=TransactionTest",
            "GET /fhir/purgeschema/Observation/purge-secret",
            "GET /fhir/purgeschema/Patient/purge-secret",
        ]
    );
}

#[tokio::test]
async fn test_teardown_without_purge_key_skips_purge() {
    let stub = fhir_like_stub().await;
    let mut ctx = TestContext::new(stub.config()).unwrap();

    ctx.create(&generators::patient(json!({}))).await.unwrap();
    let report = ctx.teardown().await;

    assert!(report.purged.is_empty());
    assert!(
        stub.requests()
            .iter()
            .all(|r| !r.path.contains("purgeschema"))
    );
}

#[tokio::test]
async fn test_failed_create_is_not_tracked() {
    let stub = StubServer::always(StubReply::json(
        400,
        json!({"resourceType": "OperationOutcome", "issue": [{"severity": "error"}]}),
    ))
    .await;
    let mut ctx = TestContext::new(stub.config()).unwrap();

    let response = ctx
        .create(&generators::invalid_patient(
            generators::InvalidPatient::InvalidValue,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    assert!(ctx.ledger().is_empty());
}

#[tokio::test]
async fn test_bundle_entries_created_are_tracked() {
    let stub = fhir_like_stub().await;
    let mut ctx = TestContext::new(stub.config()).unwrap();

    let bundle = BundleBuilder::transaction()
        .create(json!({"resourceType": "Patient"}))
        .build();
    ctx.submit_bundle(&bundle).await.unwrap();

    let refs: Vec<_> = ctx.ledger().iter().map(|l| l.reference()).collect();
    assert_eq!(refs, vec!["Patient/tx-1", "Observation/tx-2"]);
}

#[tokio::test]
async fn test_update_as_create_is_tracked() {
    let stub = fhir_like_stub().await;
    let mut ctx = TestContext::new(stub.config()).unwrap();

    ctx.update(&json!({"resourceType": "Patient", "id": "existing"}), None)
        .await
        .unwrap();
    assert!(ctx.ledger().is_empty());

    ctx.update(&json!({"resourceType": "Patient", "id": "brand-new"}), None)
        .await
        .unwrap();
    assert_eq!(ctx.ledger()[0].reference(), "Patient/brand-new");
}

#[tokio::test]
async fn test_run_tears_down_after_error() {
    let stub = fhir_like_stub().await;
    let ctx = TestContext::new(stub.config()).unwrap();

    let result: anyhow::Result<()> = ctx
        .run(async |ctx| {
            ctx.create(&json!({"resourceType": "Patient"})).await?;
            anyhow::bail!("scenario failed")
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "scenario failed");
    let last = stub.requests().pop().unwrap();
    assert_eq!(last.method, "DELETE");
    assert_eq!(last.path, "/fhir/Patient/patient-1");
}

#[tokio::test]
async fn test_run_tears_down_after_panic() {
    let stub = fhir_like_stub().await;
    let ctx = TestContext::new(stub.config()).unwrap();

    let outcome = AssertUnwindSafe(ctx.run(async |ctx| {
        ctx.create(&json!({"resourceType": "Patient"})).await?;
        assert!(ctx.ledger().is_empty(), "assertion inside scenario");
        Ok::<(), anyhow::Error>(())
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    let methods: Vec<_> = stub.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec!["POST", "DELETE"]);
}

#[tokio::test]
async fn test_rejected_cleanup_is_reported() {
    let stub = StubServer::start(|request: &RecordedRequest| {
        match (request.method.as_str(), request.query.as_deref()) {
            ("DELETE", Some(_)) => StubReply::empty(409),
            ("DELETE", None) => StubReply::json(
                500,
                json!({"resourceType": "OperationOutcome", "issue": [{"severity": "error"}]}),
            ),
            _ => StubReply::empty(403),
        }
    })
    .await;
    let config = stub.config().with_purge_key("wrong");
    let mut ctx = TestContext::new(config)
        .unwrap()
        .with_marker(CleanupMarker::family("TestRollback"));
    ctx.track("Patient", "p1");

    let report = ctx.teardown().await;

    assert_eq!(report.deleted, 0);
    assert_eq!(report.marker_deletes, 0);
    assert!(report.purged.is_empty());
    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 3, "{:?}", report.failures);
    assert!(report.failures[0].contains("Patient/p1"));
    assert!(report.failures[0].contains("500"));
    assert!(report.failures[1].contains("family=TestRollback"));
    assert!(report.failures[2].starts_with("purgeschema Patient"));
    assert!(report.failures[2].contains("403"));
}

#[tokio::test]
async fn test_already_deleted_resources_are_not_failures() {
    let stub = StubServer::start(|request: &RecordedRequest| {
        if request.path.ends_with("/gone") {
            StubReply::empty(410)
        } else {
            StubReply::empty(404)
        }
    })
    .await;
    let mut ctx = TestContext::new(stub.config())
        .unwrap()
        .with_marker(CleanupMarker::family("NothingLeft"));
    ctx.track("Patient", "gone");
    ctx.track("Patient", "missing");

    let report = ctx.teardown().await;

    assert_eq!(report.deleted, 0);
    assert!(report.is_clean(), "{:?}", report.failures);
}
