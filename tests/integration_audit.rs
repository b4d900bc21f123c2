//! Audit surface: chain status endpoint and signed evidence export.

mod helpers;

use helpers::fixtures;
use helpers::mock_upstream::MockUpstream;
use helpers::{base_gateway, run_id_of, spawn_gateway, wait_for_record, with_analytics, with_guardrails};

use airgate::trust::{verify_attestation, EvidencePackage};

#[tokio::test]
async fn audit_endpoint_reports_chain_and_compliance() {
    let fixture = fixtures::happy_path();
    let (upstream_addr, _upstream) = MockUpstream::json(&fixture.upstream_response).start().await;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = with_analytics(with_guardrails(
        base_gateway(&format!("http://{upstream_addr}"), runs_dir.path()),
        Default::default(),
    ));
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();

    // Empty chain first.
    let audit: serde_json::Value = client
        .get(format!("http://{addr}/v1/audit"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(audit["chain_length"], 0);
    assert_eq!(audit["chain_valid"], true);
    // SOC2 (12) + ISO27001 (10) controls.
    assert_eq!(audit["compliance"]["total_controls"], 22);

    // One recorded call grows the chain.
    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .body(fixture.request_body.clone())
        .send()
        .await
        .unwrap();
    let run_id = run_id_of(&response);
    wait_for_record(runs_dir.path(), &run_id).await;

    // Chain append follows the record write in the same task; poll until
    // the endpoint observes it.
    let mut chain_length = 0;
    for _ in 0..100 {
        let audit: serde_json::Value = client
            .get(format!("http://{addr}/v1/audit"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        chain_length = audit["chain_length"].as_u64().unwrap();
        if chain_length == 1 {
            assert_eq!(audit["chain_valid"], true);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(chain_length, 1);
}

#[tokio::test]
async fn audit_export_is_attestable() {
    let fixture = fixtures::happy_path();
    let (upstream_addr, _upstream) = MockUpstream::json(&fixture.upstream_response).start().await;

    let runs_dir = tempfile::tempdir().unwrap();
    let gateway = base_gateway(&format!("http://{upstream_addr}"), runs_dir.path());
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/v1/chat/completions"))
        .body(fixture.request_body.clone())
        .send()
        .await
        .unwrap();
    let run_id = run_id_of(&response);
    wait_for_record(runs_dir.path(), &run_id).await;

    let package: EvidencePackage = client
        .get(format!("http://{addr}/v1/audit/export"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(package.gateway_id, "airgate-test");
    assert!(package.chain_valid);
    assert!(!package.attestation.is_empty());

    // The exported package verifies under the gateway's signing key and
    // fails under any other.
    assert!(verify_attestation(&package, "test-signing-key"));
    assert!(!verify_attestation(&package, "some-other-key"));

    let mut tampered = package.clone();
    tampered.chain_length += 1;
    assert!(!verify_attestation(&tampered, "test-signing-key"));
}

#[tokio::test]
async fn audit_endpoints_require_the_gateway_key() {
    let runs_dir = tempfile::tempdir().unwrap();
    let mut gateway = base_gateway("http://127.0.0.1:1", runs_dir.path());
    gateway.gateway_key = Some("gw-secret".to_string());
    let addr = spawn_gateway(gateway).await;

    let client = reqwest::Client::new();
    for path in ["/v1/audit", "/v1/audit/export"] {
        let response = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401, "{path} without key");

        let response = client
            .get(format!("http://{addr}{path}"))
            .header("x-gateway-key", "gw-secret")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "{path} with key");
    }
}
