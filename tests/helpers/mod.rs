//! Shared helpers for the integration suite.

#![allow(dead_code)]

pub mod fixtures;
pub mod mock_s3;
pub mod mock_upstream;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use airgate::guardrails::{GuardrailsConfig, PerformanceTracker, SessionStore};
use airgate::proxy::{upstream_client, Gateway};
use airgate::recorder::{Record, Writer};
use airgate::trust::AuditChain;

/// Build a gateway with recording into `runs_dir` and everything else off.
pub fn base_gateway(provider_url: &str, runs_dir: &Path) -> Gateway {
    Gateway {
        provider_url: provider_url.trim_end_matches('/').to_string(),
        gateway_key: None,
        upstream: upstream_client(),
        vault: None,
        recorder: Some(Arc::new(Writer::new(runs_dir).unwrap())),
        guardrails: None,
        sessions: None,
        chain: Some(Arc::new(AuditChain::new("test-signing-key"))),
        analytics: None,
        gateway_id: "airgate-test".to_string(),
        signing_key: "test-signing-key".to_string(),
        telemetry_enabled: false,
    }
}

/// Attach a guardrails config plus a session store to a gateway.
pub fn with_guardrails(mut gateway: Gateway, cfg: GuardrailsConfig) -> Gateway {
    gateway.guardrails = Some(Arc::new(cfg));
    gateway.sessions = Some(Arc::new(SessionStore::new(Duration::from_secs(300))));
    gateway
}

/// Attach an analytics tracker.
pub fn with_analytics(mut gateway: Gateway) -> Gateway {
    gateway.analytics = Some(Arc::new(PerformanceTracker::new()));
    gateway
}

/// Serve a gateway on an ephemeral port.
pub async fn spawn_gateway(gateway: Gateway) -> SocketAddr {
    let app = Arc::new(gateway).router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Wait for the AIR record of a run to land on disk. The recording path is
/// asynchronous, so poll with a bounded deadline.
pub async fn wait_for_record(runs_dir: &Path, run_id: &str) -> Record {
    let path = runs_dir.join(format!("{run_id}.air.json"));
    for _ in 0..100 {
        if path.exists() {
            if let Ok(record) = airgate::recorder::load(&path) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("AIR record {} never appeared", path.display());
}

/// The `x-run-id` header of a response; panics when absent.
pub fn run_id_of(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("x-run-id")
        .expect("x-run-id header missing")
        .to_str()
        .unwrap()
        .to_string()
}
