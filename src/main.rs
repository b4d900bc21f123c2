//! airgate gateway binary.
//!
//! Startup is phased: observability first, then best-effort ancillary
//! subsystems (vault, recorder, guardrails, trust), then the listener.
//! A missing ancillary subsystem downgrades capability, never aborts —
//! the proxy must keep forwarding when everything else is broken.

use std::sync::Arc;
use std::time::Duration;

use airgate::config::{Args, Settings};
use airgate::guardrails::{self, PerformanceTracker, SessionStore};
use airgate::proxy::{upstream_client, Gateway};
use airgate::recorder::Writer;
use airgate::telemetry::{self, TelemetryConfig};
use airgate::trust::AuditChain;
use airgate::vault;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// In-flight requests get this long to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Sessions idle longer than this are evicted by the sweeper.
const SESSION_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Phase 1: observability.
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_args(Args::parse());

    let telemetry_config = TelemetryConfig::from_env();
    let telemetry_enabled = telemetry_config.enabled();
    let telemetry_guard = match telemetry::init_telemetry(&telemetry_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!(error = %e, "OTel tracing disabled");
            None
        }
    };

    // Phase 2: ancillary subsystems, each best-effort.
    let vault_client = match &settings.vault {
        Some(cfg) => match vault::Client::connect(cfg.clone()).await {
            Ok(client) => {
                info!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "vault connected");
                Some(Arc::new(client))
            }
            Err(e) => {
                warn!(error = %e, "vault disabled (gateway will proxy without content storage)");
                None
            }
        },
        None => {
            warn!("VAULT_ENDPOINT not set — vault storage disabled");
            None
        }
    };

    let recorder = match Writer::new(&settings.runs_dir) {
        Ok(writer) => {
            info!(dir = %settings.runs_dir.display(), "AIR records enabled");
            Some(Arc::new(writer))
        }
        Err(e) => {
            warn!(error = %e, "AIR recording disabled");
            None
        }
    };

    let guardrails_config = match &settings.guardrails_path {
        Some(path) => match guardrails::config::load(path) {
            Ok(cfg) => {
                info!(path = %path.display(), "guardrails enabled");
                Some(Arc::new(cfg))
            }
            Err(e) => {
                error!(error = %e, "invalid guardrails config");
                return Err(e.into());
            }
        },
        None => None,
    };

    let shutdown = CancellationToken::new();

    let sessions = guardrails_config.as_ref().map(|_| {
        let store = Arc::new(SessionStore::new(SESSION_TTL));
        let _ = Arc::clone(&store).spawn_sweeper(shutdown.clone());
        store
    });

    let analytics = guardrails_config
        .as_ref()
        .filter(|cfg| cfg.optimization.analytics.enabled)
        .map(|_| Arc::new(PerformanceTracker::new()));

    if settings.gateway_key.is_some() {
        info!("gateway authentication enabled (X-Gateway-Key header required)");
    } else {
        info!("gateway authentication disabled (set GATEWAY_KEY to require auth)");
    }
    if settings.signing_key.is_empty() {
        warn!("TRUST_SIGNING_KEY not set — audit chain signatures are decorative");
    }

    let chain = Arc::new(AuditChain::new(settings.signing_key.clone()));

    // Phase 3: gateway state and listener.
    let gateway = Arc::new(Gateway {
        provider_url: settings.provider_url.clone(),
        gateway_key: settings.gateway_key.clone(),
        upstream: upstream_client(),
        vault: vault_client,
        recorder,
        guardrails: guardrails_config,
        sessions,
        chain: Some(chain),
        analytics,
        gateway_id: "airgate".to_string(),
        signing_key: settings.signing_key.clone(),
        telemetry_enabled,
    });

    let app = gateway.router();
    let listener = tokio::net::TcpListener::bind(&settings.listen_addr).await?;
    info!(
        addr = %settings.listen_addr,
        provider = %settings.provider_url,
        "airgate listening"
    );

    spawn_signal_handlers(shutdown.clone());

    let serve_shutdown = shutdown.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        serve_shutdown.cancelled().await;
    });

    // Drain in-flight requests after the shutdown signal, but only for so
    // long; abandoned background recording tasks are expected to die with
    // the process.
    let drain_cap = {
        let shutdown = shutdown.clone();
        async move {
            shutdown.cancelled().await;
            tokio::time::sleep(DRAIN_TIMEOUT).await;
        }
    };

    tokio::select! {
        result = server => {
            result?;
            info!("all requests drained, shutting down cleanly");
        }
        _ = drain_cap => {
            warn!("drain timeout exceeded, forcing shutdown");
        }
    }

    if let Some(guard) = telemetry_guard {
        if let Err(e) = guard.shutdown() {
            warn!(error = %e, "telemetry shutdown");
        }
    }

    Ok(())
}

/// SIGINT and SIGTERM both begin a graceful shutdown.
fn spawn_signal_handlers(shutdown: CancellationToken) {
    let sigint_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received SIGINT, initiating graceful shutdown");
                sigint_shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("received SIGTERM, initiating graceful shutdown");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for SIGTERM"),
        }
    });
}
