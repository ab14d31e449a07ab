// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root (spec §9): reads `Config` from the environment,
//! wires store → scheduler → bus → engine in dependency order, installs
//! the one `tracing` subscriber this workspace ever installs, mounts the
//! webhook source on an HTTP listener, and runs until a shutdown signal
//! arrives.

use halo_adapters::FakeAgentAdapter;
use halo_bus::sources::{NoSecrets, WebhookSource};
use halo_core::{Clock, SystemClock};
use halo_daemon::webhook_secret::SharedSecret;
use halo_daemon::Config;
use halo_engine::{Engine, EngineConfig};
use halo_storage::Store;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon exited with an error");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Store(#[from] halo_storage::StoreError),
    #[error(transparent)]
    Engine(#[from] halo_engine::EngineError),
    #[error("failed to bind {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),
    #[error("http server error: {0}")]
    Serve(std::io::Error),
}

async fn run(config: Config) -> Result<(), RunError> {
    let clock = SystemClock;
    let now_ms = clock.epoch_ms();

    let store = Store::new();
    let db = store.open_app_db(&config.data_dir, now_ms)?;

    // No concrete `AgentAdapter` ships in this workspace (spec §6); the
    // composition root runs against the fake so the wiring is exercised
    // end to end, ready to be swapped for a real integration.
    let agent = Arc::new(FakeAgentAdapter::new());

    let engine_config = EngineConfig {
        space_root: config.data_dir.clone(),
        global_concurrency: config.global_concurrency,
        keep_alive_ttl_ms: config.keep_alive_ttl_ms,
        run_log_retention: config.run_log_retention,
        max_consecutive_errors: config.max_consecutive_errors,
        dedup_capacity: config.dedup_capacity,
        dedup_ttl_ms: config.dedup_ttl_ms,
    };
    let engine = Engine::new(db, clock, agent, engine_config)?;

    let secrets: Arc<dyn halo_bus::sources::SecretResolver> = match config.webhook_secret.clone() {
        Some(secret) => Arc::new(SharedSecret(Some(secret.into_bytes()))),
        None => Arc::new(NoSecrets),
    };
    let webhook_source = WebhookSource::new("webhook", secrets);
    engine.register_source(webhook_source.clone())?;

    let recovered = engine.start()?;
    if recovered > 0 {
        tracing::info!(recovered, "resumed interrupted runs");
    }

    let reaper_engine = Arc::clone(&engine);
    // Per-app `escalation.timeout_hours` overrides this; it's only the
    // fallback for apps whose spec doesn't set one (spec §9).
    let default_escalation_timeout_ms = config.escalation_timeout_ms;
    let reaper = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            match reaper_engine.reap_escalation_timeouts(default_escalation_timeout_ms) {
                Ok(0) => {}
                Ok(n) => tracing::warn!(count = n, "reaped timed-out escalations"),
                Err(e) => tracing::error!(error = %e, "escalation reaper failed"),
            }
        }
    });

    let router = webhook_source.router(SystemClock);
    let listener =
        tokio::net::TcpListener::bind(config.http_addr).await.map_err(|e| RunError::Bind(config.http_addr, e))?;
    tracing::info!(addr = %config.http_addr, "listening for webhooks");

    axum::serve(listener, router.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(RunError::Serve)?;

    reaper.abort();
    engine.stop();
    tracing::info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
