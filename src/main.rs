// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `patient-integrity` daemon: HTTP API plus Prometheus `/metrics`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use patient_integrity::{api, IntegrityConfig, IntegrityService, RetryConfig};

#[derive(Parser, Debug)]
#[command(name = "patient-integrity", about = "Anchor and verify patient record hashes on a ledger")]
struct Cli {
    /// JSON config file; flags and environment override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, env = "ETH_PROVIDER_URL")]
    rpc_url: Option<String>,

    /// Patient data contract address
    #[arg(long, env = "CONTRACT_ADDRESS")]
    contract_address: Option<String>,

    /// Sending account (defaults to the node's first account)
    #[arg(long, env = "SENDER_ADDRESS")]
    sender_address: Option<String>,

    /// Redis document store
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Confirmations to wait for after a write is mined
    #[arg(long)]
    confirmations: Option<u64>,

    /// Keep retrying backend connects instead of exiting
    #[arg(long, default_value = "false")]
    wait_for_backends: bool,
}

impl Cli {
    fn into_config(self) -> Result<(IntegrityConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => IntegrityConfig::default(),
        };

        if self.rpc_url.is_some() {
            config.rpc_url = self.rpc_url;
        }
        if self.contract_address.is_some() {
            config.contract_address = self.contract_address;
        }
        if self.sender_address.is_some() {
            config.sender_address = self.sender_address;
        }
        if self.redis_url.is_some() {
            config.redis_url = self.redis_url;
        }
        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(confirmations) = self.confirmations {
            config.confirmations = confirmations;
        }
        Ok((config, self.wait_for_backends))
    }
}

fn setup_metrics_exporter() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .add_global_label("service", "patient-integrity")
        .install_recorder()
        .context("failed to install prometheus recorder")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (config, wait_for_backends) = Cli::parse().into_config()?;
    let handle = setup_metrics_exporter()?;

    let retry_config = if wait_for_backends {
        RetryConfig::daemon()
    } else {
        RetryConfig::startup()
    };
    let service = Arc::new(
        IntegrityService::open_with(&config, &retry_config)
            .await
            .context("failed to open integrity service")?,
    );

    let app = api::router(service.clone()).route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    service.close().await;
    Ok(())
}
