//! Cluster API infrastructure provider manager for Metal3

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use metal3_common::telemetry::{init_telemetry, TelemetryConfig};
use metal3_common::MANAGER_USER_AGENT;

use metal3_operator::bootstrap;
use metal3_operator::config::Flags;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before anything touches rustls
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: failed to install crypto provider: {e:?}");
        std::process::exit(1);
    }

    let flags = Flags::parse();

    init_telemetry(TelemetryConfig {
        format: flags.log_format,
        default_filter: None,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let config = flags.into_runtime_config()?;

    let mut kube_config = kube::Config::infer()
        .await
        .map_err(|e| anyhow::anyhow!("failed to load kubeconfig: {e}"))?;
    kube_config.headers.push((
        http::header::USER_AGENT,
        http::HeaderValue::from_static(MANAGER_USER_AGENT),
    ));
    let client = Client::try_from(kube_config)
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {e}"))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Termination signal received, shutting down");
            cancel.cancel();
        });
    }

    bootstrap::run(config, client, cancel).await?;
    info!("Manager stopped");
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        () = terminate => {}
    }
}
