//! The manager run loop
//!
//! Owns the diagnostics servers, the webhook server, leader election, and
//! the controller futures. Everything stops on cancellation; any server
//! failing before cancellation is fatal and surfaces as a non-zero exit.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use metal3_common::leader_election::{LeaderElector, LeaderGuard};
use metal3_common::{Error, LEADER_LEASE_NAME, SYSTEM_NAMESPACE};

use crate::config::RuntimeConfig;
use crate::metrics::Metrics;
use crate::server::{self, HealthState};
use crate::tls::TlsSettings;

/// Time in-flight admission requests get to finish on shutdown
const WEBHOOK_DRAIN: Duration = Duration::from_secs(10);

/// Assembled runtime, ready to run
pub struct Manager {
    config: RuntimeConfig,
    client: kube::Client,
    metrics: Metrics,
    health: HealthState,
    tls: TlsSettings,
    cancel: CancellationToken,
    webhook_router: Router,
    controller_futures: Vec<BoxFuture<'static, ()>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("controllers", &self.controller_futures.len())
            .field("leader_election", &self.config.leader_election.enabled)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Assemble a manager from its parts
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        client: kube::Client,
        metrics: Metrics,
        health: HealthState,
        tls: TlsSettings,
        cancel: CancellationToken,
        webhook_router: Router,
        controller_futures: Vec<BoxFuture<'static, ()>>,
    ) -> Self {
        Self {
            config,
            client,
            metrics,
            health,
            tls,
            cancel,
            webhook_router,
            controller_futures,
        }
    }

    /// Run until cancellation or a fatal error
    ///
    /// The diagnostics servers start immediately so probes and metrics work
    /// while a standby waits for leadership. Controllers and the webhook
    /// server only run on the leader.
    pub async fn run(mut self) -> Result<(), Error> {
        let cancel = self.cancel.clone();

        let health_task = tokio::spawn(server::serve(
            "health-probes",
            self.config.health_addr.clone(),
            server::health_router(self.health.clone()),
            cancel.clone(),
        ));
        let metrics_task = tokio::spawn(server::serve(
            "metrics",
            self.config.metrics_bind_addr.clone(),
            server::metrics_router(self.metrics.clone()),
            cancel.clone(),
        ));

        let mut leader_guard = if self.config.leader_election.enabled {
            let identity = leader_identity();
            let elector = Arc::new(LeaderElector::new(
                self.client.clone(),
                LEADER_LEASE_NAME,
                SYSTEM_NAMESPACE,
                &identity,
                self.config.leader_election.clone(),
            ));
            let guard = tokio::select! {
                res = elector.acquire() => res?,
                () = cancel.cancelled() => {
                    info!("Shutdown requested while waiting for leadership");
                    return Ok(());
                }
            };
            self.metrics.leader.set(1);
            Some(guard)
        } else {
            None
        };

        let webhook_task = self.start_webhook_server()?;

        let controllers = futures::future::join_all(std::mem::take(&mut self.controller_futures));
        tokio::pin!(controllers);

        info!("Starting manager");

        let mut controllers_done = false;
        let result = tokio::select! {
            () = cancel.cancelled() => {
                info!("Shutdown signal received");
                Ok(())
            }
            _ = &mut controllers => {
                controllers_done = true;
                Ok(())
            }
            res = health_task => flatten_task("health-probes", res),
            res = metrics_task => flatten_task("metrics", res),
            res = webhook_task => flatten_task("webhook-server", res),
            () = wait_lost(leader_guard.as_mut()) => {
                Err(Error::internal("leader-election", "leadership lost while running"))
            }
        };

        // Stop accepting new work, then drain in-flight reconciliations
        cancel.cancel();
        if !controllers_done {
            (&mut controllers).await;
        }

        if let Some(guard) = leader_guard.take() {
            self.metrics.leader.set(0);
            if let Err(e) = guard.release_leadership().await {
                warn!(error = %e, "Failed to release leader lease on shutdown");
            }
        }

        result
    }

    fn start_webhook_server(&mut self) -> Result<JoinHandle<Result<(), Error>>, Error> {
        let server_config = self.tls.server_config(&self.config.webhook_cert_dir)?;
        let rustls_config = RustlsConfig::from_config(Arc::new(server_config));
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.webhook_port));

        let handle = axum_server::Handle::new();
        {
            let handle = handle.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                handle.graceful_shutdown(Some(WEBHOOK_DRAIN));
            });
        }
        {
            let handle = handle.clone();
            let health = self.health.clone();
            tokio::spawn(async move {
                if let Some(addr) = handle.listening().await {
                    health.set_webhook_started();
                    info!(addr = %addr, "Webhook server listening");
                }
            });
        }

        let router = std::mem::take(&mut self.webhook_router);
        Ok(tokio::spawn(async move {
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await
                .map_err(|e| Error::internal("webhook-server", e.to_string()))
        }))
    }
}

async fn wait_lost(guard: Option<&mut LeaderGuard>) {
    match guard {
        Some(g) => g.lost().await,
        None => std::future::pending().await,
    }
}

fn flatten_task(
    name: &'static str,
    res: Result<Result<(), Error>, tokio::task::JoinError>,
) -> Result<(), Error> {
    match res {
        Ok(inner) => inner,
        Err(e) => Err(Error::internal(name, format!("task panicked: {e}"))),
    }
}

/// Identity written into the leader lease
///
/// Uses the pod name when the downward API provides it, so lease holders are
/// attributable in a real deployment.
fn leader_identity() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| format!("metal3-operator-{}", std::process::id()))
}
