//! Bootstrap sequence
//!
//! The ordered startup path from validated configuration to the running
//! manager. Every step is fallible and the first failure aborts the process
//! before anything serves traffic; the only blocking step is the optional
//! API readiness gate.

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metal3_common::kinds::KindRegistry;
use metal3_common::provisioning::{
    set_bmh_name_based_preallocation, ClusterClientGetter, ManagerFactory,
};
use metal3_common::{Error, BMH_GROUP, BMH_VERSION};

use crate::config::RuntimeConfig;
use crate::controllers::{Context, ReconcilerRegistry};
use crate::manager::Manager;
use crate::metrics::Metrics;
use crate::readiness::{self, KubeDiscovery};
use crate::server::HealthState;
use crate::tls::{build_tls_policy, TlsSettings};
use crate::webhook::{WebhookRegistry, WebhookState};

/// Run the manager from a validated configuration until shutdown
pub async fn run(
    config: RuntimeConfig,
    client: Client,
    cancel: CancellationToken,
) -> Result<(), Error> {
    let registry = KindRegistry::populate();
    info!(kinds = registry.len(), "Resource kinds registered");

    let tls_policy = build_tls_policy(&config.tls)?;
    let tls = TlsSettings::from_policy(&tls_policy);

    let metrics = Metrics::new()?;
    let health = HealthState::default();

    if config.wait_for_metal3_controller {
        let discovery = KubeDiscovery::new(client.clone());
        readiness::wait_for_api_group(&discovery, BMH_GROUP, BMH_VERSION, &cancel).await?;
    }

    if config.enable_bmh_name_based_preallocation {
        set_bmh_name_based_preallocation(true);
    }

    let ctx = Arc::new(Context {
        client: client.clone(),
        factory: ManagerFactory::new(client.clone()),
        cluster_client_getter: Some(ClusterClientGetter::secret_based()),
        namespace: config.namespace.clone(),
        watch_filter: config.watch_filter.clone(),
        sync_period: config.sync_period,
        metrics: metrics.clone(),
    });

    let mut reconcilers = ReconcilerRegistry::new();
    reconcilers.register_all(&ctx, &config.concurrency, &cancel)?;

    let webhook_state = Arc::new(WebhookState {
        metrics: metrics.clone(),
    });
    let mut webhooks = WebhookRegistry::new(webhook_state);
    webhooks.register_all()?;

    let manager = Manager::new(
        config,
        client,
        metrics,
        health,
        tls,
        cancel,
        webhooks.into_router(),
        reconcilers.into_futures(),
    );
    manager.run().await
}
