//! Provisioning collaborator seam
//!
//! The pieces reconcilers need beyond the management-cluster client: the
//! factory for kind-specific provisioning helpers, the getter used to reach a
//! workload cluster's API server, and the process-wide host preallocation
//! toggle set once at startup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::{debug, info};

use crate::Error;

static BMH_NAME_BASED_PREALLOCATION: AtomicBool = AtomicBool::new(false);

/// Enable matching hosts to machines by name during preallocation
///
/// Set once during bootstrap before any controller runs; flipping it while
/// reconcilers are in flight is not supported.
pub fn set_bmh_name_based_preallocation(enabled: bool) {
    if enabled {
        info!("Host name-based preallocation enabled");
    }
    BMH_NAME_BASED_PREALLOCATION.store(enabled, Ordering::SeqCst);
}

/// Whether host preallocation matches hosts to machines by name
pub fn bmh_name_based_preallocation() -> bool {
    BMH_NAME_BASED_PREALLOCATION.load(Ordering::SeqCst)
}

/// Factory for kind-specific provisioning helpers
///
/// Holds the management-cluster client that every helper operates through.
/// Cheap to clone; reconcilers keep one in their context.
#[derive(Clone)]
pub struct ManagerFactory {
    client: Client,
}

impl std::fmt::Debug for ManagerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerFactory").finish_non_exhaustive()
    }
}

impl ManagerFactory {
    /// Create a factory over the management-cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// The management-cluster client helpers operate through
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

/// Async function resolving a workload cluster's API client
///
/// Takes the management client plus the cluster's namespace and name.
pub type ClientGetterFn = dyn Fn(Client, String, String) -> BoxFuture<'static, Result<Client, Error>>
    + Send
    + Sync;

/// Capability to obtain a client for a workload cluster
///
/// Reconcilers that touch workload-cluster objects (node labels, remediation
/// node state) take one of these; the rest never see it.
#[derive(Clone)]
pub struct ClusterClientGetter {
    inner: Arc<ClientGetterFn>,
}

impl std::fmt::Debug for ClusterClientGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClientGetter").finish_non_exhaustive()
    }
}

impl ClusterClientGetter {
    /// Wrap a custom getter function
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Client, String, String) -> BoxFuture<'static, Result<Client, Error>>
            + Send
            + Sync
            + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// The default getter: build a client from the `<cluster>-kubeconfig`
    /// secret the control-plane provider writes into the cluster's namespace
    pub fn secret_based() -> Self {
        Self::new(|client, namespace, cluster_name| {
            Box::pin(workload_client_from_secret(client, namespace, cluster_name))
        })
    }

    /// Resolve a client for the named workload cluster
    pub async fn get(
        &self,
        client: Client,
        namespace: &str,
        cluster_name: &str,
    ) -> Result<Client, Error> {
        (self.inner)(client, namespace.to_string(), cluster_name.to_string()).await
    }
}

async fn workload_client_from_secret(
    client: Client,
    namespace: String,
    cluster_name: String,
) -> Result<Client, Error> {
    let secret_name = format!("{cluster_name}-kubeconfig");
    debug!(
        namespace = %namespace,
        secret = %secret_name,
        "Resolving workload cluster client"
    );

    let secrets: Api<Secret> = Api::namespaced(client, &namespace);
    let secret = secrets.get(&secret_name).await?;

    let raw = secret
        .data
        .as_ref()
        .and_then(|d| d.get("value"))
        .ok_or_else(|| {
            Error::internal(
                "workload-client",
                format!("secret {namespace}/{secret_name} has no value key"),
            )
        })?;

    let kubeconfig = Kubeconfig::from_yaml(std::str::from_utf8(&raw.0).map_err(|e| {
        Error::internal(
            "workload-client",
            format!("kubeconfig in {namespace}/{secret_name} is not utf-8: {e}"),
        )
    })?)
    .map_err(|e| {
        Error::internal(
            "workload-client",
            format!("kubeconfig in {namespace}/{secret_name} failed to parse: {e}"),
        )
    })?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            Error::internal(
                "workload-client",
                format!("kubeconfig for cluster {cluster_name} is unusable: {e}"),
            )
        })?;

    Client::try_from(config).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preallocation_toggle_round_trips() {
        set_bmh_name_based_preallocation(true);
        assert!(bmh_name_based_preallocation());
        set_bmh_name_based_preallocation(false);
        assert!(!bmh_name_based_preallocation());
    }
}
