//! Metal3Cluster controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use metal3_common::crd::Metal3Cluster;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3Cluster
pub async fn reconcile(cluster: Arc<Metal3Cluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();

    if cluster.metadata.deletion_timestamp.is_some() {
        info!(cluster = %name, namespace = %namespace, "Cluster deletion in progress");
        return Ok(Action::await_change());
    }

    let endpoint = &cluster.spec.control_plane_endpoint;
    if endpoint.host.is_empty() {
        warn!(
            cluster = %name,
            namespace = %namespace,
            "Cluster has no control plane endpoint yet"
        );
    } else {
        debug!(
            cluster = %name,
            namespace = %namespace,
            endpoint = %format!("{}:{}", endpoint.host, endpoint.port),
            "Reconciling Metal3Cluster"
        );
    }

    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for cluster reconcile failures
pub fn error_policy(_cluster: Arc<Metal3Cluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on_error("Metal3Cluster", error)
}
