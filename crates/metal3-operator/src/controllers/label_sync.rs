//! Node label sync controller
//!
//! Watches Metal3Clusters and mirrors host labels onto the workload
//! cluster's nodes, so this is one of the two controllers holding a
//! workload-cluster client getter.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use metal3_common::crd::Metal3Cluster;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile label sync for one Metal3Cluster
pub async fn reconcile(cluster: Arc<Metal3Cluster>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();

    if cluster.metadata.deletion_timestamp.is_some() {
        info!(cluster = %name, namespace = %namespace, "Cluster deletion in progress, skipping label sync");
        return Ok(Action::await_change());
    }

    let ready = cluster.status.as_ref().map(|s| s.ready).unwrap_or(false);
    if !ready {
        debug!(cluster = %name, namespace = %namespace, "Cluster not ready, label sync deferred");
        return Ok(Action::requeue(ctx.sync_period));
    }

    if ctx.cluster_client_getter.is_none() {
        return Err(Error::internal(
            "label-sync",
            "no workload cluster client getter configured",
        ));
    }

    debug!(cluster = %name, namespace = %namespace, "Reconciling node label sync");
    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for label sync failures
pub fn error_policy(_cluster: Arc<Metal3Cluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on_error("Metal3LabelSync", error)
}
