//! Metal3Data controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use metal3_common::crd::Metal3Data;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3Data
pub async fn reconcile(data: Arc<Metal3Data>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = data.name_any();
    let namespace = data.namespace().unwrap_or_default();

    if data.metadata.deletion_timestamp.is_some() {
        info!(data = %name, namespace = %namespace, "Data deletion in progress");
        return Ok(Action::await_change());
    }

    let ready = data.status.as_ref().map(|s| s.ready).unwrap_or(false);
    debug!(
        data = %name,
        namespace = %namespace,
        template = %data.spec.template,
        index = data.spec.index,
        ready,
        "Reconciling Metal3Data"
    );

    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for data reconcile failures
pub fn error_policy(_data: Arc<Metal3Data>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on_error("Metal3Data", error)
}
