//! Metal3MachineTemplate controller
//!
//! Only does work when node reuse is requested on the template.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use metal3_common::crd::Metal3MachineTemplate;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3MachineTemplate
pub async fn reconcile(
    template: Arc<Metal3MachineTemplate>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = template.name_any();
    let namespace = template.namespace().unwrap_or_default();

    if template.metadata.deletion_timestamp.is_some() {
        info!(template = %name, namespace = %namespace, "Machine template deletion in progress");
        return Ok(Action::await_change());
    }

    if !template.spec.node_reuse {
        debug!(template = %name, namespace = %namespace, "Node reuse disabled, nothing to do");
        return Ok(Action::requeue(ctx.sync_period));
    }

    debug!(template = %name, namespace = %namespace, "Reconciling node reuse for machine template");
    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for machine template reconcile failures
pub fn error_policy(
    _template: Arc<Metal3MachineTemplate>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    requeue_on_error("Metal3MachineTemplate", error)
}
