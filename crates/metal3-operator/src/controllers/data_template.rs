//! Metal3DataTemplate controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use metal3_common::crd::Metal3DataTemplate;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3DataTemplate
pub async fn reconcile(
    template: Arc<Metal3DataTemplate>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = template.name_any();
    let namespace = template.namespace().unwrap_or_default();

    if template.metadata.deletion_timestamp.is_some() {
        info!(template = %name, namespace = %namespace, "Data template deletion in progress");
        return Ok(Action::await_change());
    }

    let allocated = template
        .status
        .as_ref()
        .and_then(|s| s.indexes.as_ref())
        .map(|i| i.len())
        .unwrap_or(0);
    debug!(
        template = %name,
        namespace = %namespace,
        allocated_indexes = allocated,
        "Reconciling Metal3DataTemplate"
    );

    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for data template reconcile failures
pub fn error_policy(
    _template: Arc<Metal3DataTemplate>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    requeue_on_error("Metal3DataTemplate", error)
}
