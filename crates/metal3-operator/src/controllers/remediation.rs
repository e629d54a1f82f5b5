//! Metal3Remediation controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use metal3_common::crd::Metal3Remediation;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3Remediation
pub async fn reconcile(
    remediation: Arc<Metal3Remediation>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let name = remediation.name_any();
    let namespace = remediation.namespace().unwrap_or_default();

    if remediation.metadata.deletion_timestamp.is_some() {
        info!(remediation = %name, namespace = %namespace, "Remediation deletion in progress");
        return Ok(Action::await_change());
    }

    let retries = remediation
        .status
        .as_ref()
        .map(|s| s.retry_count)
        .unwrap_or(0);
    let limit = remediation.spec.strategy.retry_limit;

    if let Some(limit) = limit {
        if retries >= limit {
            warn!(
                remediation = %name,
                namespace = %namespace,
                retries,
                limit,
                "Remediation retry limit reached"
            );
            return Ok(Action::await_change());
        }
    }

    debug!(
        remediation = %name,
        namespace = %namespace,
        strategy = ?remediation.spec.strategy.remediation_type,
        retries,
        "Reconciling Metal3Remediation"
    );

    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for remediation reconcile failures
pub fn error_policy(
    _remediation: Arc<Metal3Remediation>,
    error: &Error,
    _ctx: Arc<Context>,
) -> Action {
    requeue_on_error("Metal3Remediation", error)
}

#[cfg(test)]
mod tests {
    use metal3_common::crd::{
        Metal3RemediationSpec, Metal3RemediationStatus, RemediationStrategy,
    };

    use super::super::testing;
    use super::*;

    #[tokio::test]
    async fn exhausted_retry_limit_stops_requeueing() {
        let ctx = testing::context();
        let mut remediation = Metal3Remediation::new(
            "unhealthy-0",
            Metal3RemediationSpec {
                strategy: RemediationStrategy {
                    retry_limit: Some(3),
                    ..Default::default()
                },
            },
        );
        remediation.status = Some(Metal3RemediationStatus {
            retry_count: 3,
            ..Default::default()
        });

        let action = reconcile(Arc::new(remediation), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
