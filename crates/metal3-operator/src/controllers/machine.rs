//! Metal3Machine controller
//!
//! The only controller documented as unsafe above one worker: host claiming
//! has no cross-invocation coordination, so the default concurrency of 1 is
//! load-bearing.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info};

use metal3_common::crd::Metal3Machine;
use metal3_common::provisioning::bmh_name_based_preallocation;
use metal3_common::Error;

use super::{requeue_on_error, Context};

/// Reconcile one Metal3Machine
pub async fn reconcile(machine: Arc<Metal3Machine>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = machine.name_any();
    let namespace = machine.namespace().unwrap_or_default();

    if machine.metadata.deletion_timestamp.is_some() {
        info!(machine = %name, namespace = %namespace, "Machine deletion in progress");
        return Ok(Action::await_change());
    }

    let provisioned = machine.spec.provider_id.is_some();
    debug!(
        machine = %name,
        namespace = %namespace,
        provisioned,
        name_based_preallocation = bmh_name_based_preallocation(),
        "Reconciling Metal3Machine"
    );

    if !provisioned && machine.spec.host_selector.is_none() && bmh_name_based_preallocation() {
        debug!(machine = %name, "No host selector set, host claim will match by name");
    }

    Ok(Action::requeue(ctx.sync_period))
}

/// Retry policy for machine reconcile failures
pub fn error_policy(_machine: Arc<Metal3Machine>, error: &Error, _ctx: Arc<Context>) -> Action {
    requeue_on_error("Metal3Machine", error)
}

#[cfg(test)]
mod tests {
    use metal3_common::crd::Metal3MachineSpec;

    use super::super::testing;
    use super::*;

    fn machine(name: &str) -> Metal3Machine {
        let mut m = Metal3Machine::new(name, Metal3MachineSpec::default());
        m.metadata.namespace = Some("metal3".to_string());
        m
    }

    #[tokio::test]
    async fn healthy_machine_requeues_on_the_sync_period() {
        let ctx = testing::context();
        let action = reconcile(Arc::new(machine("worker-0")), ctx.clone())
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(ctx.sync_period));
    }

    #[tokio::test]
    async fn deleting_machine_waits_for_change() {
        let ctx = testing::context();
        let mut m = machine("worker-0");
        m.metadata.deletion_timestamp = Some(
            k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(chrono::Utc::now()),
        );
        let action = reconcile(Arc::new(m), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}
