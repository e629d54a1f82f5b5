//! Controller registration and the shared reconcile context
//!
//! Each resource kind gets its own controller with an independent worker
//! pool. Registration is all-or-nothing: the first rejected registration
//! fails bootstrap and no controller runs.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::api::Api;
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::{Action, Config as ControllerConfig};
use kube::runtime::{watcher, Controller};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use metal3_common::crd::{
    Metal3Cluster, Metal3Data, Metal3DataTemplate, Metal3Machine, Metal3MachineTemplate,
    Metal3Remediation,
};
use metal3_common::provisioning::{ClusterClientGetter, ManagerFactory};
use metal3_common::{Error, WATCH_FILTER_LABEL_KEY};

use crate::metrics::Metrics;

pub mod cluster;
pub mod data;
pub mod data_template;
pub mod label_sync;
pub mod machine;
pub mod machine_template;
pub mod remediation;

/// Requeue delay applied by every error policy
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// The fixed set of controllers this manager runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerKind {
    /// Metal3Machine controller
    Machine,
    /// Metal3Cluster controller
    Cluster,
    /// Metal3DataTemplate controller
    DataTemplate,
    /// Metal3Data controller
    Data,
    /// Node label sync controller (watches Metal3Clusters)
    LabelSync,
    /// Metal3MachineTemplate controller
    MachineTemplate,
    /// Metal3Remediation controller
    Remediation,
}

impl ReconcilerKind {
    /// Registration order used by bootstrap
    pub const ALL: &'static [ReconcilerKind] = &[
        ReconcilerKind::Machine,
        ReconcilerKind::Cluster,
        ReconcilerKind::DataTemplate,
        ReconcilerKind::Data,
        ReconcilerKind::LabelSync,
        ReconcilerKind::MachineTemplate,
        ReconcilerKind::Remediation,
    ];

    /// Log name for this controller
    pub fn name(&self) -> &'static str {
        match self {
            Self::Machine => "Metal3Machine",
            Self::Cluster => "Metal3Cluster",
            Self::DataTemplate => "Metal3DataTemplate",
            Self::Data => "Metal3Data",
            Self::LabelSync => "Metal3LabelSync",
            Self::MachineTemplate => "Metal3MachineTemplate",
            Self::Remediation => "Metal3Remediation",
        }
    }
}

/// Shared state handed to every reconcile invocation
#[derive(Clone)]
pub struct Context {
    /// Management-cluster client
    pub client: Client,
    /// Factory for kind-specific provisioning helpers
    pub factory: ManagerFactory,
    /// Workload-cluster access for the controllers that need it
    pub cluster_client_getter: Option<ClusterClientGetter>,
    /// Namespace filter; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Watch-filter label value
    pub watch_filter: Option<String>,
    /// Minimum re-reconcile interval
    pub sync_period: Duration,
    /// Metric handles
    pub metrics: Metrics,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("namespace", &self.namespace)
            .field("watch_filter", &self.watch_filter)
            .field("sync_period", &self.sync_period)
            .finish_non_exhaustive()
    }
}

impl Context {
    fn watcher_config(&self) -> watcher::Config {
        match &self.watch_filter {
            Some(value) => {
                watcher::Config::default().labels(&format!("{WATCH_FILTER_LABEL_KEY}={value}"))
            }
            None => watcher::Config::default(),
        }
    }

    fn api_for<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Registers controllers and owns their run futures until the manager starts
/// them
pub struct ReconcilerRegistry {
    registered: Vec<&'static str>,
    futures: Vec<BoxFuture<'static, ()>>,
}

impl Debug for ReconcilerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerRegistry")
            .field("registered", &self.registered)
            .finish()
    }
}

impl Default for ReconcilerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcilerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            registered: Vec::new(),
            futures: Vec::new(),
        }
    }

    /// Register one controller
    ///
    /// Rejects a zero concurrency cap. On success the controller future is
    /// held until [`Self::into_futures`].
    pub fn register(
        &mut self,
        kind: ReconcilerKind,
        ctx: Arc<Context>,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        if concurrency == 0 {
            return Err(Error::registration(
                kind.name(),
                "concurrency must be at least 1",
            ));
        }
        let workers = u16::try_from(concurrency).map_err(|_| {
            Error::registration(
                kind.name(),
                format!("concurrency must be at most {}", u16::MAX),
            )
        })?;

        let fut = match kind {
            ReconcilerKind::Machine => controller_future::<Metal3Machine, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                machine::reconcile,
                machine::error_policy,
            ),
            ReconcilerKind::Cluster => controller_future::<Metal3Cluster, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                cluster::reconcile,
                cluster::error_policy,
            ),
            ReconcilerKind::DataTemplate => controller_future::<Metal3DataTemplate, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                data_template::reconcile,
                data_template::error_policy,
            ),
            ReconcilerKind::Data => controller_future::<Metal3Data, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                data::reconcile,
                data::error_policy,
            ),
            ReconcilerKind::LabelSync => controller_future::<Metal3Cluster, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                label_sync::reconcile,
                label_sync::error_policy,
            ),
            ReconcilerKind::MachineTemplate => controller_future::<Metal3MachineTemplate, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                machine_template::reconcile,
                machine_template::error_policy,
            ),
            ReconcilerKind::Remediation => controller_future::<Metal3Remediation, _, _>(
                kind,
                ctx,
                workers,
                cancel,
                remediation::reconcile,
                remediation::error_policy,
            ),
        };

        info!(controller = kind.name(), workers = concurrency, "Controller registered");
        self.registered.push(kind.name());
        self.futures.push(fut);
        Ok(())
    }

    /// Register every controller in the fixed order, stopping at the first
    /// failure
    pub fn register_all(
        &mut self,
        ctx: &Arc<Context>,
        limits: &crate::config::ConcurrencyLimits,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        for kind in ReconcilerKind::ALL {
            self.register(*kind, Arc::clone(ctx), limits.for_kind(*kind), cancel)?;
        }
        Ok(())
    }

    /// Names registered so far, in order
    pub fn registered(&self) -> &[&'static str] {
        &self.registered
    }

    /// Hand the run futures to the manager
    pub fn into_futures(self) -> Vec<BoxFuture<'static, ()>> {
        self.futures
    }
}

fn controller_future<K, ReconcileFut, ErrFn>(
    kind: ReconcilerKind,
    ctx: Arc<Context>,
    concurrency: u16,
    cancel: &CancellationToken,
    reconcile_fn: fn(Arc<K>, Arc<Context>) -> ReconcileFut,
    error_fn: ErrFn,
) -> BoxFuture<'static, ()>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    ReconcileFut: std::future::Future<Output = Result<Action, Error>> + Send + 'static,
    ErrFn: Fn(Arc<K>, &Error, Arc<Context>) -> Action + Send + Sync + 'static,
{
    let api: Api<K> = ctx.api_for();
    let config = ControllerConfig::default().concurrency(concurrency);
    let metrics = ctx.metrics.clone();
    let name = kind.name();

    Controller::new(api, ctx.watcher_config())
        .with_config(config)
        .graceful_shutdown_on(cancel.clone().cancelled_owned())
        .run(reconcile_fn, error_fn, ctx)
        .for_each(move |result| {
            let metrics = metrics.clone();
            async move {
                match result {
                    Ok((obj, action)) => {
                        metrics
                            .reconciliations
                            .with_label_values(&[name, "success"])
                            .inc();
                        debug!(controller = name, object = %obj, ?action, "Reconciliation completed");
                    }
                    Err(e) => {
                        metrics
                            .reconciliations
                            .with_label_values(&[name, "error"])
                            .inc();
                        error!(controller = name, error = %e, "Reconciliation error");
                    }
                }
            }
        })
        .boxed()
}

/// Error policy shared by every controller: log and retry on a fixed delay
pub(crate) fn requeue_on_error(controller: &'static str, error: &Error) -> Action {
    tracing::warn!(controller, error = %error, "Reconcile failed, requeueing");
    Action::requeue(ERROR_REQUEUE)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A client whose requests all answer 404; reconcile tests never reach
    /// the wire
    pub(crate) fn stub_client() -> Client {
        let svc = tower::service_fn(|_req: http::Request<kube::client::Body>| async move {
            let resp = http::Response::builder()
                .status(404)
                .body(kube::client::Body::from(
                    br#"{"kind":"Status","apiVersion":"v1","status":"Failure","code":404}"#.to_vec(),
                ))
                .unwrap();
            Ok::<_, std::convert::Infallible>(resp)
        });
        Client::new(svc, "default")
    }

    pub(crate) fn context() -> Arc<Context> {
        let client = stub_client();
        Arc::new(Context {
            client: client.clone(),
            factory: ManagerFactory::new(client),
            cluster_client_getter: Some(ClusterClientGetter::secret_based()),
            namespace: None,
            watch_filter: None,
            sync_period: Duration::from_secs(600),
            metrics: Metrics::new().unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ConcurrencyLimits;

    use super::*;

    #[tokio::test]
    async fn registration_stops_at_the_first_rejected_controller() {
        let ctx = testing::context();
        let limits = ConcurrencyLimits {
            machine: 1,
            cluster: 10,
            data_template: 0,
            data: 10,
            label_sync: 10,
            machine_template: 10,
            remediation: 10,
        };
        let cancel = CancellationToken::new();

        let mut registry = ReconcilerRegistry::new();
        let err = registry.register_all(&ctx, &limits, &cancel).unwrap_err();
        assert!(err.to_string().contains("Metal3DataTemplate"));
        assert_eq!(registry.registered(), &["Metal3Machine", "Metal3Cluster"]);
    }

    #[tokio::test]
    async fn oversized_concurrency_cap_is_rejected_at_registration() {
        let ctx = testing::context();
        let cancel = CancellationToken::new();

        let mut registry = ReconcilerRegistry::new();
        let err = registry
            .register(
                ReconcilerKind::Cluster,
                Arc::clone(&ctx),
                usize::from(u16::MAX) + 1,
                &cancel,
            )
            .unwrap_err();
        assert!(err.to_string().contains("65535"));
        assert!(registry.registered().is_empty());
    }

    #[test]
    fn registration_order_is_stable() {
        let names: Vec<_> = ReconcilerKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec![
                "Metal3Machine",
                "Metal3Cluster",
                "Metal3DataTemplate",
                "Metal3Data",
                "Metal3LabelSync",
                "Metal3MachineTemplate",
                "Metal3Remediation",
            ]
        );
    }
}
