//! Leader election using Kubernetes Leases
//!
//! Cross-process mutual exclusion for HA deployments via the
//! coordination.k8s.io/v1 Lease API. Only the replica holding the lease runs
//! controllers and serves webhooks; standbys keep retrying acquisition on the
//! configured retry period.
//!
//! # Atomicity
//!
//! Uses resourceVersion for compare-and-swap semantics. If the lease changes
//! between read and write, the update fails with 409 Conflict and the caller
//! retries. This prevents two replicas both believing they hold the lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Error;

/// Timings and enablement for leader election.
///
/// The kubernetes convention `renew_deadline < lease_duration` and
/// `retry_period < renew_deadline` is expected but not enforced here; the
/// flag defaults satisfy it and operators overriding all three are assumed
/// to know the trade-off.
#[derive(Debug, Clone)]
pub struct LeaderElectionConfig {
    /// Whether leader election runs at all
    pub enabled: bool,
    /// Duration non-leaders wait before force-acquiring an expired lease
    pub lease_duration: Duration,
    /// How long a leader keeps retrying failed renewals before surrendering
    pub renew_deadline: Duration,
    /// Interval between acquisition and renewal attempts
    pub retry_period: Duration,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

/// Leader elector using Kubernetes Leases
pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
    config: LeaderElectionConfig,
    is_leader: Arc<AtomicBool>,
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("lease_name", &self.lease_name)
            .field("namespace", &self.namespace)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    /// Create a new leader elector for the given lease
    pub fn new(
        client: Client,
        lease_name: &str,
        namespace: &str,
        identity: &str,
        config: LeaderElectionConfig,
    ) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
            config,
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Block until leadership is acquired, then return a guard
    ///
    /// The guard maintains leadership through periodic renewal on the renew
    /// deadline. When leadership is lost the guard's lost channel signals.
    pub async fn acquire(self: Arc<Self>) -> Result<LeaderGuard, Error> {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            "Waiting for leadership..."
        );

        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    self.is_leader.store(true, Ordering::SeqCst);
                    return Ok(self.create_guard());
                }
                Ok(false) => {
                    debug!(
                        identity = %self.identity,
                        retry_secs = self.config.retry_period.as_secs(),
                        "Lease held by another replica, waiting..."
                    );
                }
                Err(e) => {
                    // Transient API errors shouldn't stop a standby
                    warn!(
                        identity = %self.identity,
                        error = %e,
                        retry_secs = self.config.retry_period.as_secs(),
                        "Failed to acquire lease, retrying..."
                    );
                }
            }
            tokio::time::sleep(self.config.retry_period).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });

        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    /// Try to acquire or renew the lease atomically
    async fn try_acquire_or_renew(&self) -> Result<bool, Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();

        let existing = match api.get(&self.lease_name).await {
            Ok(lease) => Some(lease),
            Err(kube::Error::Api(e)) if e.code == 404 => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            None => self.create_lease(&api, now).await,
            Some(lease) => {
                let spec = lease.spec.as_ref();
                let holder = spec.and_then(|s| s.holder_identity.as_ref());
                let resource_version = lease.metadata.resource_version.clone();

                if holder == Some(&self.identity) {
                    return self.renew_lease(&api, &lease, now).await;
                }

                let renew_time = spec.and_then(|s| s.renew_time.as_ref());
                let duration_secs = spec.and_then(|s| s.lease_duration_seconds);
                let is_expired = match (renew_time, duration_secs) {
                    (Some(rt), Some(duration)) => {
                        now > rt.0 + chrono::Duration::seconds(i64::from(duration))
                    }
                    _ => true,
                };

                if is_expired {
                    let transitions = spec.and_then(|s| s.lease_transitions).unwrap_or(0);
                    self.take_over_lease(&api, resource_version, now, transitions)
                        .await
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn create_lease(
        &self,
        api: &Api<Lease>,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, Error> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, 0)),
        };

        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!(identity = %self.identity, "Created new lease");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease creation conflict, will retry");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn renew_lease(
        &self,
        api: &Api<Lease>,
        existing: &Lease,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool, Error> {
        let resource_version = existing
            .metadata
            .resource_version
            .as_ref()
            .ok_or_else(|| Error::internal("leader-election", "lease missing resourceVersion"))?;

        let mut updated = existing.clone();
        if let Some(ref mut spec) = updated.spec {
            spec.renew_time = Some(MicroTime(now));
        }
        updated.metadata.resource_version = Some(resource_version.clone());

        match api
            .replace(&self.lease_name, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => {
                debug!(identity = %self.identity, "Lease renewed");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                warn!(identity = %self.identity, "Lease renewal conflict - lost leadership");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn take_over_lease(
        &self,
        api: &Api<Lease>,
        resource_version: Option<String>,
        now: chrono::DateTime<Utc>,
        transitions: i32,
    ) -> Result<bool, Error> {
        let rv = resource_version
            .ok_or_else(|| Error::internal("leader-election", "lease missing resourceVersion"))?;

        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.lease_name.clone()),
                namespace: Some(self.namespace.clone()),
                resource_version: Some(rv),
                ..Default::default()
            },
            spec: Some(self.lease_spec(now, transitions + 1)),
        };

        match api
            .replace(&self.lease_name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => {
                info!(
                    identity = %self.identity,
                    transitions = transitions + 1,
                    "Took over expired lease"
                );
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease takeover conflict, will retry");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lease_spec(&self, now: chrono::DateTime<Utc>, transitions: i32) -> LeaseSpec {
        LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.config.lease_duration.as_secs() as i32),
            acquire_time: Some(MicroTime(now)),
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(transitions),
            ..Default::default()
        }
    }

    /// Renewal loop that runs while we hold leadership
    ///
    /// Renews on the retry period. Transient renewal errors are retried on
    /// the same period; leadership is only surrendered when the lease is
    /// observed held by another identity, or when no renewal has succeeded
    /// for a full renew deadline.
    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        let mut last_renew = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(self.config.retry_period).await;

            match self.try_acquire_or_renew().await {
                Ok(true) => last_renew = tokio::time::Instant::now(),
                Ok(false) => {
                    warn!(identity = %self.identity, "Leadership lost to another replica");
                    self.is_leader.store(false, Ordering::SeqCst);
                    let _ = lost_tx.send(());
                    return;
                }
                Err(e) => {
                    if last_renew.elapsed() >= self.config.renew_deadline {
                        warn!(
                            identity = %self.identity,
                            error = %e,
                            "Failed to renew lease within the renew deadline"
                        );
                        self.is_leader.store(false, Ordering::SeqCst);
                        let _ = lost_tx.send(());
                        return;
                    }
                    warn!(
                        identity = %self.identity,
                        error = %e,
                        retry_secs = self.config.retry_period.as_secs(),
                        "Lease renewal failed, retrying"
                    );
                }
            }
        }
    }

    /// Release the lease by clearing the holder identity
    ///
    /// Lets a standby acquire leadership immediately instead of waiting for
    /// lease expiry. Call during graceful shutdown.
    async fn release_lease(&self) -> Result<(), Error> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);

        let lease = match api.get(&self.lease_name).await {
            Ok(l) => l,
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(identity = %self.identity, "Lease not found, nothing to release");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let holder = lease.spec.as_ref().and_then(|s| s.holder_identity.as_ref());
        if holder != Some(&self.identity) {
            debug!(identity = %self.identity, "Not the lease holder, nothing to release");
            return Ok(());
        }

        // Clear the holder and back-date renewTime so the lease is
        // immediately acquirable
        let past = Utc::now() - chrono::Duration::seconds(60);
        let patch = json!({
            "spec": {
                "holderIdentity": null,
                "renewTime": past.to_rfc3339()
            }
        });

        api.patch(
            &self.lease_name,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;

        info!(identity = %self.identity, "Lease released for fast failover");
        Ok(())
    }
}

/// Guard that maintains leadership
///
/// While this guard exists the elector holds leadership and periodically
/// renews the lease. Use `lost()` to wait for leadership loss. The renewal
/// task is aborted when the guard is dropped.
#[derive(Debug)]
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Wait until leadership is lost
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Release leadership by clearing the lease holder
    pub async fn release_leadership(&self) -> Result<(), Error> {
        self.elector.release_lease().await
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.elector.is_leader.store(false, Ordering::SeqCst);
        self.renewal_task.abort();
        info!(identity = %self.elector.identity, "Leadership released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    const IDENTITY: &str = "replica-a";

    fn lease_json() -> Vec<u8> {
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        serde_json::to_vec(&json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": {
                "name": "controller-leader-election-capm3",
                "namespace": "capm3-system",
                "resourceVersion": "1"
            },
            "spec": {
                "holderIdentity": IDENTITY,
                "leaseDurationSeconds": 15,
                "acquireTime": now,
                "renewTime": now,
                "leaseTransitions": 0
            }
        }))
        .unwrap()
    }

    /// A coordination API stub owned by IDENTITY. Lease writes (PUT) whose
    /// zero-based sequence number falls in `failing_puts` answer 500.
    fn lease_client(
        failing_puts: std::ops::Range<usize>,
        puts: Arc<AtomicUsize>,
    ) -> Client {
        let svc = tower::service_fn(move |req: http::Request<kube::client::Body>| {
            let puts = Arc::clone(&puts);
            let failing_puts = failing_puts.clone();
            async move {
                let failed_put = req.method() == http::Method::PUT
                    && failing_puts.contains(&puts.fetch_add(1, Ordering::SeqCst));
                let resp = if failed_put {
                    http::Response::builder()
                        .status(500)
                        .header("content-type", "application/json")
                        .body(kube::client::Body::from(
                            br#"{"kind":"Status","apiVersion":"v1","status":"Failure","message":"etcd timeout","code":500}"#
                                .to_vec(),
                        ))
                        .unwrap()
                } else {
                    http::Response::builder()
                        .status(200)
                        .header("content-type", "application/json")
                        .body(kube::client::Body::from(lease_json()))
                        .unwrap()
                };
                Ok::<_, std::convert::Infallible>(resp)
            }
        });
        Client::new(svc, "capm3-system")
    }

    fn elector(client: Client) -> Arc<LeaderElector> {
        Arc::new(LeaderElector::new(
            client,
            "controller-leader-election-capm3",
            "capm3-system",
            IDENTITY,
            LeaderElectionConfig {
                enabled: true,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn default_config_satisfies_the_kubernetes_timing_convention() {
        let config = LeaderElectionConfig::default();
        assert!(config.renew_deadline < config.lease_duration);
        assert!(config.retry_period < config.renew_deadline);
        assert!(!config.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_renewal_failure_is_retried_within_the_renew_deadline() {
        let puts = Arc::new(AtomicUsize::new(0));
        // The second lease write (first renewal) fails once
        let client = lease_client(1..2, Arc::clone(&puts));
        let mut guard = elector(client).acquire().await.unwrap();

        let lost = tokio::time::timeout(Duration::from_secs(9), guard.lost()).await;
        assert!(lost.is_err(), "one failed renewal must not surrender leadership");
        assert!(puts.load(Ordering::SeqCst) >= 3, "renewal should have retried");
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_renewal_failure_surrenders_after_the_renew_deadline() {
        let puts = Arc::new(AtomicUsize::new(0));
        // Every renewal after acquisition fails
        let client = lease_client(1..usize::MAX, Arc::clone(&puts));
        let mut guard = elector(client).acquire().await.unwrap();

        let lost = tokio::time::timeout(Duration::from_secs(30), guard.lost()).await;
        assert!(lost.is_ok(), "leadership must be surrendered once the deadline expires");
    }
}
