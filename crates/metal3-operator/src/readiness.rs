//! Startup gate on bare-metal API availability
//!
//! The machine controllers are useless until the BareMetalHost operator's API
//! group is served. When the deployment opts in, bootstrap blocks here and
//! polls discovery on a fixed interval until the group appears or the run
//! context is cancelled.

use std::future::Future;
use std::time::Duration;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metal3_common::Error;

/// Fixed delay between discovery attempts
pub const DISCOVERY_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Capability to ask the API server whether it serves a group/version
pub trait ApiDiscovery {
    /// True when the server resolves `group` at `version`
    fn server_supports(
        &self,
        group: &str,
        version: &str,
    ) -> impl Future<Output = Result<bool, Error>> + Send;
}

/// Discovery against a live API server
#[derive(Clone)]
pub struct KubeDiscovery {
    client: Client,
}

impl std::fmt::Debug for KubeDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeDiscovery").finish_non_exhaustive()
    }
}

impl KubeDiscovery {
    /// Wrap a client for discovery queries
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ApiDiscovery for KubeDiscovery {
    async fn server_supports(&self, group: &str, version: &str) -> Result<bool, Error> {
        match kube::discovery::group(&self.client, group).await {
            Ok(api_group) => Ok(api_group.versions().any(|v| v == version)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Block until the given API group/version is discoverable
///
/// Retries every [`DISCOVERY_RETRY_INTERVAL`] with no attempt cap and no
/// backoff. Discovery errors count as "not yet available" so a flapping API
/// server cannot kill a standby deployment. Returns `Error::Cancelled` when
/// the run context is cancelled mid-wait.
pub async fn wait_for_api_group<D: ApiDiscovery>(
    discovery: &D,
    group: &str,
    version: &str,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    loop {
        match discovery.server_supports(group, version).await {
            Ok(true) => {
                info!(group = %group, version = %version, "Found API group");
                return Ok(());
            }
            Ok(false) => {
                info!(
                    group = %group,
                    version = %version,
                    retry_secs = DISCOVERY_RETRY_INTERVAL.as_secs(),
                    "Waiting for API group to be available"
                );
            }
            Err(e) => {
                info!(
                    group = %group,
                    version = %version,
                    error = %e,
                    retry_secs = DISCOVERY_RETRY_INTERVAL.as_secs(),
                    "Waiting for API group to be available"
                );
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::Cancelled {
                    operation: format!("waiting for API group {group}/{version}"),
                });
            }
            _ = tokio::time::sleep(DISCOVERY_RETRY_INTERVAL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct ScriptedDiscovery {
        available_after: usize,
        attempts: AtomicUsize,
    }

    impl ScriptedDiscovery {
        fn new(available_after: usize) -> Self {
            Self {
                available_after,
                attempts: AtomicUsize::new(0),
            }
        }
    }

    impl ApiDiscovery for ScriptedDiscovery {
        async fn server_supports(&self, _group: &str, _version: &str) -> Result<bool, Error> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n > self.available_after)
        }
    }

    struct FlakyDiscovery {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl ApiDiscovery for FlakyDiscovery {
        async fn server_supports(&self, group: &str, version: &str) -> Result<bool, Error> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(Error::Discovery {
                    group: group.to_string(),
                    version: version.to_string(),
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(true)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gate_retries_on_the_fixed_interval_until_available() {
        let discovery = ScriptedDiscovery::new(2);
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        wait_for_api_group(&discovery, "metal3.io", "v1alpha1", &cancel)
            .await
            .unwrap();

        assert_eq!(discovery.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), DISCOVERY_RETRY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_returns_immediately_when_the_group_is_served() {
        let discovery = ScriptedDiscovery::new(0);
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        wait_for_api_group(&discovery, "metal3.io", "v1alpha1", &cancel)
            .await
            .unwrap();

        assert_eq!(discovery.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_errors_count_as_not_yet_available() {
        let discovery = FlakyDiscovery {
            failures: 2,
            attempts: AtomicUsize::new(0),
        };
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        wait_for_api_group(&discovery, "metal3.io", "v1alpha1", &cancel)
            .await
            .unwrap();

        assert_eq!(discovery.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), DISCOVERY_RETRY_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let discovery = ScriptedDiscovery::new(usize::MAX);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_api_group(&discovery, "metal3.io", "v1alpha1", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
