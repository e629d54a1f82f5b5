//! CLI flags and the validated runtime configuration built from them

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use metal3_common::leader_election::LeaderElectionConfig;
use metal3_common::telemetry::LogFormat;
use metal3_common::{Error, WATCH_FILTER_LABEL_KEY};

use crate::controllers::ReconcilerKind;

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

/// Command-line flags for the manager
#[derive(Parser, Debug, Clone)]
#[command(name = "metal3-operator", version, about = "Cluster API provider for Metal3")]
pub struct Flags {
    /// The address the metric endpoint binds to
    #[arg(long = "metrics-bind-addr", default_value = "localhost:8080")]
    pub metrics_bind_addr: String,

    /// Enable leader election for controller manager. Enabling this will
    /// ensure there is only one active controller manager
    #[arg(long = "leader-elect")]
    pub leader_elect: bool,

    /// Interval at which non-leader candidates will wait to force acquire
    /// leadership (duration string)
    #[arg(long = "leader-elect-lease-duration", default_value = "15s", value_parser = parse_duration)]
    pub leader_elect_lease_duration: Duration,

    /// Duration that the leading controller manager will retry refreshing
    /// leadership before giving up (duration string)
    #[arg(long = "leader-elect-renew-deadline", default_value = "10s", value_parser = parse_duration)]
    pub leader_elect_renew_deadline: Duration,

    /// Duration the leader elector should wait between tries of actions
    /// (duration string)
    #[arg(long = "leader-elect-retry-period", default_value = "2s", value_parser = parse_duration)]
    pub leader_elect_retry_period: Duration,

    /// Namespace that the controller watches to reconcile objects. If
    /// unspecified, the controller watches across all namespaces
    #[arg(long = "namespace", default_value = "")]
    pub namespace: String,

    /// Label value that the controller watches to reconcile cluster-api
    /// objects. Label key is always cluster.x-k8s.io/watch-filter. If
    /// unspecified, the controller watches for all cluster-api objects
    #[arg(long = "watch-filter", default_value = "")]
    pub watch_filter: String,

    /// The minimum interval at which watched resources are reconciled
    /// (e.g. 15m)
    #[arg(long = "sync-period", default_value = "10m", value_parser = parse_duration)]
    pub sync_period: Duration,

    /// Wait for the bare-metal host API group to be discoverable before
    /// starting any controller
    #[arg(long = "wait-for-metal3-controller")]
    pub wait_for_metal3_controller: bool,

    /// If set to true, host preallocation matches hosts to machines by name
    #[arg(long = "enableBMHNameBasedPreallocation")]
    pub enable_bmh_name_based_preallocation: bool,

    /// Webhook Server port
    #[arg(long = "webhook-port", default_value_t = 9443)]
    pub webhook_port: u16,

    /// Webhook cert dir, only used when webhook-port is specified
    #[arg(long = "webhook-cert-dir", default_value = "/tmp/k8s-webhook-server/serving-certs/")]
    pub webhook_cert_dir: PathBuf,

    /// The address the health endpoint binds to
    #[arg(long = "health-addr", default_value = ":9440")]
    pub health_addr: String,

    /// Number of metal3machines to process simultaneously.
    /// WARNING! Currently not safe to set > 1
    #[arg(long = "metal3machine-concurrency", default_value_t = 1)]
    pub metal3machine_concurrency: usize,

    /// Number of metal3clusters to process simultaneously
    #[arg(long = "metal3cluster-concurrency", default_value_t = 10)]
    pub metal3cluster_concurrency: usize,

    /// Number of metal3datatemplates to process simultaneously
    #[arg(long = "metal3datatemplate-concurrency", default_value_t = 10)]
    pub metal3datatemplate_concurrency: usize,

    /// Number of metal3data to process simultaneously
    #[arg(long = "metal3data-concurrency", default_value_t = 10)]
    pub metal3data_concurrency: usize,

    /// Number of metal3labelsyncs to process simultaneously
    #[arg(long = "metal3labelsync-concurrency", default_value_t = 10)]
    pub metal3labelsync_concurrency: usize,

    /// Number of metal3machinetemplates to process simultaneously
    #[arg(long = "metal3machinetemplate-concurrency", default_value_t = 10)]
    pub metal3machinetemplate_concurrency: usize,

    /// Number of metal3remediations to process simultaneously
    #[arg(long = "metal3remediation-concurrency", default_value_t = 10)]
    pub metal3remediation_concurrency: usize,

    /// The minimum TLS version in use by the webhook server.
    /// Possible values are TLS12, TLS13
    #[arg(long = "tls-min-version", default_value = "TLS12")]
    pub tls_min_version: String,

    /// The maximum TLS version in use by the webhook server.
    /// Possible values are TLS12, TLS13
    #[arg(long = "tls-max-version", default_value = "TLS13")]
    pub tls_max_version: String,

    /// Comma-separated list of cipher suites for the webhook server.
    /// If omitted, the provider default cipher suites are used
    #[arg(long = "tls-cipher-suites", default_value = "")]
    pub tls_cipher_suites: String,

    /// Log output encoding (json or text)
    #[arg(long = "log-format", default_value = "json")]
    pub log_format: LogFormat,
}

/// Raw TLS flag values, resolved later by the policy builder
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Minimum protocol version label (TLS12, TLS13)
    pub min_version: String,
    /// Maximum protocol version label (TLS12, TLS13)
    pub max_version: String,
    /// Comma-separated cipher suite names; empty means provider defaults
    pub cipher_suites: String,
}

/// Per-kind reconcile concurrency caps
#[derive(Debug, Clone)]
pub struct ConcurrencyLimits {
    /// Metal3Machine workers
    pub machine: usize,
    /// Metal3Cluster workers
    pub cluster: usize,
    /// Metal3DataTemplate workers
    pub data_template: usize,
    /// Metal3Data workers
    pub data: usize,
    /// Node label sync workers
    pub label_sync: usize,
    /// Metal3MachineTemplate workers
    pub machine_template: usize,
    /// Metal3Remediation workers
    pub remediation: usize,
}

impl ConcurrencyLimits {
    /// The cap for one reconciler kind
    pub fn for_kind(&self, kind: ReconcilerKind) -> usize {
        match kind {
            ReconcilerKind::Machine => self.machine,
            ReconcilerKind::Cluster => self.cluster,
            ReconcilerKind::DataTemplate => self.data_template,
            ReconcilerKind::Data => self.data,
            ReconcilerKind::LabelSync => self.label_sync,
            ReconcilerKind::MachineTemplate => self.machine_template,
            ReconcilerKind::Remediation => self.remediation,
        }
    }
}

/// Validated configuration the bootstrap sequence runs from
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bind address for the metrics endpoint
    pub metrics_bind_addr: String,
    /// Bind address for the health probe endpoint
    pub health_addr: String,
    /// Leader election settings
    pub leader_election: LeaderElectionConfig,
    /// Namespace filter; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Watch-filter label value; `None` watches all objects
    pub watch_filter: Option<String>,
    /// Minimum re-reconcile interval for watched resources
    pub sync_period: Duration,
    /// Whether to gate startup on bare-metal API discovery
    pub wait_for_metal3_controller: bool,
    /// Host name-based preallocation toggle
    pub enable_bmh_name_based_preallocation: bool,
    /// Webhook server port
    pub webhook_port: u16,
    /// Directory holding tls.crt and tls.key for the webhook server
    pub webhook_cert_dir: PathBuf,
    /// Per-kind concurrency caps
    pub concurrency: ConcurrencyLimits,
    /// Raw TLS flag values for the policy builder
    pub tls: TlsOptions,
    /// Log output encoding
    pub log_format: LogFormat,
}

impl Flags {
    /// Validate the flags into a runtime configuration
    pub fn into_runtime_config(self) -> Result<RuntimeConfig, Error> {
        let concurrency = ConcurrencyLimits {
            machine: self.metal3machine_concurrency,
            cluster: self.metal3cluster_concurrency,
            data_template: self.metal3datatemplate_concurrency,
            data: self.metal3data_concurrency,
            label_sync: self.metal3labelsync_concurrency,
            machine_template: self.metal3machinetemplate_concurrency,
            remediation: self.metal3remediation_concurrency,
        };
        for kind in ReconcilerKind::ALL {
            let workers = concurrency.for_kind(*kind);
            if workers == 0 {
                return Err(Error::configuration(format!(
                    "{} concurrency must be at least 1",
                    kind.name()
                )));
            }
            if workers > usize::from(u16::MAX) {
                return Err(Error::configuration(format!(
                    "{} concurrency must be at most {}",
                    kind.name(),
                    u16::MAX
                )));
            }
        }

        let namespace = if self.namespace.is_empty() {
            None
        } else {
            Some(self.namespace)
        };
        let watch_filter = if self.watch_filter.is_empty() {
            None
        } else {
            Some(self.watch_filter)
        };
        if let Some(ref filter) = watch_filter {
            tracing::debug!(
                label = WATCH_FILTER_LABEL_KEY,
                value = %filter,
                "Watch filter enabled"
            );
        }

        Ok(RuntimeConfig {
            metrics_bind_addr: normalize_bind_addr(&self.metrics_bind_addr),
            health_addr: normalize_bind_addr(&self.health_addr),
            leader_election: LeaderElectionConfig {
                enabled: self.leader_elect,
                lease_duration: self.leader_elect_lease_duration,
                renew_deadline: self.leader_elect_renew_deadline,
                retry_period: self.leader_elect_retry_period,
            },
            namespace,
            watch_filter,
            sync_period: self.sync_period,
            wait_for_metal3_controller: self.wait_for_metal3_controller,
            enable_bmh_name_based_preallocation: self.enable_bmh_name_based_preallocation,
            webhook_port: self.webhook_port,
            webhook_cert_dir: self.webhook_cert_dir,
            concurrency,
            tls: TlsOptions {
                min_version: self.tls_min_version,
                max_version: self.tls_max_version,
                cipher_suites: self.tls_cipher_suites,
            },
            log_format: self.log_format,
        })
    }
}

/// Expand the ":port" shorthand into an address tokio can bind
fn normalize_bind_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Flags {
        let mut argv = vec!["metal3-operator"];
        argv.extend(args);
        Flags::parse_from(argv)
    }

    #[test]
    fn defaults_match_the_deployment_manifest() {
        let config = parse(&[]).into_runtime_config().unwrap();
        assert_eq!(config.metrics_bind_addr, "localhost:8080");
        assert_eq!(config.health_addr, "0.0.0.0:9440");
        assert_eq!(config.webhook_port, 9443);
        assert_eq!(
            config.webhook_cert_dir,
            PathBuf::from("/tmp/k8s-webhook-server/serving-certs/")
        );
        assert_eq!(config.sync_period, Duration::from_secs(600));
        assert!(!config.leader_election.enabled);
        assert_eq!(config.leader_election.lease_duration, Duration::from_secs(15));
        assert_eq!(config.leader_election.renew_deadline, Duration::from_secs(10));
        assert_eq!(config.leader_election.retry_period, Duration::from_secs(2));
        assert_eq!(config.concurrency.machine, 1);
        assert_eq!(config.concurrency.cluster, 10);
        assert_eq!(config.concurrency.remediation, 10);
        assert_eq!(config.tls.min_version, "TLS12");
        assert_eq!(config.tls.max_version, "TLS13");
        assert!(config.tls.cipher_suites.is_empty());
        assert!(config.namespace.is_none());
        assert!(config.watch_filter.is_none());
        assert!(!config.wait_for_metal3_controller);
        assert!(!config.enable_bmh_name_based_preallocation);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = parse(&["--metal3cluster-concurrency", "0"])
            .into_runtime_config()
            .unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn oversized_concurrency_is_rejected() {
        let err = parse(&["--metal3cluster-concurrency", "65536"])
            .into_runtime_config()
            .unwrap_err();
        assert!(err.to_string().contains("65535"));
    }

    #[test]
    fn durations_accept_humantime_strings() {
        let config = parse(&["--sync-period", "15m", "--leader-elect-lease-duration", "30s"])
            .into_runtime_config()
            .unwrap();
        assert_eq!(config.sync_period, Duration::from_secs(900));
        assert_eq!(config.leader_election.lease_duration, Duration::from_secs(30));
    }

    #[test]
    fn empty_namespace_and_filter_watch_everything() {
        let config = parse(&["--namespace", "metal3", "--watch-filter", "prod"])
            .into_runtime_config()
            .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("metal3"));
        assert_eq!(config.watch_filter.as_deref(), Some("prod"));
    }
}
