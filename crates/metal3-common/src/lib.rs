//! Common types for the Metal3 operator: CRDs, errors, and shared runtime pieces

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kinds;
pub mod leader_election;
pub mod provisioning;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for the Metal3 infrastructure provider CRDs
pub const INFRA_GROUP: &str = "infrastructure.cluster.x-k8s.io";

/// API version for the Metal3 infrastructure provider CRDs
pub const INFRA_VERSION: &str = "v1beta1";

/// API group served by the bare-metal host operator
pub const BMH_GROUP: &str = "metal3.io";

/// API version served by the bare-metal host operator
pub const BMH_VERSION: &str = "v1alpha1";

/// Namespace for operator system resources (lease, serving certs)
pub const SYSTEM_NAMESPACE: &str = "capm3-system";

/// Label key whose value selects the objects a filtered deployment watches
pub const WATCH_FILTER_LABEL_KEY: &str = "cluster.x-k8s.io/watch-filter";

/// Resource-lock identity used for the leader-election Lease
pub const LEADER_LEASE_NAME: &str = "controller-leader-election-capm3";

/// User agent reported to the API server by the manager's client
pub const MANAGER_USER_AGENT: &str = "cluster-api-provider-metal3-manager";
