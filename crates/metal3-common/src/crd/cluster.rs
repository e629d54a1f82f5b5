//! Metal3Cluster Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Metal3Cluster
///
/// The infrastructure-side counterpart of a cluster-api Cluster. Bare-metal
/// clusters have no cloud control plane, so the spec is mostly the API
/// endpoint the control-plane machines will serve on.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Cluster",
    plural = "metal3clusters",
    shortname = "m3c",
    status = "Metal3ClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".spec.controlPlaneEndpoint.host"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3ClusterSpec {
    /// Endpoint the cluster's API server is reachable on
    pub control_plane_endpoint: ApiEndpoint,

    /// True when no external cloud provider integration is expected
    #[serde(default)]
    pub no_cloud_provider: bool,
}

/// Host/port pair for the cluster API server
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// DNS name or IP address of the API server
    pub host: String,

    /// Port the API server listens on
    pub port: u16,
}

/// Status for a Metal3Cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3ClusterStatus {
    /// True once the infrastructure is ready for machine creation
    #[serde(default)]
    pub ready: bool,

    /// Terminal failure description, if infrastructure setup failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
