//! Metal3Data and Metal3DataClaim Custom Resource Definitions

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Metal3Data
///
/// One rendered instance of a Metal3DataTemplate, bound to a single machine.
/// The rendered payloads land in secrets consumed by the host provisioner.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Data",
    plural = "metal3datas",
    shortname = "m3d",
    status = "Metal3DataStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Index","type":"integer","jsonPath":".spec.index"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataSpec {
    /// Name of the Metal3DataTemplate this object was rendered from
    pub template: String,

    /// Name of the Metal3DataClaim that requested this object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,

    /// Index unique within the owning template
    #[serde(default)]
    pub index: u32,
}

/// Status for a Metal3Data
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataStatus {
    /// True once the metadata and network-data secrets are rendered
    #[serde(default)]
    pub ready: bool,

    /// Rendering error, if the template could not be materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Specification for a Metal3DataClaim
///
/// Claims an index and a rendered Metal3Data out of a Metal3DataTemplate on
/// behalf of a machine.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3DataClaim",
    plural = "metal3dataclaims",
    status = "Metal3DataClaimStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataClaimSpec {
    /// Name of the Metal3DataTemplate to claim from
    pub template: String,
}

/// Status for a Metal3DataClaim
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataClaimStatus {
    /// Name of the Metal3Data allocated to this claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_data: Option<String>,

    /// Allocation error, if no index was available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
