//! Metal3Machine Custom Resource Definition
//!
//! A Metal3Machine is the infrastructure-side counterpart of a cluster-api
//! Machine: it pairs the Machine with a bare-metal host and carries the image
//! and metadata used to provision it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Metal3Machine
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Machine",
    plural = "metal3machines",
    shortname = "m3m",
    status = "Metal3MachineStatus",
    namespaced,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"ProviderID","type":"string","jsonPath":".spec.providerID"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineSpec {
    /// Provider ID set once the machine is paired with a bare-metal host
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "providerID")]
    pub provider_id: Option<String>,

    /// OS image deployed onto the paired host
    pub image: Image,

    /// Label selector narrowing which bare-metal hosts this machine may claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_selector: Option<HostSelector>,

    /// Name of the Metal3DataTemplate rendered into per-host metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_template: Option<String>,

    /// Cleaning mode applied when the host is released ("automated" or "disabled")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated_cleaning_mode: Option<String>,
}

/// OS image reference with integrity checksum
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// URL of the image to deploy
    pub url: String,

    /// Checksum (value or URL to a checksum file)
    pub checksum: String,

    /// Checksum algorithm (md5, sha256, sha512); server defaults to md5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_type: Option<String>,
}

/// Label selector constraining host selection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostSelector {
    /// Labels a candidate host must carry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// Status for a Metal3Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineStatus {
    /// True once the paired host is provisioned and the node is registered
    #[serde(default)]
    pub ready: bool,

    /// Lifecycle phase reported by the machine manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Terminal failure description, if provisioning failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}
