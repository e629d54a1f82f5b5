//! Metal3DataTemplate Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Metal3DataTemplate
///
/// A template of per-machine metadata and network data. Each Metal3Machine
/// referencing the template gets a Metal3Data object rendered from it, with
/// an index unique within the template.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3DataTemplate",
    plural = "metal3datatemplates",
    shortname = "m3dt",
    status = "Metal3DataTemplateStatus",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataTemplateSpec {
    /// Name of the owning cluster-api Cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Opaque metadata template rendered into each Metal3Data secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<serde_json::Value>,

    /// Opaque network-data template rendered into each Metal3Data secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data: Option<serde_json::Value>,
}

/// Status for a Metal3DataTemplate
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3DataTemplateStatus {
    /// Indexes currently allocated to claims, keyed by claim name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexes: Option<std::collections::BTreeMap<String, u32>>,

    /// Last time the template was reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}
