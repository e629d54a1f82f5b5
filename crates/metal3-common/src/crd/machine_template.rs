//! Metal3MachineTemplate Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::machine::Metal3MachineSpec;

/// Specification for a Metal3MachineTemplate
///
/// Stamped out by cluster-api MachineDeployments and KubeadmControlPlanes to
/// create Metal3Machines.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3MachineTemplate",
    plural = "metal3machinetemplates",
    shortname = "m3mt",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineTemplateSpec {
    /// Machine spec stamped onto each created Metal3Machine
    pub template: Metal3MachineTemplateResource,

    /// When true, machines created from this template prefer re-claiming the
    /// host their predecessor released (rolling-upgrade affinity)
    #[serde(default)]
    pub node_reuse: bool,
}

/// Template body holding the machine spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3MachineTemplateResource {
    /// Spec for Metal3Machines created from this template
    pub spec: Metal3MachineSpec,
}
