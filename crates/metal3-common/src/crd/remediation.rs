//! Metal3Remediation and Metal3RemediationTemplate Custom Resource Definitions

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Metal3Remediation
///
/// Created by the cluster-api remediation machinery when a machine's health
/// check fails; drives the reboot-based recovery of the underlying host.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3Remediation",
    plural = "metal3remediations",
    shortname = "m3r",
    status = "Metal3RemediationStatus",
    namespaced,
    printcolumn = r#"{"name":"Strategy","type":"string","jsonPath":".spec.strategy.type"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Retries","type":"integer","jsonPath":".status.retryCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationSpec {
    /// How the unhealthy host is remediated
    pub strategy: RemediationStrategy,
}

/// Remediation strategy parameters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemediationStrategy {
    /// Strategy type; reboot is the only supported strategy today
    #[serde(rename = "type")]
    pub remediation_type: RemediationType,

    /// Maximum number of remediation attempts before giving up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_limit: Option<u32>,

    /// Minimum interval between attempts (e.g. "300s")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Supported remediation strategies
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub enum RemediationType {
    /// Power-cycle the host through its management controller
    #[default]
    Reboot,
}

/// Status for a Metal3Remediation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationStatus {
    /// Current phase (Running, Waiting, Deleting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Attempts made so far
    #[serde(default)]
    pub retry_count: u32,

    /// Timestamp of the most recent attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_remediated: Option<String>,
}

/// Specification for a Metal3RemediationTemplate
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Metal3RemediationTemplate",
    plural = "metal3remediationtemplates",
    shortname = "m3rt",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationTemplateSpec {
    /// Remediation spec stamped onto each created Metal3Remediation
    pub template: Metal3RemediationTemplateResource,
}

/// Template body holding the remediation spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metal3RemediationTemplateResource {
    /// Spec for Metal3Remediations created from this template
    pub spec: Metal3RemediationSpec,
}
