//! Custom Resource Definitions for the Metal3 infrastructure provider
//!
//! These are the cluster-api infrastructure types reconciled and admitted by
//! the operator. Spec surfaces are kept to the fields the controllers and
//! webhooks actually read; the provisioning detail lives with the bare-metal
//! host operator behind the `metal3.io` group.

mod cluster;
mod data;
mod data_template;
mod machine;
mod machine_template;
mod remediation;

pub use cluster::{ApiEndpoint, Metal3Cluster, Metal3ClusterSpec, Metal3ClusterStatus};
pub use data::{
    Metal3Data, Metal3DataClaim, Metal3DataClaimSpec, Metal3DataClaimStatus, Metal3DataSpec,
    Metal3DataStatus,
};
pub use data_template::{Metal3DataTemplate, Metal3DataTemplateSpec, Metal3DataTemplateStatus};
pub use machine::{HostSelector, Image, Metal3Machine, Metal3MachineSpec, Metal3MachineStatus};
pub use machine_template::{
    Metal3MachineTemplate, Metal3MachineTemplateResource, Metal3MachineTemplateSpec,
};
pub use remediation::{
    Metal3Remediation, Metal3RemediationSpec, Metal3RemediationStatus, Metal3RemediationTemplate,
    Metal3RemediationTemplateResource, Metal3RemediationTemplateSpec, RemediationStrategy,
    RemediationType,
};
