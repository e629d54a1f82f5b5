//! Process-wide registry of the resource kinds this operator serves
//!
//! Single write-once registry shared across all controllers and webhooks,
//! mapping each kind to its `ApiResource` definition. Populated during
//! bootstrap before any component runs and read-only afterward; repeated
//! population is a no-op so the bootstrap sequence stays idempotent.

use std::sync::OnceLock;

use dashmap::DashMap;
use kube::discovery::ApiResource;
use tracing::debug;

use crate::crd::{
    Metal3Cluster, Metal3Data, Metal3DataClaim, Metal3DataTemplate, Metal3Machine,
    Metal3MachineTemplate, Metal3Remediation, Metal3RemediationTemplate,
};

/// The closed set of resource kinds managed by this operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Metal3Machine
    Machine,
    /// Metal3Cluster
    Cluster,
    /// Metal3Data
    Data,
    /// Metal3DataClaim
    DataClaim,
    /// Metal3DataTemplate
    DataTemplate,
    /// Metal3MachineTemplate
    MachineTemplate,
    /// Metal3Remediation
    Remediation,
    /// Metal3RemediationTemplate
    RemediationTemplate,
}

/// All ResourceKind variants for iteration.
pub const ALL_RESOURCE_KINDS: &[ResourceKind] = &[
    ResourceKind::Machine,
    ResourceKind::Cluster,
    ResourceKind::Data,
    ResourceKind::DataClaim,
    ResourceKind::DataTemplate,
    ResourceKind::MachineTemplate,
    ResourceKind::Remediation,
    ResourceKind::RemediationTemplate,
];

impl ResourceKind {
    /// Kubernetes Kind string.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Machine => "Metal3Machine",
            Self::Cluster => "Metal3Cluster",
            Self::Data => "Metal3Data",
            Self::DataClaim => "Metal3DataClaim",
            Self::DataTemplate => "Metal3DataTemplate",
            Self::MachineTemplate => "Metal3MachineTemplate",
            Self::Remediation => "Metal3Remediation",
            Self::RemediationTemplate => "Metal3RemediationTemplate",
        }
    }

    /// Lowercase singular name, used for webhook route paths.
    pub fn singular(&self) -> &'static str {
        match self {
            Self::Machine => "metal3machine",
            Self::Cluster => "metal3cluster",
            Self::Data => "metal3data",
            Self::DataClaim => "metal3dataclaim",
            Self::DataTemplate => "metal3datatemplate",
            Self::MachineTemplate => "metal3machinetemplate",
            Self::Remediation => "metal3remediation",
            Self::RemediationTemplate => "metal3remediationtemplate",
        }
    }

    fn api_resource(&self) -> ApiResource {
        match self {
            Self::Machine => ApiResource::erase::<Metal3Machine>(&()),
            Self::Cluster => ApiResource::erase::<Metal3Cluster>(&()),
            Self::Data => ApiResource::erase::<Metal3Data>(&()),
            Self::DataClaim => ApiResource::erase::<Metal3DataClaim>(&()),
            Self::DataTemplate => ApiResource::erase::<Metal3DataTemplate>(&()),
            Self::MachineTemplate => ApiResource::erase::<Metal3MachineTemplate>(&()),
            Self::Remediation => ApiResource::erase::<Metal3Remediation>(&()),
            Self::RemediationTemplate => ApiResource::erase::<Metal3RemediationTemplate>(&()),
        }
    }
}

/// Write-once registry mapping resource kinds to their API definitions.
pub struct KindRegistry {
    entries: DashMap<ResourceKind, ApiResource>,
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.entries.len())
            .finish()
    }
}

static REGISTRY: OnceLock<KindRegistry> = OnceLock::new();

impl KindRegistry {
    fn build() -> Self {
        let entries = DashMap::new();
        for kind in ALL_RESOURCE_KINDS {
            entries.insert(*kind, kind.api_resource());
        }
        debug!(kinds = entries.len(), "kind registry populated");
        Self { entries }
    }

    /// Populate the process-wide registry and return it.
    ///
    /// Safe to call more than once; subsequent calls return the registry
    /// built by the first call.
    pub fn populate() -> &'static KindRegistry {
        REGISTRY.get_or_init(Self::build)
    }

    /// Resolve a kind to its API definition.
    pub fn resolve(&self, kind: ResourceKind) -> ApiResource {
        // All variants are inserted at build time, so the lookup cannot miss.
        self.entries
            .get(&kind)
            .map(|r| r.clone())
            .unwrap_or_else(|| kind.api_resource())
    }

    /// Number of resolvable kinds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the registry holds no kinds (never the case after populate).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_is_idempotent() {
        let first = KindRegistry::populate();
        let first_len = first.len();
        let second = KindRegistry::populate();
        assert_eq!(first_len, second.len());
        assert_eq!(first_len, ALL_RESOURCE_KINDS.len());
        // Same registry instance, not a re-population
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn every_kind_resolves_to_its_api_resource() {
        let registry = KindRegistry::populate();
        for kind in ALL_RESOURCE_KINDS {
            let ar = registry.resolve(*kind);
            assert_eq!(ar.kind, kind.kind_str());
            assert_eq!(ar.group, crate::INFRA_GROUP);
            assert_eq!(ar.version, crate::INFRA_VERSION);
        }
    }

    #[test]
    fn singulars_are_lowercase_kinds() {
        for kind in ALL_RESOURCE_KINDS {
            assert_eq!(kind.singular(), kind.kind_str().to_lowercase());
        }
    }
}
