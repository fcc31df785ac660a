//! System Resolver
//!
//! System-scoped discovery: locating an array by ID, its singleton
//! configuration services, its generation tier, and its storage pools.

use crate::domain::model::{classes, ServiceKind, V3_MICROCODE_FAMILY};
use crate::domain::ports::ObjectPath;
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How to treat more than one instance of a singleton service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSelection {
    /// Fail with [`Error::AmbiguousService`]
    #[default]
    Exclusive,
    /// Use the first instance returned
    FirstMatch,
}

/// Resolves arrays and their management services
#[derive(Clone)]
pub struct SystemResolver {
    graph: ResourceGraph,
    selection: ServiceSelection,
}

impl SystemResolver {
    pub fn new(graph: ResourceGraph, selection: ServiceSelection) -> Self {
        Self { graph, selection }
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// All storage systems managed by the provider
    pub async fn storage_systems(&self) -> Result<Vec<ObjectPath>> {
        self.graph.enumerate_names(classes::STORAGE_SYSTEM).await
    }

    /// Find the storage system whose `Name` equals or ends with `id`
    pub async fn resolve_system(&self, id: &str) -> Result<ObjectPath> {
        let systems = self.storage_systems().await?;
        systems
            .into_iter()
            .find(|system| {
                system
                    .key("Name")
                    .map(|name| name == id || name.ends_with(id))
                    .unwrap_or(false)
            })
            .ok_or_else(|| Error::not_found("StorageSystem", id))
    }

    /// The single `kind` service hosted by `system`
    pub async fn resolve_service(
        &self,
        system: &ObjectPath,
        kind: ServiceKind,
    ) -> Result<ObjectPath> {
        let mut services = self
            .graph
            .associated_of_class(system, kind.class_name())
            .await?;
        match (services.len(), self.selection) {
            (0, _) => Err(Error::not_found(kind.class_name(), system.to_string())),
            (1, _) | (_, ServiceSelection::FirstMatch) => {
                if services.len() > 1 {
                    warn!(
                        "{} instances of {} on {}, using the first",
                        services.len(),
                        kind,
                        system
                    );
                }
                Ok(services.swap_remove(0))
            }
            (count, ServiceSelection::Exclusive) => Err(Error::AmbiguousService {
                service: kind.class_name().to_string(),
                count,
            }),
        }
    }

    /// Software identity instance of `system`, matched by InstanceID
    async fn software_identity(&self, system: &ObjectPath) -> Result<ObjectPath> {
        let system_name = system.key("Name")?;
        self.graph
            .enumerate_names(classes::SOFTWARE_IDENTITY)
            .await?
            .into_iter()
            .find(|identity| identity.key("InstanceID").ok() == Some(system_name))
            .ok_or_else(|| Error::not_found(classes::SOFTWARE_IDENTITY, system_name))
    }

    async fn microcode_family(&self, system: &ObjectPath) -> Result<i64> {
        let identity = self.software_identity(system).await?;
        let instance = self.graph.get_instance(&identity).await?;
        instance.int_property("EMCEnginuityFamily")
    }

    /// Whether `system` runs microcode family 5900 or later
    ///
    /// Any failure along the way is treated as a legacy array.
    pub async fn is_generation_v3(&self, system: &ObjectPath) -> bool {
        match self.microcode_family(system).await {
            Ok(family) => {
                debug!("{} runs microcode family {}", system, family);
                family >= V3_MICROCODE_FAMILY
            }
            Err(e) => {
                warn!("Generation lookup failed for {}, assuming legacy: {}", system, e);
                false
            }
        }
    }

    /// Pool class queried for `system`
    pub async fn pool_class(&self, system: &ObjectPath) -> &'static str {
        if self.is_generation_v3(system).await {
            classes::SRP_STORAGE_POOL
        } else {
            classes::VIRTUAL_PROVISIONING_POOL
        }
    }

    /// Storage pools of `system`: SRPs on V3 arrays, virtual pools otherwise
    pub async fn resolve_pools(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        let class_name = self.pool_class(system).await;
        self.graph.associated_of_class(system, class_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::CimValue;
    use crate::simulator::SimulatedArray;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const SID: &str = "000196701380";

    fn resolver(array: &Arc<SimulatedArray>, selection: ServiceSelection) -> SystemResolver {
        SystemResolver::new(ResourceGraph::new(array.clone()), selection)
    }

    #[tokio::test]
    async fn test_resolve_system_by_suffix_and_exact_name() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        array.add_system("000197800123", 5978);
        let resolver = resolver(&array, ServiceSelection::Exclusive);

        assert_eq!(resolver.resolve_system(SID).await.unwrap(), system);
        assert_eq!(resolver.resolve_system("701380").await.unwrap(), system);
        assert_eq!(
            resolver
                .resolve_system("SYMMETRIX-+-000196701380")
                .await
                .unwrap(),
            system
        );
        assert_matches!(
            resolver.resolve_system("999999").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_resolve_service_is_idempotent() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let resolver = resolver(&array, ServiceSelection::Exclusive);

        for kind in [
            ServiceKind::StorageConfiguration,
            ServiceKind::ControllerConfiguration,
            ServiceKind::HardwareIdManagement,
        ] {
            let first = resolver.resolve_service(&system, kind).await.unwrap();
            let second = resolver.resolve_service(&system, kind).await.unwrap();
            assert_eq!(first, second);
            assert_eq!(first.key("SystemName").unwrap(), "SYMMETRIX-+-000196701380");
        }
    }

    #[tokio::test]
    async fn test_ambiguous_service_selection() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        array.add_service(&system, ServiceKind::ControllerConfiguration, "Duplicate");

        let strict = resolver(&array, ServiceSelection::Exclusive);
        assert_matches!(
            strict
                .resolve_service(&system, ServiceKind::ControllerConfiguration)
                .await,
            Err(Error::AmbiguousService { count: 2, .. })
        );

        let lenient = resolver(&array, ServiceSelection::FirstMatch);
        let first = lenient
            .resolve_service(&system, ServiceKind::ControllerConfiguration)
            .await
            .unwrap();
        let again = lenient
            .resolve_service(&system, ServiceKind::ControllerConfiguration)
            .await
            .unwrap();
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_generation_boundary() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5899);
        let resolver = resolver(&array, ServiceSelection::Exclusive);
        assert!(!resolver.is_generation_v3(&system).await);

        array.set_microcode_family(&system, "5900");
        assert!(resolver.is_generation_v3(&system).await);

        array.set_microcode_family(&system, CimValue::Integer(5978));
        assert!(resolver.is_generation_v3(&system).await);
    }

    #[tokio::test]
    async fn test_generation_lookup_failures_mean_legacy() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let resolver = resolver(&array, ServiceSelection::Exclusive);

        array.set_microcode_family(&system, "5978-ucode");
        assert!(!resolver.is_generation_v3(&system).await);

        array.set_microcode_family(&system, CimValue::Null);
        assert!(!resolver.is_generation_v3(&system).await);

        array.set_microcode_family(&system, "5978");
        array.fail_get_instance(classes::SOFTWARE_IDENTITY);
        assert!(!resolver.is_generation_v3(&system).await);

        let other = array.add_system("000197800123", 5978);
        array.remove_software_identity(&other);
        assert!(!resolver.is_generation_v3(&other).await);
    }

    #[tokio::test]
    async fn test_pools_follow_generation() {
        let array = Arc::new(SimulatedArray::new());
        let v3 = array.add_system(SID, 5978);
        let srp = array.add_srp(&v3, "SRP_1");
        let legacy = array.add_system("000195700456", 5876);
        let thin = array.add_virtual_pool(&legacy, "FC_Pool");
        let resolver = resolver(&array, ServiceSelection::Exclusive);

        assert_eq!(resolver.resolve_pools(&v3).await.unwrap(), vec![srp]);
        assert_eq!(resolver.resolve_pools(&legacy).await.unwrap(), vec![thin]);
    }
}
