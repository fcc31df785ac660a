//! Inventory
//!
//! Read-only discovery of what an array holds: masking views and groups,
//! volumes, registered hardware IDs, pool capabilities and settings,
//! service levels and directors.

use crate::domain::model::{classes, GroupKind, ServiceKind, Slo};
use crate::domain::ports::{Instance, ObjectPath};
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::identifier::DELIMITER;
use crate::system::SystemResolver;
use tracing::debug;

#[derive(Clone)]
pub struct Inventory {
    resolver: SystemResolver,
}

impl Inventory {
    pub fn new(resolver: SystemResolver) -> Self {
        Self { resolver }
    }

    fn graph(&self) -> &ResourceGraph {
        self.resolver.graph()
    }

    pub async fn storage_systems(&self) -> Result<Vec<ObjectPath>> {
        self.resolver.storage_systems().await
    }

    pub async fn masking_views(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.graph()
            .associated_of_class(system, classes::MASKING_VIEW)
            .await
    }

    // =========================================================================
    // Masking Groups
    // =========================================================================

    /// Groups of one kind, as seen from the controller configuration service
    pub async fn groups(&self, system: &ObjectPath, kind: GroupKind) -> Result<Vec<ObjectPath>> {
        let service = self
            .resolver
            .resolve_service(system, ServiceKind::ControllerConfiguration)
            .await?;
        self.graph()
            .associated_of_class(&service, kind.class_name())
            .await
    }

    pub async fn storage_groups(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.groups(system, GroupKind::Storage).await
    }

    pub async fn port_groups(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.groups(system, GroupKind::Port).await
    }

    pub async fn initiator_groups(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.groups(system, GroupKind::Initiator).await
    }

    // =========================================================================
    // Volumes
    // =========================================================================

    pub async fn volumes(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.graph()
            .associated_of_class(system, classes::STORAGE_VOLUME)
            .await
    }

    /// Volume whose `DeviceID` key equals `device_id`
    pub async fn volume_by_id(&self, system: &ObjectPath, device_id: &str) -> Result<ObjectPath> {
        self.volumes(system)
            .await?
            .into_iter()
            .find(|volume| volume.key("DeviceID").ok() == Some(device_id))
            .ok_or_else(|| Error::not_found("StorageVolume", device_id))
    }

    /// First volume whose `ElementName` equals `name`
    ///
    /// Costs one GetInstance per volume on the system.
    pub async fn volume_by_name(&self, system: &ObjectPath, name: &str) -> Result<ObjectPath> {
        for volume in self.volumes(system).await? {
            let instance = self.graph().get_instance(&volume).await?;
            if instance.opt_str_property("ElementName") == Some(name) {
                return Ok(volume);
            }
        }
        Err(Error::not_found("StorageVolume", name))
    }

    // =========================================================================
    // Hardware IDs and Directors
    // =========================================================================

    pub async fn hardware_ids(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        let service = self
            .resolver
            .resolve_service(system, ServiceKind::HardwareIdManagement)
            .await?;
        self.graph()
            .associated_of_class(&service, classes::HARDWARE_ID)
            .await
    }

    /// Director systems whose `Name` is scoped under the array's own name
    pub async fn processor_systems(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        let scope = format!("{}{}", system.key("Name")?, DELIMITER);
        let processors = self
            .graph()
            .enumerate_names(classes::PROCESSOR_SYSTEM)
            .await?;
        Ok(processors
            .into_iter()
            .filter(|p| p.key("Name").map_or(false, |n| n.starts_with(&scope)))
            .collect())
    }

    // =========================================================================
    // Pools and Service Levels
    // =========================================================================

    pub async fn pools(&self, system: &ObjectPath) -> Result<Vec<ObjectPath>> {
        self.resolver.resolve_pools(system).await
    }

    /// Capabilities object sharing the pool's `InstanceID`
    pub async fn pool_capabilities(&self, pool: &ObjectPath) -> Result<ObjectPath> {
        let instance_id = pool.key("InstanceID")?;
        self.graph()
            .enumerate_names(classes::STORAGE_POOL_CAPABILITIES)
            .await?
            .into_iter()
            .find(|caps| caps.key("InstanceID").ok() == Some(instance_id))
            .ok_or_else(|| Error::not_found(classes::STORAGE_POOL_CAPABILITIES, instance_id))
    }

    /// Storage settings defined by the pool's capabilities
    pub async fn pool_settings(&self, pool: &ObjectPath) -> Result<Vec<ObjectPath>> {
        let capabilities = self.pool_capabilities(pool).await?;
        self.graph()
            .associated_of_class(&capabilities, classes::STORAGE_SETTING)
            .await
    }

    /// Service levels offered by every SRP of a V3 array
    pub async fn slos(&self, system: &ObjectPath) -> Result<Vec<Slo>> {
        if !self.resolver.is_generation_v3(system).await {
            return Err(Error::Unsupported(format!(
                "service levels on pre-V3 array {}",
                system
            )));
        }
        let mut slos = Vec::new();
        for pool in self.pools(system).await? {
            for setting in self.pool_settings(&pool).await? {
                let instance = self.graph().get_instance(&setting).await?;
                slos.push(slo_from_instance(&instance)?);
            }
        }
        debug!("{} service levels on {}", slos.len(), system);
        Ok(slos)
    }
}

fn slo_from_instance(instance: &Instance) -> Result<Slo> {
    Ok(Slo {
        name: instance.str_property("EMCSLOBaseName")?.to_string(),
        response_time_ms: instance.f64_property("EMCApproxAverageResponseTime")?,
        srp: instance.str_property("EMCSRP")?.to_string(),
        workload: instance.str_property("EMCWorkload")?.to_string(),
        element_name: instance.str_property("ElementName")?.to_string(),
        instance_id: instance.str_property("InstanceID")?.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{ArraySnapshot, SimulatedArray};
    use crate::system::ServiceSelection;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const SID: &str = "000196701380";

    fn inventory(array: &Arc<SimulatedArray>) -> Inventory {
        Inventory::new(SystemResolver::new(
            ResourceGraph::new(array.clone()),
            ServiceSelection::Exclusive,
        ))
    }

    fn diamond() -> Slo {
        Slo {
            name: "Diamond".into(),
            response_time_ms: 0.8,
            srp: "SRP_1".into(),
            workload: "OLTP".into(),
            element_name: "Diamond+OLTP".into(),
            instance_id: "SYMMETRIX-+-000196701380-+-Diamond-+-OLTP".into(),
        }
    }

    #[tokio::test]
    async fn test_groups_by_kind() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let sg = array.add_group(&system, GroupKind::Storage, "sg_ora");
        let ig = array.add_group(&system, GroupKind::Initiator, "ig_host1");
        let inventory = inventory(&array);

        assert_eq!(inventory.storage_groups(&system).await.unwrap(), vec![sg]);
        assert_eq!(inventory.initiator_groups(&system).await.unwrap(), vec![ig]);
        assert!(inventory.port_groups(&system).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processor_systems_scoped_to_array() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let longer = array.add_system("0001967013801", 5978);
        array.add_front_end_port(&system, "FA-1D", "4", "5000097308012C10");
        array.add_front_end_port(&longer, "FA-1D", "4", "5000097308012C20");
        let inventory = inventory(&array);

        let processors = inventory.processor_systems(&system).await.unwrap();
        assert_eq!(processors.len(), 1);
        assert_eq!(
            processors[0].key("Name").unwrap(),
            "SYMMETRIX-+-000196701380-+-FA-1D"
        );
        assert_eq!(inventory.processor_systems(&longer).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_volume_lookup() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let first = array.add_volume(&system, "00123", "oradata", None);
        let second = array.add_volume(&system, "00124", "oralog", None);
        let inventory = inventory(&array);

        assert_eq!(inventory.volumes(&system).await.unwrap().len(), 2);
        assert_eq!(inventory.volume_by_id(&system, "00123").await.unwrap(), first);
        assert_eq!(
            inventory.volume_by_name(&system, "oralog").await.unwrap(),
            second
        );
        assert_matches!(
            inventory.volume_by_name(&system, "missing").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_slos_on_v3_array() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5978);
        let srp = array.add_srp(&system, "SRP_1");
        array.add_slo(&srp, &diamond());
        let inventory = inventory(&array);

        let caps = inventory.pool_capabilities(&srp).await.unwrap();
        assert_eq!(caps.key("InstanceID").unwrap(), srp.key("InstanceID").unwrap());
        assert_eq!(inventory.slos(&system).await.unwrap(), vec![diamond()]);
    }

    #[tokio::test]
    async fn test_slos_unsupported_before_v3() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system(SID, 5876);
        array.add_virtual_pool(&system, "FC_Pool");
        let inventory = inventory(&array);

        assert_matches!(inventory.slos(&system).await, Err(Error::Unsupported(_)));
        assert_eq!(inventory.pools(&system).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_inventory() {
        let snapshot = r#"
systems:
  - id: "000196701380"
    microcode_family: 5978
    directors:
      - name: FA-1D
        ports: [{ port: "4", wwn: "5000097308012C10" }]
    hardware_ids:
      - { id_type: wwn, value: "10000000C94E5D22" }
  - id: "000197800123"
    microcode_family: 5978
    directors:
      - name: FA-2D
        ports: [{ port: "8", wwn: "5000097308012C99" }]
"#;
        let array = Arc::new(ArraySnapshot::from_yaml(snapshot).unwrap().build().unwrap());
        let inventory = inventory(&array);
        let systems = inventory.storage_systems().await.unwrap();
        assert_eq!(systems.len(), 2);

        let system = inventory
            .storage_systems()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.key("Name").unwrap().ends_with(SID))
            .unwrap();
        let processors = inventory.processor_systems(&system).await.unwrap();
        assert_eq!(processors.len(), 1);
        assert_eq!(inventory.hardware_ids(&system).await.unwrap().len(), 1);
        assert!(inventory.masking_views(&system).await.unwrap().is_empty());
    }
}
