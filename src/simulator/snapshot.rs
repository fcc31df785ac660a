//! Array snapshots
//!
//! A YAML description of one or more arrays, loaded into a
//! [`SimulatedArray`] for offline inventory and tests.

use super::SimulatedArray;
use crate::domain::model::{GroupKind, HardwareIdType, Slo};
use crate::domain::ports::ObjectPath;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Root of a snapshot file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArraySnapshot {
    pub systems: Vec<SystemSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Serial, e.g. `000196701380`
    pub id: String,
    pub microcode_family: i64,
    #[serde(default)]
    pub srps: Vec<PoolSnapshot>,
    #[serde(default)]
    pub virtual_pools: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeSnapshot>,
    #[serde(default)]
    pub directors: Vec<DirectorSnapshot>,
    #[serde(default)]
    pub hardware_ids: Vec<HardwareIdSnapshot>,
    #[serde(default)]
    pub groups: Vec<GroupSnapshot>,
    #[serde(default)]
    pub masking_views: Vec<MaskingViewSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub name: String,
    #[serde(default)]
    pub slos: Vec<Slo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub device_id: String,
    pub name: String,
    #[serde(default)]
    pub pool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorSnapshot {
    /// e.g. `FA-1D`
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSnapshot {
    pub port: String,
    pub wwn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareIdSnapshot {
    pub id_type: HardwareIdType,
    pub value: String,
    /// Front-end ports the initiator is logged in through, as `director-port`
    #[serde(default)]
    pub logged_in_to: Vec<String>,
}

/// Group members are named by volume device ID, `director-port`, or
/// hardware ID value depending on the kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub kind: GroupKind,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingViewSnapshot {
    pub name: String,
    pub storage_group: String,
    pub initiator_group: String,
    pub port_group: String,
}

impl ArraySnapshot {
    /// Load a snapshot from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build a simulated array holding every system of the snapshot
    pub fn build(&self) -> Result<SimulatedArray> {
        let array = SimulatedArray::new();
        for system in &self.systems {
            system.apply(&array)?;
        }
        info!("Loaded snapshot with {} systems", self.systems.len());
        Ok(array)
    }
}

impl SystemSnapshot {
    fn apply(&self, array: &SimulatedArray) -> Result<()> {
        let system = array.add_system(&self.id, self.microcode_family);

        let mut pools = BTreeMap::new();
        for srp in &self.srps {
            let pool = array.add_srp(&system, &srp.name);
            for slo in &srp.slos {
                array.add_slo(&pool, slo);
            }
            pools.insert(srp.name.clone(), pool);
        }
        for name in &self.virtual_pools {
            pools.insert(name.clone(), array.add_virtual_pool(&system, name));
        }

        let mut volumes = BTreeMap::new();
        for volume in &self.volumes {
            let pool = match &volume.pool {
                Some(name) => Some(pools.get(name).ok_or_else(|| self.unknown("pool", name))?),
                None => None,
            };
            let path = array.add_volume(&system, &volume.device_id, &volume.name, pool);
            volumes.insert(volume.device_id.clone(), path);
        }

        let mut ports = BTreeMap::new();
        for director in &self.directors {
            for port in &director.ports {
                let path = array.add_front_end_port(&system, &director.name, &port.port, &port.wwn);
                ports.insert(format!("{}-{}", director.name, port.port), path);
            }
        }

        let mut hardware_ids = BTreeMap::new();
        for hardware_id in &self.hardware_ids {
            let path = array.add_hardware_id(&system, hardware_id.id_type, &hardware_id.value);
            for port in &hardware_id.logged_in_to {
                let port = ports.get(port).ok_or_else(|| self.unknown("port", port))?;
                array.record_login(&hardware_id.value, port);
            }
            hardware_ids.insert(hardware_id.value.clone(), path);
        }

        let mut groups = BTreeMap::new();
        for group in &self.groups {
            let path = array.add_group(&system, group.kind, &group.name);
            let candidates: &BTreeMap<String, ObjectPath> = match group.kind {
                GroupKind::Storage => &volumes,
                GroupKind::Port => &ports,
                GroupKind::Initiator => &hardware_ids,
            };
            for member in &group.members {
                let member = candidates
                    .get(member)
                    .ok_or_else(|| self.unknown("group member", member))?;
                array.add_member(&path, member);
            }
            groups.insert((group.kind, group.name.clone()), path);
        }

        for view in &self.masking_views {
            let lookup = |kind: GroupKind, name: &String| {
                groups
                    .get(&(kind, name.clone()))
                    .ok_or_else(|| self.unknown("group", name))
            };
            array.add_masking_view(
                &system,
                &view.name,
                lookup(GroupKind::Storage, &view.storage_group)?,
                lookup(GroupKind::Initiator, &view.initiator_group)?,
                lookup(GroupKind::Port, &view.port_group)?,
            );
        }
        Ok(())
    }

    fn unknown(&self, what: &str, name: &str) -> Error {
        Error::Configuration(format!(
            "snapshot of system {} references unknown {} {}",
            self.id, what, name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::classes;
    use crate::domain::ports::WbemClient;
    use assert_matches::assert_matches;
    use std::io::Write;

    const SNAPSHOT: &str = r#"
systems:
  - id: "000196701380"
    microcode_family: 5978
    srps:
      - name: SRP_1
        slos:
          - name: Diamond
            response_time_ms: 0.8
            srp: SRP_1
            workload: OLTP
            element_name: Diamond+OLTP
            instance_id: "SYMMETRIX-+-000196701380-+-Diamond-+-OLTP"
    volumes:
      - { device_id: "00123", name: oradata, pool: SRP_1 }
    directors:
      - name: FA-1D
        ports:
          - { port: "4", wwn: "5000097308012C10" }
    hardware_ids:
      - { id_type: wwn, value: "10000000C94E5D22", logged_in_to: ["FA-1D-4"] }
    groups:
      - { name: sg_ora, kind: storage, members: ["00123"] }
      - { name: ig_host1, kind: initiator, members: ["10000000C94E5D22"] }
      - { name: pg_fa1d, kind: port, members: ["FA-1D-4"] }
    masking_views:
      - { name: mv_ora, storage_group: sg_ora, initiator_group: ig_host1, port_group: pg_fa1d }
"#;

    #[tokio::test]
    async fn test_snapshot_builds_graph() {
        let array = ArraySnapshot::from_yaml(SNAPSHOT).unwrap().build().unwrap();
        let views = array
            .enumerate_instance_names(classes::MASKING_VIEW)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        let groups = array
            .enumerate_instance_names(classes::DEVICE_MASKING_GROUP)
            .await
            .unwrap();
        assert_eq!(array.members_of(&groups[0]).len(), 1);
    }

    #[test]
    fn test_snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        let snapshot = ArraySnapshot::from_file(file.path()).unwrap();
        assert_eq!(snapshot.systems[0].srps[0].slos[0].name, "Diamond");
    }

    #[test]
    fn test_snapshot_unknown_reference() {
        let text = r#"
systems:
  - id: "000196701380"
    microcode_family: 5978
    groups:
      - { name: sg_ora, kind: storage, members: ["99999"] }
"#;
        let result = ArraySnapshot::from_yaml(text).unwrap().build();
        assert_matches!(result.err(), Some(Error::Configuration(_)));
    }
}
