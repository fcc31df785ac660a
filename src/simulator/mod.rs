//! Simulated SMI-S Array
//!
//! An in-memory object graph implementing [`WbemClient`]. It models the
//! classes, associations and extrinsic methods the client relies on,
//! including asynchronous jobs whose state sequence can be scripted. Used by
//! the test suite and by the offline inventory tool.

mod methods;
pub mod snapshot;

pub use snapshot::*;

use crate::domain::model::{classes, GroupKind, HardwareIdType, JobState, ServiceKind, Slo};
use crate::domain::ports::{
    AssociationQuery, CimValue, Instance, InvokeOutput, ObjectPath, ParamValue, WbemClient,
};
use crate::error::{Error, Result};
use crate::identifier::{DELIMITER, PORT_SEPARATOR, SYMMETRIX};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

const SIMULATOR_ENDPOINT: &str = "simulator://local";

pub const FRONT_END_PORT: &str = "Symm_FCSCSIProtocolEndpoint";
const VOLUME: &str = "Symm_StorageVolume";
const POOL_SETTING: &str = "Symm_StoragePoolSetting";
const CIM_STORAGE_POOL: &str = "CIM_StoragePool";
const CIM_CONCRETE_JOB: &str = "CIM_ConcreteJob";

const ASSOC_HOSTED_SERVICE: &str = "CIM_HostedService";
const ASSOC_INSTALLED_SOFTWARE: &str = "CIM_InstalledSoftwareIdentity";
const ASSOC_HOSTED_POOL: &str = "CIM_HostedStoragePool";
const ASSOC_ELEMENT_CAPABILITIES: &str = "CIM_ElementCapabilities";
const ASSOC_SETTINGS_DEFINE: &str = "CIM_SettingsDefineCapabilities";
const ASSOC_SYSTEM_DEVICE: &str = "CIM_SystemDevice";
const ASSOC_ALLOCATED_FROM: &str = "CIM_AllocatedFromStoragePool";
const ASSOC_COMPONENT_CS: &str = "CIM_ComponentCS";
const ASSOC_HOSTED_ACCESS_POINT: &str = "CIM_HostedAccessPoint";
const ASSOC_CONCRETE_DEPENDENCY: &str = "CIM_ConcreteDependency";
const ASSOC_MEMBER_OF: &str = "CIM_MemberOfCollection";
const ASSOC_MASKING_GROUP: &str = "Symm_AssociatedMaskingGroup";
const ASSOC_AFFECTED_JOB: &str = "CIM_AffectedJobElement";

/// Classes an EnumerateInstanceNames may name
const KNOWN_CLASSES: &[&str] = &[
    classes::STORAGE_SYSTEM,
    classes::SOFTWARE_IDENTITY,
    classes::STORAGE_CONFIGURATION_SERVICE,
    classes::CONTROLLER_CONFIGURATION_SERVICE,
    classes::HARDWARE_ID_MANAGEMENT_SERVICE,
    classes::SRP_STORAGE_POOL,
    classes::VIRTUAL_PROVISIONING_POOL,
    classes::STORAGE_POOL_CAPABILITIES,
    classes::STORAGE_SETTING,
    classes::STORAGE_VOLUME,
    classes::DEVICE_MASKING_GROUP,
    classes::TARGET_MASKING_GROUP,
    classes::INITIATOR_MASKING_GROUP,
    classes::MASKING_VIEW,
    classes::HARDWARE_ID,
    classes::PROCESSOR_SYSTEM,
    classes::CONCRETE_JOB,
    FRONT_END_PORT,
    VOLUME,
    POOL_SETTING,
    CIM_STORAGE_POOL,
    CIM_CONCRETE_JOB,
];

// =============================================================================
// Graph State
// =============================================================================

#[derive(Debug, Clone)]
struct SimObject {
    /// Most derived class first
    classes: Vec<String>,
    properties: BTreeMap<String, CimValue>,
}

impl SimObject {
    fn is_a(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class_name))
    }
}

#[derive(Debug, Clone)]
struct Link {
    assoc_class: &'static str,
    a: ObjectPath,
    a_role: &'static str,
    b: ObjectPath,
    b_role: &'static str,
}

#[derive(Debug)]
struct JobRecord {
    remaining: VecDeque<JobState>,
    current: JobState,
    description: Option<String>,
}

#[derive(Debug, Default)]
struct ArrayState {
    objects: BTreeMap<ObjectPath, SimObject>,
    links: Vec<Link>,
    jobs: BTreeMap<ObjectPath, JobRecord>,
    job_scripts: VecDeque<Vec<JobState>>,
    /// (hardware ID value, front-end port) pairs
    logins: Vec<(String, ObjectPath)>,
    failing_classes: BTreeSet<String>,
    invocations: Vec<String>,
    next_job_id: u64,
    next_device_id: u64,
    synchronous: bool,
    offline: bool,
    drop_job_refs: bool,
}

fn system_path(system_name: &str) -> ObjectPath {
    ObjectPath::new(classes::STORAGE_SYSTEM)
        .with_key("CreationClassName", classes::STORAGE_SYSTEM)
        .with_key("Name", system_name)
}

fn system_id_of(system_name: &str) -> &str {
    system_name
        .strip_prefix(SYMMETRIX)
        .and_then(|rest| rest.strip_prefix(DELIMITER))
        .unwrap_or(system_name)
}

fn element_id(system_name: &str, local_name: &str) -> String {
    format!("{}{}{}", system_name, DELIMITER, local_name)
}

fn default_job_script() -> Vec<JobState> {
    vec![JobState::Running, JobState::Completed]
}

impl ArrayState {
    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(Error::Transport(format!(
                "connection to {} refused",
                SIMULATOR_ENDPOINT
            )));
        }
        Ok(())
    }

    fn insert(&mut self, path: ObjectPath, classes: &[&str], properties: Vec<(&str, CimValue)>) {
        let object = SimObject {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.objects.insert(path, object);
    }

    fn remove(&mut self, path: &ObjectPath) {
        self.objects.remove(path);
        self.links.retain(|l| &l.a != path && &l.b != path);
    }

    fn link(
        &mut self,
        assoc_class: &'static str,
        a_role: &'static str,
        a: &ObjectPath,
        b_role: &'static str,
        b: &ObjectPath,
    ) {
        let exists = self
            .links
            .iter()
            .any(|l| l.assoc_class == assoc_class && &l.a == a && &l.b == b);
        if !exists {
            self.links.push(Link {
                assoc_class,
                a: a.clone(),
                a_role,
                b: b.clone(),
                b_role,
            });
        }
    }

    fn unlink(&mut self, assoc_class: &str, a: &ObjectPath, b: &ObjectPath) {
        self.links
            .retain(|l| !(l.assoc_class == assoc_class && &l.a == a && &l.b == b));
    }

    fn associators(&self, from: &ObjectPath, query: &AssociationQuery) -> Vec<ObjectPath> {
        let matches = |filter: &Option<String>, value: &str| {
            filter
                .as_deref()
                .map_or(true, |f| f.is_empty() || f.eq_ignore_ascii_case(value))
        };
        let mut results: Vec<ObjectPath> = Vec::new();
        for link in &self.links {
            let (other, role, result_role) = if &link.a == from {
                (&link.b, link.a_role, link.b_role)
            } else if &link.b == from {
                (&link.a, link.b_role, link.a_role)
            } else {
                continue;
            };
            if !matches(&query.assoc_class, link.assoc_class)
                || !matches(&query.role, role)
                || !matches(&query.result_role, result_role)
            {
                continue;
            }
            let class_ok = match query.result_class.as_deref() {
                Some(class) if !class.is_empty() => {
                    self.objects.get(other).map_or(false, |o| o.is_a(class))
                }
                _ => true,
            };
            if class_ok && !results.contains(other) {
                results.push(other.clone());
            }
        }
        results
    }

    /// Objects on the far side of `assoc_class` links where `from` is the `a` end
    fn linked_from(&self, assoc_class: &str, from: &ObjectPath) -> Vec<ObjectPath> {
        self.links
            .iter()
            .filter(|l| l.assoc_class == assoc_class && &l.a == from)
            .map(|l| l.b.clone())
            .collect()
    }

    /// Objects on the near side of `assoc_class` links where `to` is the `b` end
    fn linked_to(&self, assoc_class: &str, to: &ObjectPath) -> Vec<ObjectPath> {
        self.links
            .iter()
            .filter(|l| l.assoc_class == assoc_class && &l.b == to)
            .map(|l| l.a.clone())
            .collect()
    }

    fn is_a(&self, path: &ObjectPath, class_name: &str) -> bool {
        self.objects.get(path).map_or(false, |o| o.is_a(class_name))
    }

    fn property(&self, path: &ObjectPath, name: &str) -> Option<&CimValue> {
        self.objects.get(path).and_then(|o| o.properties.get(name))
    }

    fn service_of(&self, system_name: &str, kind: ServiceKind) -> Option<ObjectPath> {
        self.objects
            .iter()
            .find(|(path, object)| {
                object.is_a(kind.class_name()) && path.key("SystemName").ok() == Some(system_name)
            })
            .map(|(path, _)| path.clone())
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    fn add_system(&mut self, system_id: &str, microcode_family: CimValue) -> ObjectPath {
        let name = element_id(SYMMETRIX, system_id);
        let system = system_path(&name);
        self.insert(
            system.clone(),
            &[classes::STORAGE_SYSTEM],
            vec![
                ("ElementName", system_id.into()),
                ("Name", name.clone().into()),
            ],
        );
        for (kind, service_name) in [
            (ServiceKind::StorageConfiguration, "EMCStorageConfigurationService"),
            (ServiceKind::ControllerConfiguration, "EMCControllerConfigurationService"),
            (ServiceKind::HardwareIdManagement, "EMCStorageHardwareIDManagementService"),
        ] {
            self.add_service(&system, kind, service_name);
        }

        let identity = ObjectPath::new(classes::SOFTWARE_IDENTITY).with_key("InstanceID", name);
        self.insert(
            identity.clone(),
            &[classes::SOFTWARE_IDENTITY],
            vec![("EMCEnginuityFamily", microcode_family)],
        );
        self.link(
            ASSOC_INSTALLED_SOFTWARE,
            "System",
            &system,
            "InstalledSoftware",
            &identity,
        );
        system
    }

    fn add_service(&mut self, system: &ObjectPath, kind: ServiceKind, name: &str) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default().to_string();
        let concrete = kind.class_name().replacen("EMC_", "Symm_", 1);
        let service = ObjectPath::new(concrete.clone())
            .with_key("CreationClassName", concrete.clone())
            .with_key("Name", name)
            .with_key("SystemCreationClassName", classes::STORAGE_SYSTEM)
            .with_key("SystemName", system_name);
        self.insert(
            service.clone(),
            &[concrete.as_str(), kind.class_name()],
            vec![("ElementName", name.into())],
        );
        self.link(ASSOC_HOSTED_SERVICE, "Antecedent", system, "Dependent", &service);
        service
    }

    fn add_pool(&mut self, system: &ObjectPath, name: &str, class_name: &str) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default();
        let instance_id = element_id(system_name, name);
        let pool = ObjectPath::new(class_name).with_key("InstanceID", instance_id.clone());
        self.insert(
            pool.clone(),
            &[class_name, CIM_STORAGE_POOL],
            vec![("ElementName", name.into()), ("PoolID", name.into())],
        );
        self.link(ASSOC_HOSTED_POOL, "GroupComponent", system, "PartComponent", &pool);

        let capabilities =
            ObjectPath::new(classes::STORAGE_POOL_CAPABILITIES).with_key("InstanceID", instance_id);
        self.insert(
            capabilities.clone(),
            &[classes::STORAGE_POOL_CAPABILITIES],
            vec![("ElementName", name.into())],
        );
        self.link(
            ASSOC_ELEMENT_CAPABILITIES,
            "ManagedElement",
            &pool,
            "Capabilities",
            &capabilities,
        );
        pool
    }

    fn add_slo(&mut self, pool: &ObjectPath, slo: &Slo) -> ObjectPath {
        let capabilities = self
            .linked_from(ASSOC_ELEMENT_CAPABILITIES, pool)
            .into_iter()
            .next()
            .unwrap_or_else(|| pool.clone());
        let setting = ObjectPath::new(POOL_SETTING).with_key("InstanceID", slo.instance_id.clone());
        self.insert(
            setting.clone(),
            &[POOL_SETTING, classes::STORAGE_SETTING],
            vec![
                ("EMCSLOBaseName", slo.name.clone().into()),
                ("EMCApproxAverageResponseTime", CimValue::Real(slo.response_time_ms)),
                ("EMCSRP", slo.srp.clone().into()),
                ("EMCWorkload", slo.workload.clone().into()),
                ("ElementName", slo.element_name.clone().into()),
                ("InstanceID", slo.instance_id.clone().into()),
            ],
        );
        self.link(
            ASSOC_SETTINGS_DEFINE,
            "GroupComponent",
            &capabilities,
            "PartComponent",
            &setting,
        );
        setting
    }

    fn add_volume(
        &mut self,
        system: &ObjectPath,
        device_id: &str,
        element_name: &str,
        pool: Option<&ObjectPath>,
        size_bytes: i64,
    ) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default().to_string();
        let volume = ObjectPath::new(VOLUME)
            .with_key("CreationClassName", VOLUME)
            .with_key("DeviceID", device_id)
            .with_key("SystemCreationClassName", classes::STORAGE_SYSTEM)
            .with_key("SystemName", system_name);
        self.insert(
            volume.clone(),
            &[VOLUME, classes::STORAGE_VOLUME],
            vec![
                ("ElementName", element_name.into()),
                ("DeviceID", device_id.into()),
                ("BlockSize", CimValue::Integer(512)),
                ("NumberOfBlocks", CimValue::Integer(size_bytes / 512)),
            ],
        );
        self.link(ASSOC_SYSTEM_DEVICE, "GroupComponent", system, "PartComponent", &volume);
        if let Some(pool) = pool {
            self.link(ASSOC_ALLOCATED_FROM, "Antecedent", pool, "Dependent", &volume);
        }
        volume
    }

    fn add_processor_system(&mut self, system: &ObjectPath, director: &str) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default();
        let processor = ObjectPath::new(classes::PROCESSOR_SYSTEM)
            .with_key("CreationClassName", classes::PROCESSOR_SYSTEM)
            .with_key("Name", element_id(system_name, director));
        if !self.objects.contains_key(&processor) {
            self.insert(
                processor.clone(),
                &[classes::PROCESSOR_SYSTEM],
                vec![("ElementName", director.into())],
            );
            self.link(ASSOC_COMPONENT_CS, "GroupComponent", system, "PartComponent", &processor);
        }
        processor
    }

    fn add_front_end_port(
        &mut self,
        system: &ObjectPath,
        director: &str,
        port: &str,
        wwn: &str,
    ) -> ObjectPath {
        let processor = self.add_processor_system(system, director);
        let system_name = system.key("Name").unwrap_or_default();
        let port_name = element_id(system_name, &format!("{}{}{}", director, PORT_SEPARATOR, port));
        let endpoint = ObjectPath::new(FRONT_END_PORT)
            .with_key("CreationClassName", FRONT_END_PORT)
            .with_key("Name", wwn)
            .with_key("SystemCreationClassName", classes::PROCESSOR_SYSTEM)
            .with_key("SystemName", port_name);
        self.insert(
            endpoint.clone(),
            &[FRONT_END_PORT],
            vec![("ElementName", wwn.into())],
        );
        self.link(
            ASSOC_HOSTED_ACCESS_POINT,
            "Antecedent",
            &processor,
            "Dependent",
            &endpoint,
        );
        endpoint
    }

    fn hardware_id_path(id_type: HardwareIdType, value: &str) -> ObjectPath {
        ObjectPath::new(classes::HARDWARE_ID).with_key(
            "InstanceID",
            format!("{}{}{}", id_type.key_prefix(), DELIMITER, value),
        )
    }

    fn add_hardware_id(
        &mut self,
        system: &ObjectPath,
        id_type: HardwareIdType,
        value: &str,
    ) -> ObjectPath {
        let hardware_id = Self::hardware_id_path(id_type, value);
        self.insert(
            hardware_id.clone(),
            &[classes::HARDWARE_ID],
            vec![
                ("StorageID", value.into()),
                ("IDType", CimValue::from(id_type.code())),
            ],
        );
        let system_name = system.key("Name").unwrap_or_default();
        if let Some(service) = self.service_of(system_name, ServiceKind::HardwareIdManagement) {
            self.link(
                ASSOC_CONCRETE_DEPENDENCY,
                "Antecedent",
                &service,
                "Dependent",
                &hardware_id,
            );
        }
        hardware_id
    }

    fn group_path(system_name: &str, kind: GroupKind, name: &str) -> ObjectPath {
        ObjectPath::new(kind.class_name()).with_key("InstanceID", element_id(system_name, name))
    }

    fn add_group(&mut self, system: &ObjectPath, kind: GroupKind, name: &str) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default().to_string();
        let group = Self::group_path(&system_name, kind, name);
        self.insert(
            group.clone(),
            &[kind.class_name()],
            vec![
                ("ElementName", name.into()),
                ("Type", CimValue::from(kind.code())),
            ],
        );
        if let Some(service) = self.service_of(&system_name, ServiceKind::ControllerConfiguration) {
            self.link(
                ASSOC_CONCRETE_DEPENDENCY,
                "Antecedent",
                &service,
                "Dependent",
                &group,
            );
        }
        group
    }

    fn add_member(&mut self, group: &ObjectPath, member: &ObjectPath) {
        self.link(ASSOC_MEMBER_OF, "Collection", group, "Member", member);
    }

    fn members(&self, group: &ObjectPath) -> Vec<ObjectPath> {
        self.linked_from(ASSOC_MEMBER_OF, group)
    }

    fn view_path(system_name: &str, name: &str) -> ObjectPath {
        ObjectPath::new(classes::MASKING_VIEW)
            .with_key("CreationClassName", classes::MASKING_VIEW)
            .with_key("DeviceID", name)
            .with_key("SystemCreationClassName", classes::STORAGE_SYSTEM)
            .with_key("SystemName", system_name)
    }

    fn add_masking_view(
        &mut self,
        system: &ObjectPath,
        name: &str,
        groups: [&ObjectPath; 3],
    ) -> ObjectPath {
        let system_name = system.key("Name").unwrap_or_default().to_string();
        let view = Self::view_path(&system_name, name);
        self.insert(
            view.clone(),
            &[classes::MASKING_VIEW],
            vec![("ElementName", name.into())],
        );
        self.link(ASSOC_SYSTEM_DEVICE, "GroupComponent", system, "PartComponent", &view);
        for group in groups {
            self.link(ASSOC_MASKING_GROUP, "ProtocolController", &view, "MaskingGroup", group);
        }
        view
    }

    fn views_of_group(&self, group: &ObjectPath) -> Vec<ObjectPath> {
        self.linked_to(ASSOC_MASKING_GROUP, group)
    }

    // -------------------------------------------------------------------------
    // Jobs
    // -------------------------------------------------------------------------

    fn next_script(&mut self) -> Vec<JobState> {
        self.job_scripts.pop_front().unwrap_or_else(default_job_script)
    }

    fn start_job(&mut self, states: Vec<JobState>, description: Option<String>) -> ObjectPath {
        self.next_job_id += 1;
        let job = ObjectPath::new(classes::CONCRETE_JOB)
            .with_key("InstanceID", format!("J{:06}", self.next_job_id));
        self.insert(
            job.clone(),
            &[classes::CONCRETE_JOB, CIM_CONCRETE_JOB],
            Vec::new(),
        );
        self.jobs.insert(
            job.clone(),
            JobRecord {
                remaining: states.into(),
                current: JobState::New,
                description,
            },
        );
        job
    }
}

// =============================================================================
// Simulated Array
// =============================================================================

/// In-memory SMI-S provider
pub struct SimulatedArray {
    endpoint: String,
    state: RwLock<ArrayState>,
}

impl Default for SimulatedArray {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedArray {
    /// Create an empty provider
    pub fn new() -> Self {
        Self {
            endpoint: SIMULATOR_ENDPOINT.to_string(),
            state: RwLock::new(ArrayState {
                next_device_id: 0x100,
                ..Default::default()
            }),
        }
    }

    /// Add a storage system with its three services and software identity
    pub fn add_system(&self, system_id: &str, microcode_family: i64) -> ObjectPath {
        self.state
            .write()
            .add_system(system_id, CimValue::from(microcode_family.to_string()))
    }

    /// Add another instance of a configuration service to a system
    pub fn add_service(&self, system: &ObjectPath, kind: ServiceKind, name: &str) -> ObjectPath {
        self.state.write().add_service(system, kind, name)
    }

    /// Overwrite the `EMCEnginuityFamily` of a system's software identity
    pub fn set_microcode_family(&self, system: &ObjectPath, value: impl Into<CimValue>) {
        let mut state = self.state.write();
        let name = system.key("Name").unwrap_or_default().to_string();
        let identity = ObjectPath::new(classes::SOFTWARE_IDENTITY).with_key("InstanceID", name);
        if let Some(object) = state.objects.get_mut(&identity) {
            object
                .properties
                .insert("EMCEnginuityFamily".to_string(), value.into());
        }
    }

    pub fn remove_software_identity(&self, system: &ObjectPath) {
        let mut state = self.state.write();
        let name = system.key("Name").unwrap_or_default().to_string();
        state.remove(&ObjectPath::new(classes::SOFTWARE_IDENTITY).with_key("InstanceID", name));
    }

    /// Add a storage resource pool (generation V3)
    pub fn add_srp(&self, system: &ObjectPath, name: &str) -> ObjectPath {
        self.state
            .write()
            .add_pool(system, name, classes::SRP_STORAGE_POOL)
    }

    /// Add a legacy virtual provisioning pool
    pub fn add_virtual_pool(&self, system: &ObjectPath, name: &str) -> ObjectPath {
        self.state
            .write()
            .add_pool(system, name, classes::VIRTUAL_PROVISIONING_POOL)
    }

    pub fn add_slo(&self, pool: &ObjectPath, slo: &Slo) -> ObjectPath {
        self.state.write().add_slo(pool, slo)
    }

    pub fn add_volume(
        &self,
        system: &ObjectPath,
        device_id: &str,
        element_name: &str,
        pool: Option<&ObjectPath>,
    ) -> ObjectPath {
        self.state
            .write()
            .add_volume(system, device_id, element_name, pool, 0)
    }

    pub fn add_front_end_port(
        &self,
        system: &ObjectPath,
        director: &str,
        port: &str,
        wwn: &str,
    ) -> ObjectPath {
        self.state
            .write()
            .add_front_end_port(system, director, port, wwn)
    }

    pub fn add_hardware_id(
        &self,
        system: &ObjectPath,
        id_type: HardwareIdType,
        value: &str,
    ) -> ObjectPath {
        self.state.write().add_hardware_id(system, id_type, value)
    }

    /// Record that the initiator `hardware_id_value` is logged in through `port`
    pub fn record_login(&self, hardware_id_value: &str, port: &ObjectPath) {
        self.state
            .write()
            .logins
            .push((hardware_id_value.to_string(), port.clone()));
    }

    pub fn add_group(&self, system: &ObjectPath, kind: GroupKind, name: &str) -> ObjectPath {
        self.state.write().add_group(system, kind, name)
    }

    pub fn add_member(&self, group: &ObjectPath, member: &ObjectPath) {
        self.state.write().add_member(group, member)
    }

    pub fn add_masking_view(
        &self,
        system: &ObjectPath,
        name: &str,
        storage_group: &ObjectPath,
        initiator_group: &ObjectPath,
        port_group: &ObjectPath,
    ) -> ObjectPath {
        self.state.write().add_masking_view(
            system,
            name,
            [storage_group, initiator_group, port_group],
        )
    }

    // -------------------------------------------------------------------------
    // Job scripting and fault injection
    // -------------------------------------------------------------------------

    /// States the next started job reports, one per poll
    ///
    /// Effects of the invocation are only applied when the script ends in
    /// COMPLETED.
    pub fn script_next_job(&self, states: impl IntoIterator<Item = JobState>) {
        self.state
            .write()
            .job_scripts
            .push_back(states.into_iter().collect());
    }

    /// Create a free-standing job reporting `states`
    pub fn start_job(&self, states: impl IntoIterator<Item = JobState>) -> ObjectPath {
        self.state
            .write()
            .start_job(states.into_iter().collect(), None)
    }

    /// Complete mutating methods inline with return code 0
    pub fn set_synchronous(&self, synchronous: bool) {
        self.state.write().synchronous = synchronous;
    }

    /// Fail every call with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.state.write().offline = offline;
    }

    /// Start jobs but leave the job reference out of the response
    pub fn drop_job_references(&self, drop: bool) {
        self.state.write().drop_job_refs = drop;
    }

    /// Make GetInstance fail for every object of `class_name`
    pub fn fail_get_instance(&self, class_name: &str) {
        self.state
            .write()
            .failing_classes
            .insert(class_name.to_ascii_lowercase());
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Extrinsic methods invoked so far, in order
    pub fn invocations(&self) -> Vec<String> {
        self.state.read().invocations.clone()
    }

    pub fn contains(&self, path: &ObjectPath) -> bool {
        self.state.read().objects.contains_key(path)
    }

    pub fn members_of(&self, group: &ObjectPath) -> Vec<ObjectPath> {
        self.state.read().members(group)
    }

    pub fn job_count(&self) -> usize {
        self.state.read().jobs.len()
    }
}

#[async_trait]
impl WbemClient for SimulatedArray {
    async fn enumerate_instance_names(&self, class_name: &str) -> Result<Vec<ObjectPath>> {
        let state = self.state.read();
        state.check_online()?;
        if !KNOWN_CLASSES
            .iter()
            .any(|known| known.eq_ignore_ascii_case(class_name))
        {
            return Err(Error::Transport(format!(
                "CIM_ERR_INVALID_CLASS: {}",
                class_name
            )));
        }
        Ok(state
            .objects
            .iter()
            .filter(|(_, object)| object.is_a(class_name))
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn associator_names(
        &self,
        from: &ObjectPath,
        query: &AssociationQuery,
    ) -> Result<Vec<ObjectPath>> {
        let state = self.state.read();
        state.check_online()?;
        if !state.objects.contains_key(from) {
            return Err(Error::not_found(from.class_name(), from.to_string()));
        }
        Ok(state.associators(from, query))
    }

    async fn get_instance(&self, path: &ObjectPath) -> Result<Instance> {
        let mut state = self.state.write();
        state.check_online()?;
        let object = state
            .objects
            .get(path)
            .ok_or_else(|| Error::not_found(path.class_name(), path.to_string()))?;
        if object
            .classes
            .iter()
            .any(|c| state.failing_classes.contains(&c.to_ascii_lowercase()))
        {
            return Err(Error::Transport(format!("CIM_ERR_FAILED: GetInstance {}", path)));
        }
        let mut instance = Instance {
            path: path.clone(),
            properties: object.properties.clone(),
        };

        if let Some(job) = state.jobs.get_mut(path) {
            if let Some(next) = job.remaining.pop_front() {
                job.current = next;
            }
            debug!("Simulated job {} reports {}", path, job.current);
            // UNKNOWN has no code of its own; 0 decodes back to it
            let code = job.current.code().unwrap_or(0);
            instance
                .properties
                .insert("JobState".into(), CimValue::from(code.to_string()));
            if job.current.is_failure() {
                if let Some(description) = &job.description {
                    instance
                        .properties
                        .insert("ErrorDescription".into(), description.clone().into());
                }
            }
        }
        Ok(instance)
    }

    async fn invoke_method(
        &self,
        target: &ObjectPath,
        method: &str,
        params: Vec<ParamValue>,
    ) -> Result<InvokeOutput> {
        let mut state = self.state.write();
        state.check_online()?;
        state.invocations.push(method.to_string());
        methods::invoke(&mut state, target, method, &params)
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_job_advances_per_poll() {
        let array = SimulatedArray::new();
        let job = array.start_job([JobState::New, JobState::Running, JobState::Completed]);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let instance = array.get_instance(&job).await.unwrap();
            seen.push(instance.int_property("JobState").unwrap());
        }
        assert_eq!(seen, vec![2, 4, 7, 7]);
    }

    #[tokio::test]
    async fn test_offline_array_fails_with_transport_error() {
        let array = SimulatedArray::new();
        array.add_system("000196701380", 5978);
        array.set_offline(true);
        let err = array
            .enumerate_instance_names(classes::STORAGE_SYSTEM)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_service_classes_match_by_ancestor() {
        let array = SimulatedArray::new();
        let system = array.add_system("000196701380", 5978);
        let services = array
            .associator_names(
                &system,
                &AssociationQuery::result(classes::CONTROLLER_CONFIGURATION_SERVICE),
            )
            .await
            .unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(
            services[0].class_name(),
            "Symm_ControllerConfigurationService"
        );
    }
}
