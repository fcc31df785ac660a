//! Masking Group Lifecycle
//!
//! Create and delete masking groups, change their membership, tie them
//! together in masking views, and register the initiator identities that
//! populate initiator groups. Every mutation goes through the job tracker;
//! identities of created objects come from the array's response, never
//! from a lookup by name.

use crate::domain::model::{classes, GroupKind, HardwareIdType, ServiceKind};
use crate::domain::ports::{ObjectPath, ParamValue};
use crate::error::{Error, Result};
use crate::job::JobTracker;
use crate::system::SystemResolver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Masking-group, masking-view and hardware-ID operations on one provider
#[derive(Clone)]
pub struct GroupLifecycle {
    resolver: SystemResolver,
    jobs: JobTracker,
    cancel: CancellationToken,
}

impl GroupLifecycle {
    pub fn new(resolver: SystemResolver, jobs: JobTracker, cancel: CancellationToken) -> Self {
        Self {
            resolver,
            jobs,
            cancel,
        }
    }

    async fn controller(&self, system: &ObjectPath) -> Result<ObjectPath> {
        self.resolver
            .resolve_service(system, ServiceKind::ControllerConfiguration)
            .await
    }

    async fn hardware_id_service(&self, system: &ObjectPath) -> Result<ObjectPath> {
        self.resolver
            .resolve_service(system, ServiceKind::HardwareIdManagement)
            .await
    }

    fn group_kind(group: &ObjectPath) -> Result<GroupKind> {
        GroupKind::of_class(group.class_name()).ok_or_else(|| {
            Error::Validation(format!("{} is not a masking group", group))
        })
    }

    // =========================================================================
    // Masking Groups
    // =========================================================================

    /// Create an empty masking group and return its path
    pub async fn create_group(
        &self,
        system: &ObjectPath,
        name: &str,
        kind: GroupKind,
    ) -> Result<ObjectPath> {
        if name.is_empty() {
            return Err(Error::Validation("group name must not be empty".into()));
        }
        let service = self.controller(system).await?;
        info!("Creating {} group {} on {}", kind, name, system);

        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                "CreateGroup",
                vec![
                    ParamValue::new("GroupName", name),
                    ParamValue::new("Type", kind.code()),
                ],
                &self.cancel,
            )
            .await?;
        let group = completion.reference("MaskingGroup")?;
        info!("Created {} group {}", kind, group);
        Ok(group)
    }

    /// Delete a masking group; a group with members needs `force`
    pub async fn delete_group(&self, system: &ObjectPath, group: &ObjectPath, force: bool) -> Result<()> {
        let kind = Self::group_kind(group)?;
        let service = self.controller(system).await?;
        info!("Deleting {} group {} (force: {})", kind, group, force);

        self.jobs
            .invoke_and_wait(
                &service,
                "DeleteGroup",
                vec![
                    ParamValue::new("MaskingGroup", group.clone()),
                    ParamValue::new("Force", force),
                ],
                &self.cancel,
            )
            .await?;
        Ok(())
    }

    pub async fn add_members(
        &self,
        system: &ObjectPath,
        group: &ObjectPath,
        members: &[ObjectPath],
    ) -> Result<()> {
        self.change_members(system, group, members, "AddMembers").await
    }

    pub async fn remove_members(
        &self,
        system: &ObjectPath,
        group: &ObjectPath,
        members: &[ObjectPath],
    ) -> Result<()> {
        self.change_members(system, group, members, "RemoveMembers")
            .await
    }

    async fn change_members(
        &self,
        system: &ObjectPath,
        group: &ObjectPath,
        members: &[ObjectPath],
        method: &str,
    ) -> Result<()> {
        Self::group_kind(group)?;
        if members.is_empty() {
            return Err(Error::Validation(format!("{} needs at least one member", method)));
        }
        let service = self.controller(system).await?;
        info!("{}: {} members of {}", method, members.len(), group);

        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                method,
                vec![
                    ParamValue::new("MaskingGroup", group.clone()),
                    ParamValue::new("Members", members.to_vec()),
                ],
                &self.cancel,
            )
            .await?;

        if let Some(report) = &completion.report {
            let affected = self
                .jobs
                .job_results(&report.job, group.class_name())
                .await?;
            debug!("{} affected {} groups: {:?}", method, affected.len(), affected);
        }
        Ok(())
    }

    // =========================================================================
    // Masking Views
    // =========================================================================

    /// Tie a storage, initiator and port group together
    pub async fn create_masking_view(
        &self,
        system: &ObjectPath,
        name: &str,
        storage_group: &ObjectPath,
        initiator_group: &ObjectPath,
        port_group: &ObjectPath,
    ) -> Result<Vec<ObjectPath>> {
        for (group, expected) in [
            (storage_group, GroupKind::Storage),
            (initiator_group, GroupKind::Initiator),
            (port_group, GroupKind::Port),
        ] {
            let kind = Self::group_kind(group)?;
            if kind != expected {
                return Err(Error::Validation(format!(
                    "expected a {} group, got {} group {}",
                    expected, kind, group
                )));
            }
        }
        if name.is_empty() {
            return Err(Error::Validation("masking view name must not be empty".into()));
        }
        let service = self.controller(system).await?;
        info!("Creating masking view {} on {}", name, system);

        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                "CreateMaskingView",
                vec![
                    ParamValue::new("ElementName", name),
                    ParamValue::new("DeviceMaskingGroup", storage_group.clone()),
                    ParamValue::new("InitiatorMaskingGroup", initiator_group.clone()),
                    ParamValue::new("TargetMaskingGroup", port_group.clone()),
                ],
                &self.cancel,
            )
            .await?;
        let views = self
            .jobs
            .produced(&completion, classes::MASKING_VIEW, "ProtocolController")
            .await?;
        info!("Masking view {} resolved to {} paths", name, views.len());
        Ok(views)
    }

    /// Delete a masking view; its groups are left in place
    pub async fn delete_masking_view(&self, system: &ObjectPath, view: &ObjectPath) -> Result<()> {
        if !view.is_class(classes::MASKING_VIEW) {
            return Err(Error::Validation(format!("{} is not a masking view", view)));
        }
        let service = self.controller(system).await?;
        info!("Deleting masking view {}", view);

        self.jobs
            .invoke_and_wait(
                &service,
                "DeleteMaskingView",
                vec![ParamValue::new("ProtocolController", view.clone())],
                &self.cancel,
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Hardware IDs
    // =========================================================================

    /// Register an initiator identity by its raw `IDType` code
    ///
    /// Only WWN (2) and IQN (5) are accepted; anything else fails locally
    /// without contacting the array.
    pub async fn register_hardware_id(
        &self,
        system: &ObjectPath,
        value: &str,
        id_type: i64,
    ) -> Result<ObjectPath> {
        let id_type = HardwareIdType::from_code(id_type)?;
        self.register(system, value, id_type).await
    }

    /// Register an initiator identity of a known type
    pub async fn register(
        &self,
        system: &ObjectPath,
        value: &str,
        id_type: HardwareIdType,
    ) -> Result<ObjectPath> {
        if value.is_empty() {
            return Err(Error::Validation("hardware ID must not be empty".into()));
        }
        let service = self.hardware_id_service(system).await?;
        info!("Registering {} hardware ID {}", id_type, value);

        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                "CreateStorageHardwareID",
                vec![
                    ParamValue::new("StorageID", value),
                    ParamValue::new("IDType", id_type.code()),
                ],
                &self.cancel,
            )
            .await?;
        completion.reference("HardwareID")
    }

    pub async fn unregister_hardware_id(
        &self,
        system: &ObjectPath,
        hardware_id: &ObjectPath,
    ) -> Result<()> {
        if !hardware_id.is_class(classes::HARDWARE_ID) {
            return Err(Error::Validation(format!("{} is not a hardware ID", hardware_id)));
        }
        let service = self.hardware_id_service(system).await?;
        info!("Unregistering hardware ID {}", hardware_id);

        self.jobs
            .invoke_and_wait(
                &service,
                "DeleteStorageHardwareID",
                vec![ParamValue::new("HardwareID", hardware_id.clone())],
                &self.cancel,
            )
            .await?;
        Ok(())
    }
}
