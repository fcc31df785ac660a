//! Volume Provisioning
//!
//! Thin volume creation and removal on the storage configuration service,
//! and the front-end ports an initiator is logged in through.

use crate::domain::model::{classes, ServiceKind, TargetEndpoint};
use crate::domain::ports::{ObjectPath, ParamValue};
use crate::error::{Error, Result};
use crate::identifier::PortKey;
use crate::job::JobTracker;
use crate::system::SystemResolver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// `ElementType` of a thinly provisioned volume
const THIN_VOLUME: u16 = 2;

#[derive(Clone)]
pub struct VolumeProvisioning {
    resolver: SystemResolver,
    jobs: JobTracker,
    cancel: CancellationToken,
}

impl VolumeProvisioning {
    pub fn new(resolver: SystemResolver, jobs: JobTracker, cancel: CancellationToken) -> Self {
        Self {
            resolver,
            jobs,
            cancel,
        }
    }

    /// Create a thin volume of `size_bytes` in `pool`
    ///
    /// The new volume is taken from the job's affected elements, or from
    /// `TheElement` when the array completes the request inline.
    pub async fn create_volume(
        &self,
        system: &ObjectPath,
        pool: &ObjectPath,
        name: &str,
        size_bytes: u64,
    ) -> Result<ObjectPath> {
        if name.is_empty() {
            return Err(Error::Validation("volume name must not be empty".into()));
        }
        let size = i64::try_from(size_bytes)
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| Error::Validation(format!("invalid volume size {}", size_bytes)))?;

        let service = self
            .resolver
            .resolve_service(system, ServiceKind::StorageConfiguration)
            .await?;
        info!("Creating volume {} ({} bytes) in {}", name, size_bytes, pool);

        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                "CreateOrModifyElementFromStoragePool",
                vec![
                    ParamValue::new("ElementName", name),
                    ParamValue::new("ElementType", THIN_VOLUME),
                    ParamValue::new("Size", size),
                    ParamValue::new("InPool", pool.clone()),
                ],
                &self.cancel,
            )
            .await?;
        let volume = self
            .jobs
            .produced(&completion, classes::STORAGE_VOLUME, "TheElement")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found("StorageVolume", name))?;
        info!("Created volume {}", volume);
        Ok(volume)
    }

    /// Return a volume's capacity to its pool
    pub async fn delete_volume(&self, system: &ObjectPath, volume: &ObjectPath) -> Result<()> {
        let service = self
            .resolver
            .resolve_service(system, ServiceKind::StorageConfiguration)
            .await?;
        info!("Deleting volume {}", volume);

        self.jobs
            .invoke_and_wait(
                &service,
                "ReturnToStoragePool",
                vec![ParamValue::new("TheElement", volume.clone())],
                &self.cancel,
            )
            .await?;
        Ok(())
    }

    /// Front-end ports `hardware_id` is logged in through
    pub async fn target_endpoints(
        &self,
        system: &ObjectPath,
        hardware_id: &ObjectPath,
    ) -> Result<Vec<TargetEndpoint>> {
        let service = self
            .resolver
            .resolve_service(system, ServiceKind::HardwareIdManagement)
            .await?;
        let completion = self
            .jobs
            .invoke_and_wait(
                &service,
                "EMCGetTargetEndpoints",
                vec![ParamValue::new("HardwareID", hardware_id.clone())],
                &self.cancel,
            )
            .await?;

        let missing = || Error::MissingOutParameter {
            method: completion.method.clone(),
            name: "TargetEndpoints".to_string(),
        };
        let endpoints = completion
            .output
            .param("TargetEndpoints")
            .and_then(|value| value.as_array())
            .ok_or_else(missing)?;

        let mut targets = Vec::with_capacity(endpoints.len());
        for value in endpoints {
            let endpoint = value.as_reference().ok_or_else(|| {
                Error::Format("TargetEndpoints holds a non-reference value".into())
            })?;
            let port: PortKey = endpoint.key("SystemName")?.parse()?;
            targets.push(TargetEndpoint {
                wwn: endpoint.key("Name")?.to_string(),
                director: port.director,
                port: port.port,
            });
        }
        debug!("{} is logged in through {} ports", hardware_id, targets.len());
        Ok(targets)
    }
}
