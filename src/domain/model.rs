//! Array object model
//!
//! Closed enumerations for the integer codes the array uses, the CIM class
//! names the client queries, and the typed records built from property bags.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Class Names
// =============================================================================

/// CIM class names used by the client
pub mod classes {
    pub const STORAGE_SYSTEM: &str = "Symm_StorageSystem";
    pub const SOFTWARE_IDENTITY: &str = "Symm_StorageSystemSoftwareIdentity";
    pub const STORAGE_CONFIGURATION_SERVICE: &str = "EMC_StorageConfigurationService";
    pub const CONTROLLER_CONFIGURATION_SERVICE: &str = "EMC_ControllerConfigurationService";
    pub const HARDWARE_ID_MANAGEMENT_SERVICE: &str = "Symm_StorageHardwareIDManagementService";
    pub const SRP_STORAGE_POOL: &str = "Symm_SRPStoragePool";
    pub const VIRTUAL_PROVISIONING_POOL: &str = "EMC_VirtualProvisioningPool";
    pub const STORAGE_POOL_CAPABILITIES: &str = "Symm_StoragePoolCapabilities";
    pub const STORAGE_SETTING: &str = "CIM_StorageSetting";
    pub const STORAGE_VOLUME: &str = "CIM_StorageVolume";
    pub const DEVICE_MASKING_GROUP: &str = "SE_DeviceMaskingGroup";
    pub const TARGET_MASKING_GROUP: &str = "SE_TargetMaskingGroup";
    pub const INITIATOR_MASKING_GROUP: &str = "SE_InitiatorMaskingGroup";
    pub const MASKING_VIEW: &str = "Symm_LunMaskingView";
    pub const HARDWARE_ID: &str = "SE_StorageHardwareID";
    pub const PROCESSOR_SYSTEM: &str = "Symm_StorageProcessorSystem";
    pub const CONCRETE_JOB: &str = "SE_ConcreteJob";
}

/// Microcode family from which an array is treated as generation V3
pub const V3_MICROCODE_FAMILY: i64 = 5900;

// =============================================================================
// Configuration Services
// =============================================================================

/// The three singleton management services of a storage system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Volumes and pools
    StorageConfiguration,
    /// Masking groups and masking views
    ControllerConfiguration,
    /// Host initiator identities
    HardwareIdManagement,
}

impl ServiceKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            ServiceKind::StorageConfiguration => classes::STORAGE_CONFIGURATION_SERVICE,
            ServiceKind::ControllerConfiguration => classes::CONTROLLER_CONFIGURATION_SERVICE,
            ServiceKind::HardwareIdManagement => classes::HARDWARE_ID_MANAGEMENT_SERVICE,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.class_name())
    }
}

// =============================================================================
// Masking Groups
// =============================================================================

/// Masking group kind, by the `Type` code passed to CreateGroup
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Host group; members are hardware IDs
    Initiator,
    /// Port group; members are front-end ports
    Port,
    /// Device group; members are volumes
    Storage,
}

impl GroupKind {
    pub const ALL: [GroupKind; 3] = [GroupKind::Initiator, GroupKind::Port, GroupKind::Storage];

    pub fn code(&self) -> u16 {
        match self {
            GroupKind::Initiator => 2,
            GroupKind::Port => 3,
            GroupKind::Storage => 4,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            2 => Ok(GroupKind::Initiator),
            3 => Ok(GroupKind::Port),
            4 => Ok(GroupKind::Storage),
            other => Err(Error::Validation(format!(
                "group type {} is not one of 2 (initiator), 3 (port), 4 (storage)",
                other
            ))),
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            GroupKind::Initiator => classes::INITIATOR_MASKING_GROUP,
            GroupKind::Port => classes::TARGET_MASKING_GROUP,
            GroupKind::Storage => classes::DEVICE_MASKING_GROUP,
        }
    }

    /// Infer the kind from a group path's class
    pub fn of_class(class_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.class_name().eq_ignore_ascii_case(class_name))
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKind::Initiator => write!(f, "initiator"),
            GroupKind::Port => write!(f, "port"),
            GroupKind::Storage => write!(f, "storage"),
        }
    }
}

// =============================================================================
// Hardware IDs
// =============================================================================

/// Initiator identity type, by the `IDType` code of CreateStorageHardwareID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareIdType {
    Wwn,
    Iqn,
}

impl HardwareIdType {
    pub fn code(&self) -> u16 {
        match self {
            HardwareIdType::Wwn => 2,
            HardwareIdType::Iqn => 5,
        }
    }

    /// Anything outside {2, 5} is rejected before reaching the array
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            2 => Ok(HardwareIdType::Wwn),
            5 => Ok(HardwareIdType::Iqn),
            other => Err(Error::Validation(format!(
                "hardware ID type {} is not one of 2 (WWN), 5 (IQN)",
                other
            ))),
        }
    }

    /// Leading segment of the hardware ID's InstanceID
    pub fn key_prefix(&self) -> &'static str {
        match self {
            HardwareIdType::Wwn => "W",
            HardwareIdType::Iqn => "I",
        }
    }
}

impl std::fmt::Display for HardwareIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareIdType::Wwn => write!(f, "WWN"),
            HardwareIdType::Iqn => write!(f, "IQN"),
        }
    }
}

// =============================================================================
// Job States
// =============================================================================

/// State of an array-side job, by the integer `JobState` property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Not started yet
    New,
    /// Moving into the running state
    Starting,
    Running,
    /// Stopped, can be restarted
    Suspended,
    /// Moving to completed, terminated or killed
    ShuttingDown,
    /// Finished normally
    Completed,
    /// Stopped by a terminate request
    Terminated,
    /// Stopped by a kill request
    Killed,
    /// Abnormal state due to an error condition
    Exception,
    /// Vendor-specific problem-resolution state
    Service,
    /// Waiting for a client to resolve a query
    QueryPending,
    Unknown,
}

impl JobState {
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => JobState::New,
            3 => JobState::Starting,
            4 => JobState::Running,
            5 => JobState::Suspended,
            6 => JobState::ShuttingDown,
            7 => JobState::Completed,
            8 => JobState::Terminated,
            9 => JobState::Killed,
            10 => JobState::Exception,
            11 => JobState::Service,
            12 => JobState::QueryPending,
            _ => JobState::Unknown,
        }
    }

    /// Integer code; `None` for [`JobState::Unknown`]
    pub fn code(&self) -> Option<i64> {
        let code = match self {
            JobState::New => 2,
            JobState::Starting => 3,
            JobState::Running => 4,
            JobState::Suspended => 5,
            JobState::ShuttingDown => 6,
            JobState::Completed => 7,
            JobState::Terminated => 8,
            JobState::Killed => 9,
            JobState::Exception => 10,
            JobState::Service => 11,
            JobState::QueryPending => 12,
            JobState::Unknown => return None,
        };
        Some(code)
    }

    pub fn is_success(&self) -> bool {
        *self == JobState::Completed
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobState::Terminated | JobState::Killed | JobState::Exception
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::New => "NEW",
            JobState::Starting => "STARTING",
            JobState::Running => "RUNNING",
            JobState::Suspended => "SUSPENDED",
            JobState::ShuttingDown => "SHUTTING_DOWN",
            JobState::Completed => "COMPLETED",
            JobState::Terminated => "TERMINATED",
            JobState::Killed => "KILLED",
            JobState::Exception => "EXCEPTION",
            JobState::Service => "SERVICE",
            JobState::QueryPending => "QUERY_PENDING",
            JobState::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Discovery Records
// =============================================================================

/// Service Level Objective defined on an SRP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slo {
    pub name: String,
    /// Approximate average response time in milliseconds
    pub response_time_ms: f64,
    pub srp: String,
    pub workload: String,
    pub element_name: String,
    pub instance_id: String,
}

/// A front-end director port a hardware ID is logged in through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEndpoint {
    /// WWN of the target front-end port (the endpoint's Name key), not of the initiator
    pub wwn: String,
    pub director: String,
    pub port: String,
}
