//! SMI-S Array Client
//!
//! Management client for Symmetrix/VMAX-family SAN arrays, driven through an
//! SMI-S (CIM/WBEM) provider. It discovers arrays and their configuration
//! services, provisions thin volumes, and manages the masking objects that
//! grant hosts access to storage: storage, port and initiator groups tied
//! together by masking views.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                            ArrayClient                               │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────────┐  │
//! │  │  GroupLifecycle  │  │ VolumeProvision. │  │     Inventory      │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └─────────┬──────────┘  │
//! │           │                     │                      │             │
//! │  ┌────────┴─────────────────────┴──┐                   │             │
//! │  │           JobTracker            │                   │             │
//! │  └────────────────┬────────────────┘                   │             │
//! │                   │       ┌────────────────────────────┴──────────┐  │
//! │                   │       │            SystemResolver             │  │
//! │                   │       └───────────────────┬───────────────────┘  │
//! │  ┌────────────────┴───────────────────────────┴───────────────────┐  │
//! │  │                 ResourceGraph (WbemClient port)                │  │
//! │  └────────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: Facade wiring the components together
//! - [`system`]: Array, service, generation and pool resolution
//! - [`job`]: Method invocation and job polling
//! - [`masking`]: Masking groups, masking views and hardware IDs
//! - [`inventory`]: Read-only discovery
//! - [`provisioning`]: Volumes and target endpoints
//! - [`identifier`]: Composite instance-ID codec
//! - [`simulator`]: In-memory provider for tests and offline use
//! - [`domain`]: Core types and the WBEM port
//! - [`error`]: Error types and handling

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod identifier;
pub mod inventory;
pub mod job;
pub mod masking;
pub mod provisioning;
pub mod simulator;
pub mod system;

pub use client::ArrayClient;
pub use config::{ClientConfig, PollSettings};

pub use domain::model::{
    classes, GroupKind, HardwareIdType, JobState, ServiceKind, Slo, TargetEndpoint,
};
pub use domain::ports::{
    AssociationQuery, CimValue, Instance, InvokeOutput, ObjectPath, ParamValue, WbemClient,
    WbemClientRef,
};

pub use error::{Error, Result};

pub use graph::ResourceGraph;
pub use identifier::{ElementKey, HardwareIdKey, PortKey};
pub use inventory::Inventory;
pub use job::{Completion, JobReport, JobTracker, PollPolicy, ProgressRule};
pub use masking::GroupLifecycle;
pub use provisioning::VolumeProvisioning;
pub use simulator::{ArraySnapshot, SimulatedArray};
pub use system::{ServiceSelection, SystemResolver};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
