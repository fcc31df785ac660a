//! Array Client
//!
//! Entry point wiring the components around one injected WBEM connection.

use crate::config::ClientConfig;
use crate::domain::ports::WbemClientRef;
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::inventory::Inventory;
use crate::job::JobTracker;
use crate::masking::GroupLifecycle;
use crate::provisioning::VolumeProvisioning;
use crate::system::SystemResolver;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Management client for the arrays behind one SMI-S provider
///
/// Every operation is a sequential chain of requests on the injected
/// connection. Cancelling the client's token aborts any job being awaited.
#[derive(Clone)]
pub struct ArrayClient {
    config: ClientConfig,
    resolver: SystemResolver,
    jobs: JobTracker,
    cancel: CancellationToken,
}

impl ArrayClient {
    pub fn new(client: WbemClientRef, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        info!("Connecting array client to {}", client.endpoint());
        let graph = ResourceGraph::new(client);
        Ok(Self {
            resolver: SystemResolver::new(graph.clone(), config.service_selection),
            jobs: JobTracker::new(graph, config.poll_policy()),
            cancel: CancellationToken::new(),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token cancelling every job awaited through this client
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn resolver(&self) -> &SystemResolver {
        &self.resolver
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn masking(&self) -> GroupLifecycle {
        GroupLifecycle::new(self.resolver.clone(), self.jobs.clone(), self.cancel.clone())
    }

    pub fn inventory(&self) -> Inventory {
        Inventory::new(self.resolver.clone())
    }

    pub fn provisioning(&self) -> VolumeProvisioning {
        VolumeProvisioning::new(self.resolver.clone(), self.jobs.clone(), self.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{GroupKind, JobState};
    use crate::error::Error;
    use crate::simulator::SimulatedArray;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ClientConfig::default();
        config.poll.interval_ms = 0;
        let result = ArrayClient::new(Arc::new(SimulatedArray::new()), config);
        assert_matches!(result.err(), Some(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_cancelling_client_aborts_jobs() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system("000196701380", 5978);
        array.script_next_job([JobState::Running; 3]);
        let client = ArrayClient::new(array.clone(), ClientConfig::default()).unwrap();
        client.cancellation_token().cancel();

        let result = client
            .masking()
            .create_group(&system, "sg1", GroupKind::Storage)
            .await;
        assert_matches!(result, Err(Error::Cancelled));
    }
}
