//! Client Configuration
//!
//! Job polling and service selection settings, loadable from YAML.
//!
//! ```yaml
//! poll:
//!   interval_ms: 250
//!   max_attempts: 1200
//!   deadline_ms: 600000
//!   progress: any_non_terminal
//! service_selection: exclusive
//! ```

use crate::error::{Error, Result};
use crate::job::{PollPolicy, ProgressRule, DEFAULT_POLL_INTERVAL};
use crate::system::ServiceSelection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Poll Settings
// =============================================================================

/// Serialized form of a [`PollPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// Delay between polls in milliseconds
    pub interval_ms: u64,
    pub max_attempts: Option<u32>,
    /// Overall limit in milliseconds
    pub deadline_ms: Option<u64>,
    pub progress: ProgressRule,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            max_attempts: None,
            deadline_ms: None,
            progress: ProgressRule::default(),
        }
    }
}

impl PollSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            deadline: self.deadline_ms.map(Duration::from_millis),
            progress: self.progress,
        }
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for an [`ArrayClient`](crate::client::ArrayClient)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll: PollSettings,
    pub service_selection: ServiceSelection,
}

impl ClientConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms == 0 {
            return Err(Error::Configuration(
                "poll.interval_ms must be greater than zero".into(),
            ));
        }
        if self.poll.max_attempts == Some(0) {
            return Err(Error::Configuration(
                "poll.max_attempts must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.poll.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.service_selection, ServiceSelection::Exclusive);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml("poll:\n  max_attempts: 10\n").unwrap();
        let policy = config.poll_policy();
        assert_eq!(policy.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(policy.max_attempts, Some(10));
        assert_eq!(policy.progress, ProgressRule::AnyNonTerminal);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "poll:\n  interval_ms: 250\n  deadline_ms: 60000\n  progress: running_only\nservice_selection: first_match"
        )
        .unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        let policy = config.poll_policy();
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.deadline, Some(Duration::from_secs(60)));
        assert_eq!(policy.progress, ProgressRule::RunningOnly);
        assert_eq!(config.service_selection, ServiceSelection::FirstMatch);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert_matches!(
            ClientConfig::from_yaml("poll:\n  interval_ms: 0\n"),
            Err(Error::Configuration(_))
        );
    }
}
