//! Job Tracker
//!
//! Invokes extrinsic methods and follows the asynchronous jobs they start.
//! A nonzero return code means the array accepted the request and handed
//! back a job reference; the job is then polled until it reaches a terminal
//! state, the poll policy runs out, or the caller cancels.

use crate::domain::model::{classes, JobState};
use crate::domain::ports::{InvokeOutput, ObjectPath, ParamValue};
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay between two polls of a job
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Suffix shared by every job class the provider returns
const JOB_CLASS_SUFFIX: &str = "ConcreteJob";

// =============================================================================
// Poll Policy
// =============================================================================

/// Which non-terminal states keep a job under observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressRule {
    /// Keep polling through every non-terminal state
    #[default]
    AnyNonTerminal,
    /// Keep polling only while RUNNING; any other non-COMPLETED state fails
    RunningOnly,
}

/// How long and how often a job is polled
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Give up after this many polls
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first poll
    pub deadline: Option<Duration>,
    pub progress: ProgressRule,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
            progress: ProgressRule::default(),
        }
    }
}

impl PollPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_progress(mut self, progress: ProgressRule) -> Self {
        self.progress = progress;
        self
    }

    fn keeps_polling(&self, state: JobState) -> bool {
        match self.progress {
            ProgressRule::AnyNonTerminal => !state.is_terminal(),
            ProgressRule::RunningOnly => state == JobState::Running,
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Record of one awaited job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: ObjectPath,
    pub final_state: JobState,
    pub polls: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Result of [`JobTracker::invoke_and_wait`]
#[derive(Debug, Clone)]
pub struct Completion {
    pub method: String,
    pub output: InvokeOutput,
    /// Present when the method ran as a job
    pub report: Option<JobReport>,
}

impl Completion {
    pub fn is_synchronous(&self) -> bool {
        self.report.is_none()
    }

    /// A reference out-parameter, or [`Error::MissingOutParameter`]
    pub fn reference(&self, name: &str) -> Result<ObjectPath> {
        self.output
            .reference(name)
            .cloned()
            .ok_or_else(|| Error::MissingOutParameter {
                method: self.method.clone(),
                name: name.to_string(),
            })
    }
}

// =============================================================================
// Job Tracker
// =============================================================================

/// Invokes methods on configuration services and awaits their jobs
#[derive(Clone)]
pub struct JobTracker {
    graph: ResourceGraph,
    policy: PollPolicy,
}

impl JobTracker {
    pub fn new(graph: ResourceGraph, policy: PollPolicy) -> Self {
        Self { graph, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Invoke `method` on `service` without awaiting anything
    pub async fn invoke(
        &self,
        service: &ObjectPath,
        method: &str,
        params: Vec<ParamValue>,
    ) -> Result<InvokeOutput> {
        self.graph.invoke(service, method, params).await
    }

    /// The job reference among the out-parameters of `method`
    pub fn find_job_ref(&self, method: &str, output: &InvokeOutput) -> Result<ObjectPath> {
        output
            .references()
            .find(|path| is_job_class(path))
            .cloned()
            .ok_or_else(|| Error::JobNotFound {
                method: method.to_string(),
                return_code: output.return_code,
            })
    }

    async fn job_state(&self, job: &ObjectPath) -> Result<(JobState, Option<String>)> {
        let instance = self.graph.get_instance(job).await?;
        let state = JobState::from_code(instance.int_property("JobState")?);
        let description = instance.opt_str_property("ErrorDescription").map(String::from);
        Ok((state, description))
    }

    /// Poll `job` until it completes, fails, times out or is cancelled
    pub async fn await_job(
        &self,
        job: &ObjectPath,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<JobReport> {
        if policy.interval.is_zero() {
            return Err(Error::Configuration(
                "poll interval must be greater than zero".into(),
            ));
        }
        let started_at = Utc::now();
        let deadline = policy.deadline.map(|d| Instant::now() + d);
        let mut polls = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let (state, description) = self.job_state(job).await?;
            polls += 1;
            debug!("Job {} is {} after {} polls", job, state, polls);

            if state.is_success() {
                let report = JobReport {
                    job: job.clone(),
                    final_state: state,
                    polls,
                    started_at,
                    finished_at: Utc::now(),
                };
                debug!(
                    "Job {} completed in {} ms",
                    job,
                    report.elapsed().num_milliseconds()
                );
                return Ok(report);
            }
            if !policy.keeps_polling(state) {
                warn!("Job {} finished in state {}", job, state);
                return Err(Error::JobFailed { state, description });
            }
            if policy.max_attempts.map_or(false, |max| polls >= max) {
                return Err(Error::JobTimeout {
                    last_state: state,
                    polls,
                });
            }

            let mut wake = Instant::now() + policy.interval;
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(Error::JobTimeout {
                        last_state: state,
                        polls,
                    });
                }
                wake = wake.min(deadline);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Await `job`, then collect the objects of `result_class` it affected
    pub async fn await_and_resolve(
        &self,
        job: &ObjectPath,
        result_class: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ObjectPath>, JobReport)> {
        let report = self.await_job(job, &self.policy, cancel).await?;
        let results = self.job_results(job, result_class).await?;
        Ok((results, report))
    }

    /// Objects of `result_class` associated with a finished job
    pub async fn job_results(&self, job: &ObjectPath, result_class: &str) -> Result<Vec<ObjectPath>> {
        self.graph.associated_of_class(job, result_class).await
    }

    /// Invoke `method` and, if it started a job, await that job
    pub async fn invoke_and_wait(
        &self,
        service: &ObjectPath,
        method: &str,
        params: Vec<ParamValue>,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        let output = self.invoke(service, method, params).await?;
        if output.return_code == 0 {
            debug!("{} completed synchronously", method);
            return Ok(Completion {
                method: method.to_string(),
                output,
                report: None,
            });
        }

        let job = self.find_job_ref(method, &output)?;
        info!(
            "{} returned {}, awaiting job {}",
            method, output.return_code, job
        );
        let report = self.await_job(&job, &self.policy, cancel).await?;
        Ok(Completion {
            method: method.to_string(),
            output,
            report: Some(report),
        })
    }

    /// Objects of `result_class` produced by a completion
    ///
    /// Asynchronous completions are resolved through the job; synchronous
    /// ones fall back to the named out-parameter.
    pub async fn produced(
        &self,
        completion: &Completion,
        result_class: &str,
        sync_param: &str,
    ) -> Result<Vec<ObjectPath>> {
        match &completion.report {
            Some(report) => self.job_results(&report.job, result_class).await,
            None => Ok(vec![completion.reference(sync_param)?]),
        }
    }
}

/// Whether `path` names a job object
pub fn is_job_class(path: &ObjectPath) -> bool {
    path.is_class(classes::CONCRETE_JOB)
        || path
            .class_name()
            .to_ascii_lowercase()
            .ends_with(&JOB_CLASS_SUFFIX.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ServiceKind;
    use crate::simulator::SimulatedArray;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn fast_policy() -> PollPolicy {
        PollPolicy::default().with_interval(Duration::from_millis(1))
    }

    fn tracker(array: &Arc<SimulatedArray>) -> JobTracker {
        JobTracker::new(ResourceGraph::new(array.clone()), fast_policy())
    }

    #[tokio::test]
    async fn test_await_job_through_startup_states() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([
            JobState::New,
            JobState::Starting,
            JobState::Running,
            JobState::Completed,
        ]);
        let tracker = tracker(&array);

        let report = tracker
            .await_job(&job, &fast_policy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.final_state, JobState::Completed);
        assert_eq!(report.polls, 4);
        assert_eq!(report.job, job);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_await_job_through_unusual_non_terminal_states() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([
            JobState::Service,
            JobState::QueryPending,
            JobState::Unknown,
            JobState::Suspended,
            JobState::Completed,
        ]);
        let tracker = tracker(&array);

        let report = tracker
            .await_job(&job, &fast_policy(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.final_state, JobState::Completed);
        assert_eq!(report.polls, 5);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::Running, JobState::Completed]);
        let tracker = tracker(&array);
        let policy = fast_policy().with_interval(Duration::ZERO);

        let result = tracker
            .await_job(&job, &policy, &CancellationToken::new())
            .await;
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_await_job_killed() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::Running, JobState::Killed]);
        let tracker = tracker(&array);

        let result = tracker
            .await_job(&job, &fast_policy(), &CancellationToken::new())
            .await;
        assert_matches!(
            result,
            Err(Error::JobFailed {
                state: JobState::Killed,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_running_only_rule_rejects_new() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::New, JobState::Completed]);
        let tracker = tracker(&array);
        let policy = fast_policy().with_progress(ProgressRule::RunningOnly);

        let result = tracker
            .await_job(&job, &policy, &CancellationToken::new())
            .await;
        assert_matches!(
            result,
            Err(Error::JobFailed {
                state: JobState::New,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_attempt_limit_times_out() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::Running; 10]);
        let tracker = tracker(&array);
        let policy = fast_policy().with_max_attempts(3);

        let result = tracker
            .await_job(&job, &policy, &CancellationToken::new())
            .await;
        assert_matches!(
            result,
            Err(Error::JobTimeout {
                last_state: JobState::Running,
                polls: 3
            })
        );
    }

    #[tokio::test]
    async fn test_deadline_times_out() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::Suspended; 1000]);
        let tracker = tracker(&array);
        let policy = fast_policy().with_deadline(Duration::from_millis(20));

        let result = tracker
            .await_job(&job, &policy, &CancellationToken::new())
            .await;
        assert_matches!(
            result,
            Err(Error::JobTimeout {
                last_state: JobState::Suspended,
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_cancelled_token() {
        let array = Arc::new(SimulatedArray::new());
        let job = array.start_job([JobState::Running, JobState::Completed]);
        let tracker = tracker(&array);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tracker.await_job(&job, &fast_policy(), &cancel).await;
        assert_matches!(result, Err(Error::Cancelled));
    }

    #[tokio::test]
    async fn test_invoke_and_wait_resolves_job_results() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system("000196701380", 5978);
        let graph = ResourceGraph::new(array.clone());
        let service = graph
            .associated_of_class(&system, ServiceKind::ControllerConfiguration.class_name())
            .await
            .unwrap()
            .remove(0);
        let tracker = tracker(&array);

        let completion = tracker
            .invoke_and_wait(
                &service,
                "CreateGroup",
                vec![
                    ParamValue::new("GroupName", "sg1"),
                    ParamValue::new("Type", 4u16),
                ],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let report = completion.report.as_ref().unwrap();
        assert!(is_job_class(&report.job));

        let groups = tracker
            .job_results(&report.job, classes::DEVICE_MASKING_GROUP)
            .await
            .unwrap();
        assert_eq!(groups, vec![completion.reference("MaskingGroup").unwrap()]);
    }

    #[tokio::test]
    async fn test_find_and_await_returned_job() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system("000196701380", 5978);
        let graph = ResourceGraph::new(array.clone());
        let service = graph
            .associated_of_class(&system, ServiceKind::ControllerConfiguration.class_name())
            .await
            .unwrap()
            .remove(0);
        let tracker = tracker(&array);

        let output = tracker
            .invoke(
                &service,
                "CreateGroup",
                vec![
                    ParamValue::new("GroupName", "ig1"),
                    ParamValue::new("Type", 2u16),
                ],
            )
            .await
            .unwrap();
        assert_ne!(output.return_code, 0);
        let job = tracker.find_job_ref("CreateGroup", &output).unwrap();

        let (groups, report) = tracker
            .await_and_resolve(&job, classes::INITIATOR_MASKING_GROUP, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.final_state, JobState::Completed);
        assert_eq!(groups.len(), 1);
        assert!(array.contains(&groups[0]));
    }

    #[tokio::test]
    async fn test_missing_job_reference() {
        let array = Arc::new(SimulatedArray::new());
        let system = array.add_system("000196701380", 5978);
        array.drop_job_references(true);
        let graph = ResourceGraph::new(array.clone());
        let service = graph
            .associated_of_class(&system, ServiceKind::ControllerConfiguration.class_name())
            .await
            .unwrap()
            .remove(0);

        let result = tracker(&array)
            .invoke_and_wait(
                &service,
                "CreateGroup",
                vec![
                    ParamValue::new("GroupName", "sg1"),
                    ParamValue::new("Type", 4u16),
                ],
                &CancellationToken::new(),
            )
            .await;
        assert_matches!(
            result,
            Err(Error::JobNotFound {
                return_code: 4096,
                ..
            })
        );
    }
}
