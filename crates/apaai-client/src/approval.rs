use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::orchestrator::DecisionService;
use crate::types::ActionStatus;
use crate::{ApaaiError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);
/// Shorter intervals are raised to this so a zero never busy-polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ─── Callback approval ────────────────────────────────────────────────────

/// What an approval handler is told about the action it is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub action_id: String,
    /// Check names the service requires, when it reported any.
    pub checks: Option<Vec<String>>,
}

/// Push-style approval wait: resolve once a human (or anything else) has
/// cleared the action. The orchestrator imposes no timeout; an `Err`
/// aborts the run before execution.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn await_approval(&self, request: &ApprovalRequest) -> Result<()>;
}

/// [`ApprovalHandler`] backed by an async closure. Build with [`approval_fn`].
pub struct FnApproval<F>(F);

#[async_trait]
impl<F, Fut> ApprovalHandler for FnApproval<F>
where
    F: Fn(ApprovalRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn await_approval(&self, request: &ApprovalRequest) -> Result<()> {
        (self.0)(request.clone()).await
    }
}

/// Wrap an async closure as an [`ApprovalHandler`].
///
/// ```rust,ignore
/// let handler = approval_fn(move |req| {
///     let apaai = apaai.clone();
///     async move {
///         apaai.approve_action(&req.action_id, Some("dev")).await?;
///         Ok(())
///     }
/// });
/// ```
pub fn approval_fn<F, Fut>(f: F) -> FnApproval<F>
where
    F: Fn(ApprovalRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    FnApproval(f)
}

// ─── Polling approval ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay between `get_action` calls.
    pub interval: Duration,
    /// Total budget measured from the first poll.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }
}

/// Terminal status observed by [`wait_for_approval`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub action_id: String,
    pub status: ActionStatus,
    /// `true` for `approved` and `completed`.
    pub approved: bool,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Pull-style approval wait.
///
/// Reads the action immediately and then every `opts.interval` until its
/// status is `approved`, `completed` or `rejected`. The last sleep is cut
/// short so a final poll lands exactly on the deadline; if that one is
/// still not terminal the wait fails with [`ApaaiError::ApprovalTimeout`].
/// Errors from `get_action` are returned as-is without retrying.
pub async fn wait_for_approval<S>(
    service: &S,
    action_id: &str,
    opts: PollOptions,
) -> Result<ApprovalOutcome>
where
    S: DecisionService + ?Sized,
{
    let start = tokio::time::Instant::now();
    let interval = opts.interval.max(MIN_POLL_INTERVAL);
    let mut polls: u32 = 0;

    loop {
        let action = service.get_action(action_id).await?;
        polls += 1;
        // Actions read back without a status have not been decided yet.
        let status = action.status.unwrap_or(ActionStatus::Pending);
        tracing::debug!(action_id, status = %status, polls, "polled approval status");

        if status.is_terminal() {
            tracing::info!(action_id, status = %status, polls, "approval wait finished");
            return Ok(ApprovalOutcome {
                action_id: action_id.to_string(),
                approved: status.is_approved(),
                status,
                polls,
                elapsed: start.elapsed(),
            });
        }

        let elapsed = start.elapsed();
        if elapsed >= opts.timeout {
            tracing::warn!(action_id, polls, elapsed_secs = elapsed.as_secs_f64(), "approval wait timed out");
            return Err(ApaaiError::ApprovalTimeout {
                action_id: action_id.to_string(),
                elapsed,
            });
        }
        tokio::time::sleep(interval.min(opts.timeout - elapsed)).await;
    }
}

// ─── Strategy ─────────────────────────────────────────────────────────────

/// How a gated run waits when the decision is `requires_approval`.
///
/// The callback and polling designs are alternatives; a run uses exactly
/// one of them.
#[derive(Clone, Default)]
pub enum ApprovalStrategy {
    /// Go straight to execution.
    #[default]
    None,
    Callback(Arc<dyn ApprovalHandler>),
    Poll(PollOptions),
}

impl fmt::Debug for ApprovalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStrategy::None => f.write_str("None"),
            ApprovalStrategy::Callback(_) => f.write_str("Callback(..)"),
            ApprovalStrategy::Poll(opts) => f.debug_tuple("Poll").field(opts).finish(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Actor, Decision, Evidence, Verification};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns the scripted statuses in order, repeating the last one.
    struct ScriptedStatuses {
        script: Mutex<VecDeque<Option<ActionStatus>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedStatuses {
        fn new(statuses: &[Option<ActionStatus>]) -> Self {
            Self {
                script: Mutex::new(statuses.iter().cloned().collect()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl DecisionService for ScriptedStatuses {
        async fn create_action(&self, _action: &Action) -> Result<Decision> {
            unreachable!("polling never creates actions")
        }

        async fn submit_evidence(&self, _evidence: &Evidence) -> Result<Verification> {
            unreachable!("polling never submits evidence")
        }

        async fn get_action(&self, action_id: &str) -> Result<Action> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let status = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().flatten()
            };
            let mut action = crate::types::ActionRequest::new("send_email", Actor::agent("bot"))
                .with_id(action_id)
                .into_action();
            action.status = status;
            Ok(action)
        }
    }

    struct FailingService;

    #[async_trait]
    impl DecisionService for FailingService {
        async fn create_action(&self, _action: &Action) -> Result<Decision> {
            unreachable!()
        }

        async fn submit_evidence(&self, _evidence: &Evidence) -> Result<Verification> {
            unreachable!()
        }

        async fn get_action(&self, _action_id: &str) -> Result<Action> {
            Err(ApaaiError::Http {
                method: "GET".into(),
                path: "/actions/a_1".into(),
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: String::new(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_after_third_poll() {
        let svc = ScriptedStatuses::new(&[
            Some(ActionStatus::Pending),
            Some(ActionStatus::Pending),
            Some(ActionStatus::Approved),
        ]);
        let outcome = wait_for_approval(&svc, "a_1", PollOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, ActionStatus::Approved);
        assert!(outcome.approved);
        assert_eq!(outcome.polls, 3);
        assert_eq!(svc.calls(), 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn completed_counts_as_approved() {
        let svc = ScriptedStatuses::new(&[Some(ActionStatus::Completed)]);
        let outcome = wait_for_approval(&svc, "a_1", PollOptions::default())
            .await
            .unwrap();
        assert!(outcome.approved);
        assert_eq!(outcome.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_is_terminal_but_not_approved() {
        let svc = ScriptedStatuses::new(&[None, Some(ActionStatus::Rejected)]);
        let outcome = wait_for_approval(&svc, "a_1", PollOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, ActionStatus::Rejected);
        assert!(!outcome.approved);
        assert_eq!(outcome.polls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_terminal() {
        let svc = ScriptedStatuses::new(&[Some(ActionStatus::RequiresApproval)]);
        let opts = PollOptions::new(Duration::from_secs(5), Duration::from_secs(12));
        let err = wait_for_approval(&svc, "a_42", opts).await.unwrap_err();

        match &err {
            ApaaiError::ApprovalTimeout { action_id, elapsed } => {
                assert_eq!(action_id, "a_42");
                assert_eq!(*elapsed, Duration::from_secs(12));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(err.to_string().contains("a_42"));
        // t = 0, 5, 10 and the clipped final poll at 12
        assert_eq!(svc.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_polls_once() {
        let svc = ScriptedStatuses::new(&[Some(ActionStatus::Pending)]);
        let opts = PollOptions::new(Duration::from_secs(5), Duration::ZERO);
        let err = wait_for_approval(&svc, "a_1", opts).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(svc.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_raised_to_the_floor() {
        assert_eq!(
            PollOptions::new(Duration::ZERO, Duration::from_secs(1)).interval,
            MIN_POLL_INTERVAL
        );

        let svc = ScriptedStatuses::new(&[Some(ActionStatus::Pending)]);
        let opts = PollOptions {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        let err = wait_for_approval(&svc, "a_1", opts).await.unwrap_err();
        assert!(err.is_timeout());
        // t = 0, 0.1, ..., 1.0
        assert_eq!(svc.calls(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_propagate_without_retry() {
        let err = wait_for_approval(&FailingService, "a_1", PollOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn approval_fn_receives_request() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = approval_fn(move |req: ApprovalRequest| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(req.action_id);
                Ok(())
            }
        });

        let req = ApprovalRequest {
            action_id: "a_1".into(),
            checks: Some(vec!["reviewer_approval".into()]),
        };
        handler.await_approval(&req).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["a_1".to_string()]);
    }

    #[test]
    fn default_poll_options() {
        let opts = PollOptions::default();
        assert_eq!(opts.interval, Duration::from_secs(5));
        assert_eq!(opts.timeout, Duration::from_secs(300));
        assert_eq!(format!("{:?}", ApprovalStrategy::default()), "None");
    }
}
