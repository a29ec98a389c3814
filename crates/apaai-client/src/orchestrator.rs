//! Gated execution: propose an action, wait for approval if the service
//! asks for it, run the caller's work and record the outcome as evidence.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::approval::{
    wait_for_approval, ApprovalHandler, ApprovalRequest, ApprovalStrategy, PollOptions,
};
use crate::client::AccountabilityLayer;
use crate::error::GateError;
use crate::types::{Action, ActionRequest, ActionStatus, Check, Decision, Evidence, Verification};
use crate::{ApaaiError, Result};

/// Check recorded after a successful run when no success hook is set.
pub const ACTION_EXECUTED: &str = "action_executed";
/// Check recorded after a failed run when no error hook is set.
pub const ACTION_FAILED: &str = "action_failed";

/// The subset of the accountability service a gated run talks to.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn create_action(&self, action: &Action) -> Result<Decision>;
    async fn submit_evidence(&self, evidence: &Evidence) -> Result<Verification>;
    async fn get_action(&self, action_id: &str) -> Result<Action>;
}

#[async_trait]
impl DecisionService for AccountabilityLayer {
    async fn create_action(&self, action: &Action) -> Result<Decision> {
        AccountabilityLayer::create_action(self, action).await
    }

    async fn submit_evidence(&self, evidence: &Evidence) -> Result<Verification> {
        AccountabilityLayer::submit_evidence(self, evidence).await
    }

    async fn get_action(&self, action_id: &str) -> Result<Action> {
        AccountabilityLayer::get_action(self, action_id).await
    }
}

type SuccessChecks<T> = Box<dyn FnOnce(&T) -> Vec<Check> + Send>;
type ErrorChecks<E> = Box<dyn FnOnce(&E) -> Vec<Check> + Send>;

/// An action plus everything needed to gate it.
///
/// ```rust,ignore
/// let sent = GatedAction::new(
///     ActionRequest::new("send_email", Actor::agent("mail-agent"))
///         .with_target("mailto:sarah@acme.com")
///         .with_param("subject", "Pricing"),
/// )
/// .on_approval(approval_fn(|req| async move { ask_a_human(&req.action_id).await }))
/// .on_success(|_: &MessageId| vec![Check::passed("email_sent")])
/// .run(&apaai, || mailer.send())
/// .await?;
/// ```
pub struct GatedAction<T, E> {
    request: ActionRequest,
    approval: ApprovalStrategy,
    on_success: Option<SuccessChecks<T>>,
    on_error: Option<ErrorChecks<E>>,
}

impl<T, E> GatedAction<T, E> {
    pub fn new(request: ActionRequest) -> Self {
        Self {
            request,
            approval: ApprovalStrategy::None,
            on_success: None,
            on_error: None,
        }
    }

    /// Wait for `handler` when the decision requires approval.
    pub fn on_approval(mut self, handler: impl ApprovalHandler + 'static) -> Self {
        self.approval = ApprovalStrategy::Callback(Arc::new(handler));
        self
    }

    /// Poll the action's status when the decision requires approval.
    pub fn poll_approval(mut self, opts: PollOptions) -> Self {
        self.approval = ApprovalStrategy::Poll(opts);
        self
    }

    pub fn approval(mut self, strategy: ApprovalStrategy) -> Self {
        self.approval = strategy;
        self
    }

    /// Checks to record when execution succeeds.
    pub fn on_success(mut self, f: impl FnOnce(&T) -> Vec<Check> + Send + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Checks to record when execution fails.
    pub fn on_error(mut self, f: impl FnOnce(&E) -> Vec<Check> + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn request(&self) -> &ActionRequest {
        &self.request
    }

    pub async fn run<S, F, Fut>(self, service: &S, execute: F) -> std::result::Result<T, GateError<E>>
    where
        S: DecisionService + ?Sized,
        E: fmt::Display,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        run_gated_action(service, self, execute).await
    }
}

impl<T, E> fmt::Debug for GatedAction<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatedAction")
            .field("request", &self.request)
            .field("approval", &self.approval)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Propose, wait, execute and record.
///
/// 1. The action is created with `id` and `timestamp` defaulted.
/// 2. If the decision is `requires_approval`, the configured strategy is
///    used: the callback is awaited once, or the status is polled. With no
///    strategy the run continues immediately. Any other status goes
///    straight to execution.
/// 3. `execute` runs exactly once.
/// 4. Evidence goes to the decision's `action_id`. On success the evidence
///    call must succeed; on failure it is best effort and the caller always
///    gets the original error back as [`GateError::Execution`].
pub async fn run_gated_action<S, T, E, F, Fut>(
    service: &S,
    gate: GatedAction<T, E>,
    execute: F,
) -> std::result::Result<T, GateError<E>>
where
    S: DecisionService + ?Sized,
    E: fmt::Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let GatedAction {
        request,
        approval,
        on_success,
        on_error,
    } = gate;

    let action = request.into_action();
    let decision = service.create_action(&action).await?;
    let action_id = decision.action_id.clone();
    tracing::info!(
        action_id = %action_id,
        action_type = %action.action_type,
        status = %decision.status,
        "action proposed"
    );

    if decision.requires_approval() {
        await_approval(service, &decision, approval).await?;
    } else if decision.status == ActionStatus::Rejected {
        tracing::warn!(action_id = %action_id, "action rejected by policy; executing without approval wait");
    }

    match execute().await {
        Ok(value) => {
            let checks = match on_success {
                Some(hook) => hook(&value),
                None => vec![Check::passed(ACTION_EXECUTED)],
            };
            record(service, &action_id, checks).await?;
            tracing::info!(action_id = %action_id, "action executed");
            Ok(value)
        }
        Err(err) => {
            let checks = match on_error {
                Some(hook) => hook(&err),
                None => vec![Check::failed(ACTION_FAILED).with_note(err.to_string())],
            };
            if let Err(evidence_err) = record(service, &action_id, checks).await {
                tracing::warn!(
                    action_id = %action_id,
                    error = %evidence_err,
                    "failed to record evidence for failed action"
                );
            }
            tracing::info!(action_id = %action_id, error = %err, "action failed");
            Err(GateError::Execution(err))
        }
    }
}

async fn await_approval<S>(service: &S, decision: &Decision, approval: ApprovalStrategy) -> Result<()>
where
    S: DecisionService + ?Sized,
{
    let action_id = decision.action_id.as_str();
    match approval {
        ApprovalStrategy::None => {
            tracing::debug!(action_id, "approval required but no strategy set; continuing");
            Ok(())
        }
        ApprovalStrategy::Callback(handler) => {
            tracing::info!(action_id, "waiting for approval callback");
            let request = ApprovalRequest {
                action_id: action_id.to_string(),
                checks: decision.checks.clone(),
            };
            handler.await_approval(&request).await
        }
        ApprovalStrategy::Poll(opts) => {
            tracing::info!(action_id, interval_secs = opts.interval.as_secs(), "polling for approval");
            let outcome = wait_for_approval(service, action_id, opts).await?;
            if outcome.approved {
                Ok(())
            } else {
                Err(ApaaiError::ApprovalRejected {
                    action_id: outcome.action_id,
                })
            }
        }
    }
}

async fn record<S>(service: &S, action_id: &str, checks: Vec<Check>) -> Result<Verification>
where
    S: DecisionService + ?Sized,
{
    let evidence = Evidence {
        action_id: action_id.to_string(),
        checks,
        timestamp: Some(crate::types::now_iso()),
    };
    service.submit_evidence(&evidence).await
}

// ─── Tests ────────────────────────────────────────────────────────────────
