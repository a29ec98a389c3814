//! `apaai-client`: Rust client for the APAAI accountability layer.
//!
//! Agents propose an action, the service decides whether it needs a human,
//! the agent runs it and reports what happened as evidence. This crate
//! speaks the service's JSON-over-HTTP API and wraps the whole cycle in a
//! single call.
//!
//! # Architecture
//!
//! ```text
//! ActionRequest
//!     │
//!     ▼
//! run_gated_action ── create_action ──▶ Decision
//!     │                                   │ requires_approval?
//!     │              ApprovalHandler ◀────┤ (callback)
//!     │              wait_for_approval ◀──┘ (polling)
//!     ▼
//! execute() ── submit_evidence ──▶ Verification
//!     │
//!     ▼
//! DecisionService  ← implemented by AccountabilityLayer (reqwest)
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use apaai_client::{AccountabilityLayer, ActionRequest, Actor, ClientConfig, GatedAction};
//!
//! let apaai = AccountabilityLayer::new(&ClientConfig::resolve(None)?)?;
//! let receipt = GatedAction::new(
//!     ActionRequest::new("send_email", Actor::agent("mail-agent"))
//!         .with_target("mailto:sarah@acme.com"),
//! )
//! .run(&apaai, || async { mailer.send().await })
//! .await?;
//! ```

pub mod agents;
pub mod approval;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod types;


pub use approval::{
    approval_fn, wait_for_approval, ApprovalHandler, ApprovalOutcome, ApprovalRequest,
    ApprovalStrategy, FnApproval, PollOptions,
};
pub use client::AccountabilityLayer;
pub use config::{AuthScheme, ClientConfig, ConfigWarning, RouteStyle, WarnLevel};
pub use error::{ApaaiError, GateError};
pub use orchestrator::{
    run_gated_action, DecisionService, GatedAction, ACTION_EXECUTED, ACTION_FAILED,
};
pub use types::{
    new_action_id, now_iso, Action, ActionFilter, ActionRequest, ActionStatus, Actor, ActorKind,
    Agent, AgentStatus, BootstrapInput, BootstrapResult, Check, CreateAgentInput, Decision,
    Evidence, Policy, PolicyMode, PolicyRule, RuleMatch, Verification,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ApaaiError>;
