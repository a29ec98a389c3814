use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Actor ────────────────────────────────────────────────────────────────

/// Who is taking an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Agent,
    Human,
    System,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Agent => "agent",
            ActorKind::Human => "human",
            ActorKind::System => "system",
        }
    }
}

impl std::str::FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(ActorKind::Agent),
            "human" => Ok(ActorKind::Human),
            "system" => Ok(ActorKind::System),
            other => Err(format!(
                "unknown actor kind '{other}' (expected agent, human or system)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Actor {
    pub kind: ActorKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Actor {
    pub fn new(kind: ActorKind, name: impl Into<String>) -> Self {
        Actor {
            kind,
            name: name.into(),
            provider: None,
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::new(ActorKind::Agent, name)
    }

    pub fn human(name: impl Into<String>) -> Self {
        Self::new(ActorKind::Human, name)
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(ActorKind::System, name)
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

// ─── Action / Decision ────────────────────────────────────────────────────

/// Status of an action as reported by the accountability layer.
///
/// Decisions use the first four values; `pending` and `completed` show up
/// when an action is read back while its approval is in flight. Anything
/// else the service invents is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ActionStatus {
    Approved,
    Rejected,
    RequiresApproval,
    Observed,
    Pending,
    Completed,
    Unknown(String),
}

impl ActionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ActionStatus::Approved => "approved",
            ActionStatus::Rejected => "rejected",
            ActionStatus::RequiresApproval => "requires_approval",
            ActionStatus::Observed => "observed",
            ActionStatus::Pending => "pending",
            ActionStatus::Completed => "completed",
            ActionStatus::Unknown(raw) => raw,
        }
    }

    /// `approved`, `completed` and `rejected` end an approval wait.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Approved | ActionStatus::Completed | ActionStatus::Rejected
        )
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ActionStatus::Approved | ActionStatus::Completed)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;

    /// Accepts only the statuses this client knows about.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match ActionStatus::from(s.to_string()) {
            ActionStatus::Unknown(other) => Err(format!(
                "unknown status '{other}' (expected approved, rejected, requires_approval, observed, pending or completed)"
            )),
            status => Ok(status),
        }
    }
}

impl From<String> for ActionStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "approved" => ActionStatus::Approved,
            "rejected" => ActionStatus::Rejected,
            "requires_approval" => ActionStatus::RequiresApproval,
            "observed" => ActionStatus::Observed,
            "pending" => ActionStatus::Pending,
            "completed" => ActionStatus::Completed,
            _ => ActionStatus::Unknown(raw),
        }
    }
}

impl From<ActionStatus> for String {
    fn from(status: ActionStatus) -> Self {
        match status {
            ActionStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// An operation submitted for accountability tracking.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub actor: Actor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, serde_json::Value>>,
    /// Attached by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,
    /// Required check names, attached by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Gating verdict returned when an action is created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action_id: String,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<String>>,
}

impl Decision {
    pub fn requires_approval(&self) -> bool {
        self.status == ActionStatus::RequiresApproval
    }
}

/// Query filters for listing actions. Unset fields are left out of the
/// query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionFilter {
    pub status: Option<ActionStatus>,
    pub action_type: Option<String>,
    pub actor: Option<String>,
    pub agent_id: Option<String>,
    pub limit: Option<u32>,
}

impl ActionFilter {
    /// `(key, value)` pairs in the service's query-parameter naming.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = &self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(t) = &self.action_type {
            pairs.push(("type", t.clone()));
        }
        if let Some(actor) = &self.actor {
            pairs.push(("actor", actor.clone()));
        }
        if let Some(agent_id) = &self.agent_id {
            pairs.push(("agentId", agent_id.clone()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

// ─── Evidence ─────────────────────────────────────────────────────────────

/// A named pass/fail outcome.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Check {
    pub name: String,
    pub pass: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Check {
    pub fn new(name: impl Into<String>, pass: bool) -> Self {
        Check {
            name: name.into(),
            pass,
            approver: None,
            note: None,
        }
    }

    pub fn passed(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub action_id: String,
    pub checks: Vec<Check>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// `{ "verified": bool }`, returned by evidence, approve and reject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Verification {
    #[serde(default)]
    pub verified: bool,
}

// ─── Policy ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Block until the required checks are satisfied.
    Enforce,
    /// Record only.
    Observe,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<RuleMatch>,
    /// Check names, e.g. `["reviewer_approval"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PolicyMode>,
}

impl PolicyRule {
    pub fn matches(&self, action_type: &str) -> bool {
        self.when.as_ref().is_some_and(|w| {
            w.action.as_deref() == Some(action_type)
                || w.action_type.as_deref() == Some(action_type)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Policy {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    /// Keep only rules matching `action_type`. When nothing matches the full
    /// rule set is returned unchanged.
    pub fn scoped_to(self, action_type: &str) -> Policy {
        let matching: Vec<PolicyRule> = self
            .rules
            .iter()
            .filter(|r| r.matches(action_type))
            .cloned()
            .collect();
        if matching.is_empty() {
            self
        } else {
            Policy { rules: matching }
        }
    }

    /// Union of the checks every matching rule requires, in first-seen order.
    pub fn required_checks(&self, action_type: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(action_type)) {
            for name in rule.require.iter().flatten() {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        }
        out
    }
}

// ─── Agents ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetrics {
    #[serde(default)]
    pub total_actions: u64,
    #[serde(default)]
    pub approved_actions: u64,
    #[serde(default)]
    pub blocked_actions: u64,
    #[serde(default)]
    pub pending_actions: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<String>,
    #[serde(default)]
    pub metrics: AgentMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentSettings>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentSettings>,
}

/// Self-registration of an agent using an organisation enrollment key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapInput {
    pub enrollment_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BootstrapAgent {
    pub name: String,
    pub slug: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapResult {
    pub agent_id: String,
    /// Credential the agent uses as its API key from now on.
    pub agent_token: String,
    pub agent: BootstrapAgent,
    #[serde(default)]
    pub policies: Vec<DiscoveredPolicy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    AllAgents,
    OptIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPolicy {
    pub id: String,
    pub name: String,
    pub action_type: String,
    pub mode: PolicyMode,
    pub scope: PolicyScope,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDiscoveryResult {
    pub agent_id: String,
    pub agent_name: String,
    #[serde(default)]
    pub policies: Vec<DiscoveredPolicy>,
}

/// Condition of a proposed rule, e.g. `{ field: "amount", operator: "gt", value: "100" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProposedRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<RuleCondition>,
    /// Outcome when the rule matches (`"require_approval"`, `"allow"`, ...).
    pub then: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require: Option<Vec<String>>,
}

/// A policy an agent suggests for its own action type; an operator has to
/// accept it before it takes effect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposePolicyInput {
    pub name: String,
    pub action_type: String,
    pub mode: PolicyMode,
    pub scope: PolicyScope,
    pub rules: Vec<ProposedRule>,
}

// ─── ActionRequest ────────────────────────────────────────────────────────

/// Caller-side description of an action before it is submitted.
///
/// `id` and `timestamp` are optional; [`ActionRequest::into_action`] fills
/// them with a fresh UUID v4 and the current UTC time.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action_type: String,
    pub actor: Actor,
    pub target: Option<String>,
    pub params: Option<BTreeMap<String, serde_json::Value>>,
    pub id: Option<String>,
    pub timestamp: Option<String>,
}

impl ActionRequest {
    pub fn new(action_type: impl Into<String>, actor: Actor) -> Self {
        ActionRequest {
            action_type: action_type.into(),
            actor,
            target: None,
            params: None,
            id: None,
            timestamp: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn into_action(self) -> Action {
        Action {
            id: self.id.unwrap_or_else(new_action_id),
            timestamp: self.timestamp.unwrap_or_else(now_iso),
            action_type: self.action_type,
            actor: self.actor,
            target: self.target,
            params: self.params,
            status: None,
            checks: None,
            agent_id: None,
        }
    }
}

pub fn new_action_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time as `2024-05-01T12:00:00.000Z`.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
