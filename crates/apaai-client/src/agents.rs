//! Agent registry and policy discovery endpoints.

use reqwest::Method;

use crate::client::AccountabilityLayer;
use crate::types::{
    Agent, BootstrapInput, BootstrapResult, CreateAgentInput, DiscoveredPolicy,
    PolicyDiscoveryResult, ProposePolicyInput, UpdateAgentInput,
};
use crate::Result;

impl AccountabilityLayer {
    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.get(&["agents"], &[]).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Agent> {
        self.get(&["agents", agent_id], &[]).await
    }

    pub async fn create_agent(&self, input: &CreateAgentInput) -> Result<Agent> {
        self.send(Method::POST, &["agents"], input).await
    }

    /// Partial update; unset fields are left out of the request body.
    pub async fn update_agent(&self, agent_id: &str, input: &UpdateAgentInput) -> Result<Agent> {
        self.send(Method::PATCH, &["agents", agent_id], input).await
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        self.delete(&["agents", agent_id]).await
    }

    /// Register an agent with an enrollment key. The returned
    /// `agent_token` replaces the enrollment key for later calls.
    pub async fn bootstrap_agent(&self, input: &BootstrapInput) -> Result<BootstrapResult> {
        let result: BootstrapResult = self
            .send(Method::POST, &["agents", "bootstrap"], input)
            .await?;
        tracing::info!(agent_id = %result.agent_id, slug = %result.agent.slug, "agent bootstrapped");
        Ok(result)
    }

    /// Policies that apply to `agent_id`.
    pub async fn discover_policies(&self, agent_id: &str) -> Result<PolicyDiscoveryResult> {
        self.get(&["agents", agent_id, "policies"], &[]).await
    }

    pub async fn propose_policy(&self, input: &ProposePolicyInput) -> Result<DiscoveredPolicy> {
        self.send(Method::POST, &["policies", "propose"], input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::types::{AgentStatus, PolicyMode, PolicyScope, ProposedRule, RuleCondition};
    use mockito::Matcher;
    use serde_json::json;

    fn agent_json(id: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "orgId": "org_1",
            "name": "Mailer",
            "slug": "mailer",
            "status": status,
            "metrics": {"totalActions": 12, "approvedActions": 10, "blockedActions": 1, "pendingActions": 1},
            "createdAt": "2024-05-01T00:00:00.000Z",
            "updatedAt": "2024-05-02T00:00:00.000Z"
        })
    }

    fn client(server: &mockito::Server) -> AccountabilityLayer {
        AccountabilityLayer::new(&ClientConfig::new(server.url())).unwrap()
    }

    #[tokio::test]
    async fn list_and_get_agents() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agents")
            .with_body(json!([agent_json("ag_1", "active"), agent_json("ag_2", "idle")]).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/agents/ag_1")
            .with_body(agent_json("ag_1", "active").to_string())
            .create_async()
            .await;

        let c = client(&server);
        let agents = c.list_agents().await.unwrap();
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[1].status, AgentStatus::Idle);

        let agent = c.get_agent("ag_1").await.unwrap();
        assert_eq!(agent.org_id, "org_1");
        assert_eq!(agent.metrics.total_actions, 12);
        assert!(agent.config.is_none());
    }

    #[tokio::test]
    async fn create_update_delete_agent() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/agents")
            .match_body(Matcher::Json(json!({"name": "Mailer"})))
            .with_status(201)
            .with_body(agent_json("ag_1", "active").to_string())
            .create_async()
            .await;
        let update = server
            .mock("PATCH", "/agents/ag_1")
            .match_body(Matcher::Json(json!({"status": "disabled"})))
            .with_body(agent_json("ag_1", "disabled").to_string())
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/agents/ag_1")
            .with_status(204)
            .create_async()
            .await;

        let c = client(&server);
        c.create_agent(&CreateAgentInput {
            name: "Mailer".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        let updated = c
            .update_agent(
                "ag_1",
                &UpdateAgentInput {
                    status: Some(AgentStatus::Disabled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        c.delete_agent("ag_1").await.unwrap();

        create.assert_async().await;
        update.assert_async().await;
        delete.assert_async().await;
        assert_eq!(updated.status, AgentStatus::Disabled);
    }

    #[tokio::test]
    async fn delete_tolerates_json_acknowledgement() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/agents/ag_1")
            .with_body(r#"{"deleted":true}"#)
            .create_async()
            .await;
        client(&server).delete_agent("ag_1").await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_returns_token_and_policies() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/agents/bootstrap")
            .match_body(Matcher::Json(json!({
                "enrollmentKey": "ek_123",
                "name": "Mailer",
                "tags": ["email"]
            })))
            .with_body(
                json!({
                    "agentId": "ag_9",
                    "agentToken": "tok_abc",
                    "agent": {"name": "Mailer", "slug": "mailer", "status": "active"},
                    "policies": [{
                        "id": "p_1",
                        "name": "Outbound email",
                        "actionType": "send_email",
                        "mode": "enforce",
                        "scope": "all_agents",
                        "rules": [{"require": ["reviewer_approval"]}]
                    }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let result = client(&server)
            .bootstrap_agent(&BootstrapInput {
                enrollment_key: "ek_123".into(),
                name: "Mailer".into(),
                tags: vec!["email".into()],
                ..Default::default()
            })
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(result.agent_token, "tok_abc");
        assert_eq!(result.policies[0].scope, PolicyScope::AllAgents);
        assert_eq!(
            result.policies[0].rules[0].require,
            Some(vec!["reviewer_approval".to_string()])
        );
    }

    #[tokio::test]
    async fn discover_and_propose_policies() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agents/ag%201/policies")
            .with_body(r#"{"agentId":"ag 1","agentName":"Mailer"}"#)
            .create_async()
            .await;
        let propose = server
            .mock("POST", "/policies/propose")
            .match_body(Matcher::PartialJson(json!({
                "actionType": "refund",
                "scope": "opt_in",
                "rules": [{"when": {"field": "amount", "operator": "gt", "value": "100"}, "then": "require_approval"}]
            })))
            .with_body(
                json!({
                    "id": "p_2", "name": "Large refunds", "actionType": "refund",
                    "mode": "observe", "scope": "opt_in"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let c = client(&server);
        let found = c.discover_policies("ag 1").await.unwrap();
        assert_eq!(found.agent_id, "ag 1");
        assert!(found.policies.is_empty());

        let policy = c
            .propose_policy(&ProposePolicyInput {
                name: "Large refunds".into(),
                action_type: "refund".into(),
                mode: PolicyMode::Observe,
                scope: PolicyScope::OptIn,
                rules: vec![ProposedRule {
                    when: Some(RuleCondition {
                        field: Some("amount".into()),
                        operator: Some("gt".into()),
                        value: Some("100".into()),
                        ..Default::default()
                    }),
                    then: "require_approval".into(),
                    require: None,
                }],
            })
            .await
            .unwrap();

        propose.assert_async().await;
        assert_eq!(policy.id, "p_2");
        assert_eq!(policy.mode, PolicyMode::Observe);
    }

    #[tokio::test]
    async fn unknown_agent_is_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agents/missing")
            .with_status(404)
            .with_body("agent not found")
            .create_async()
            .await;
        let err = client(&server).get_agent("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
        assert!(err.to_string().contains("agent not found"));
    }
}
