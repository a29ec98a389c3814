use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{AuthScheme, ClientConfig, RouteStyle};
use crate::types::{
    Action, ActionFilter, ActionRequest, Check, Decision, Evidence, Policy, Verification,
};
use crate::{ApaaiError, Result};

const USER_AGENT: &str = concat!("apaai-rs/", env!("CARGO_PKG_VERSION"));

// ─── AccountabilityLayer ──────────────────────────────────────────────────

/// HTTP client for the accountability layer.
///
/// Cheap to clone; clones share one connection pool. Every request carries
/// `content-type: application/json`, the configured extra headers and, when
/// an API key is set, the auth header selected by [`AuthScheme`].
///
/// ```rust,ignore
/// use apaai_client::{AccountabilityLayer, ActionRequest, Actor, ClientConfig};
///
/// let apaai = AccountabilityLayer::new(&ClientConfig::new("http://localhost:8787"))?;
/// let decision = apaai
///     .propose(ActionRequest::new("send_email", Actor::agent("mail-bot")))
///     .await?;
/// println!("{} {}", decision.action_id, decision.status);
/// ```
#[derive(Debug, Clone)]
pub struct AccountabilityLayer {
    http: reqwest::Client,
    base: Url,
    routes: RouteStyle,
}

impl AccountabilityLayer {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base = Url::parse(config.base_url())
            .map_err(|_| ApaaiError::InvalidEndpoint(config.endpoint.clone()))?;
        if base.cannot_be_a_base() {
            return Err(ApaaiError::InvalidEndpoint(config.endpoint.clone()));
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers(config)?);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApaaiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            routes: config.approval_routes,
        })
    }

    /// Client built from `~/.apaai/config.yaml` (if any) and the
    /// `APAAI_ENDPOINT` / `APAAI_KEY` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&ClientConfig::resolve(None)?)
    }

    pub fn endpoint(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    // ── Actions ──────────────────────────────────────────────────────────

    /// Create an action; the service answers with its decision.
    pub async fn create_action(&self, action: &Action) -> Result<Decision> {
        tracing::debug!(action_id = %action.id, action_type = %action.action_type, "creating action");
        self.send(Method::POST, &["actions"], action).await
    }

    /// Build an [`Action`] from `request` (filling id/timestamp) and create it.
    pub async fn propose(&self, request: ActionRequest) -> Result<Decision> {
        self.create_action(&request.into_action()).await
    }

    pub async fn get_action(&self, action_id: &str) -> Result<Action> {
        self.get(&["actions", action_id], &[]).await
    }

    pub async fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<Action>> {
        self.get(&["actions"], &filter.query_pairs()).await
    }

    // ── Evidence ─────────────────────────────────────────────────────────

    pub async fn submit_evidence(&self, evidence: &Evidence) -> Result<Verification> {
        tracing::debug!(action_id = %evidence.action_id, checks = evidence.checks.len(), "submitting evidence");
        self.send(Method::POST, &["evidence"], evidence).await
    }

    /// Shorthand for [`submit_evidence`](Self::submit_evidence) without a timestamp.
    pub async fn evidence(&self, action_id: &str, checks: Vec<Check>) -> Result<Verification> {
        self.submit_evidence(&Evidence {
            action_id: action_id.to_string(),
            checks,
            timestamp: None,
        })
        .await
    }

    pub async fn get_evidence(&self, action_id: &str) -> Result<Evidence> {
        self.get(&["evidence", action_id], &[]).await
    }

    // ── Policy ───────────────────────────────────────────────────────────

    /// Raw policy, optionally scoped server-side by `actionType`.
    pub async fn get_policy(&self, action_type: Option<&str>) -> Result<Policy> {
        let query: Vec<(&str, String)> = action_type
            .map(|t| vec![("actionType", t.to_string())])
            .unwrap_or_default();
        self.get(&["policy"], &query).await
    }

    /// Policy for `action_type` with client-side rule filtering; see
    /// [`Policy::scoped_to`].
    pub async fn policy(&self, action_type: Option<&str>) -> Result<Policy> {
        let policy = self.get_policy(action_type).await?;
        Ok(match action_type {
            Some(t) => policy.scoped_to(t),
            None => policy,
        })
    }

    pub async fn set_policy(&self, policy: &Policy) -> Result<Policy> {
        self.send(Method::POST, &["policy"], policy).await
    }

    // ── Human in the loop ────────────────────────────────────────────────

    pub async fn approve_action(
        &self,
        action_id: &str,
        approver: Option<&str>,
    ) -> Result<Verification> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            approver: Option<&'a str>,
        }
        let path = self.review_path(action_id, "approve");
        self.send(Method::POST, &path, &Body { approver }).await
    }

    pub async fn reject_action(&self, action_id: &str, reason: Option<&str>) -> Result<Verification> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            reason: Option<&'a str>,
        }
        let path = self.review_path(action_id, "reject");
        self.send(Method::POST, &path, &Body { reason }).await
    }

    fn review_path<'a>(&self, action_id: &'a str, verb: &'a str) -> Vec<&'a str> {
        match self.routes {
            RouteStyle::Legacy => vec![verb, action_id],
            RouteStyle::Nested => vec!["actions", action_id, verb],
        }
    }

    // ── Transport ────────────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(segments, query)?;
        self.execute(Method::GET, url, None).await
    }

    pub(crate) async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let url = self.url(segments, &[])?;
        let bytes = serde_json::to_vec(body)?;
        self.execute(method, url, Some(bytes)).await
    }

    pub(crate) async fn delete(&self, segments: &[&str]) -> Result<()> {
        let url = self.url(segments, &[])?;
        let _: serde_json::Value = self.execute(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Append percent-encoded `segments` and `query` to the base URL.
    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApaaiError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        let path = display_path(&url);
        tracing::debug!(method = %method, path = %path, "apaai request");

        let mut req = self.http.request(method.clone(), url);
        if let Some(body) = body {
            req = req.body(body);
        }
        let res = req.send().await.map_err(|source| ApaaiError::Transport {
            method: method.to_string(),
            path: path.clone(),
            source,
        })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::debug!(method = %method, path = %path, status = %status, "apaai request failed");
            return Err(ApaaiError::Http {
                method: method.to_string(),
                path,
                status,
                body,
            });
        }

        let bytes = res.bytes().await.map_err(|source| ApaaiError::Transport {
            method: method.to_string(),
            path: path.clone(),
            source,
        })?;
        decode_body(status, &bytes).map_err(|source| ApaaiError::Decode {
            method: method.to_string(),
            path,
            source,
        })
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────

fn default_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (name, value) in &config.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ApaaiError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ApaaiError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        headers.insert(header_name, header_value);
    }

    if let Some(key) = &config.api_key {
        let (name, raw) = match config.auth {
            AuthScheme::ApiKeyHeader => (HeaderName::from_static("x-api-key"), key.clone()),
            AuthScheme::Bearer => (AUTHORIZATION, format!("Bearer {key}")),
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|e| ApaaiError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }

    Ok(headers)
}

/// Path plus query, as shown in error messages.
fn display_path(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

/// Decode a successful response body.
///
/// 204 and empty bodies decode as JSON `null`, or as `{}` for types that
/// reject `null` but default every field (e.g. [`Verification`]).
fn decode_body<T: DeserializeOwned>(status: StatusCode, bytes: &[u8]) -> serde_json::Result<T> {
    if status == StatusCode::NO_CONTENT || bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_value(serde_json::Value::Null)
            .or_else(|_| serde_json::from_value(serde_json::json!({})));
    }
    serde_json::from_slice(bytes)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionStatus, Actor, PolicyRule, RuleMatch};
    use mockito::Matcher;
    use serde_json::json;

    fn client(server: &mockito::Server) -> AccountabilityLayer {
        AccountabilityLayer::new(&ClientConfig::new(server.url())).unwrap()
    }

    #[test]
    fn decode_204_as_unit_and_defaults() {
        let _: () = decode_body(StatusCode::NO_CONTENT, b"").unwrap();
        let v: Verification = decode_body(StatusCode::NO_CONTENT, b"").unwrap();
        assert!(!v.verified);
        let opt: Option<Action> = decode_body(StatusCode::OK, b"  ").unwrap();
        assert!(opt.is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let err = AccountabilityLayer::new(&ClientConfig::new("localhost 8787")).unwrap_err();
        assert!(matches!(err, ApaaiError::InvalidEndpoint(_)));
        let err = AccountabilityLayer::new(&ClientConfig::new("mailto:ops@example.com")).unwrap_err();
        assert!(matches!(err, ApaaiError::InvalidEndpoint(_)));
    }

    #[test]
    fn invalid_extra_header_is_rejected() {
        let cfg = ClientConfig::default().with_header("bad header", "x");
        let err = AccountabilityLayer::new(&cfg).unwrap_err();
        assert!(matches!(err, ApaaiError::InvalidHeader { .. }));
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let c = AccountabilityLayer::new(&ClientConfig::new("http://localhost:8787/")).unwrap();
        assert_eq!(c.endpoint(), "http://localhost:8787");
    }

    #[tokio::test]
    async fn create_action_posts_json_and_returns_decision() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/actions")
            .match_header("content-type", "application/json")
            .match_header("user-agent", Matcher::Regex("^apaai-rs/".into()))
            .match_body(Matcher::PartialJson(json!({
                "id": "a_1",
                "type": "send_email",
                "actor": {"kind": "agent", "name": "bot"},
                "target": "mailto:sarah@acme.com",
                "params": {"subject": "Pricing"}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"actionId":"a_1","status":"requires_approval","checks":["reviewer_approval"]}"#)
            .create_async()
            .await;

        let decision = client(&server)
            .propose(
                ActionRequest::new("send_email", Actor::agent("bot"))
                    .with_id("a_1")
                    .with_target("mailto:sarah@acme.com")
                    .with_param("subject", "Pricing"),
            )
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(decision.action_id, "a_1");
        assert!(decision.requires_approval());
        assert_eq!(decision.checks, Some(vec!["reviewer_approval".to_string()]));
    }

    #[tokio::test]
    async fn api_key_sent_as_x_api_key_by_default() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/actions/a_1")
            .match_header("x-api-key", "secret")
            .match_header("authorization", Matcher::Missing)
            .with_body(r#"{"id":"a_1","timestamp":"t","type":"x","actor":{"kind":"system","name":"cron"},"status":"approved"}"#)
            .create_async()
            .await;

        let cfg = ClientConfig::new(server.url()).with_api_key("secret");
        let action = AccountabilityLayer::new(&cfg)
            .unwrap()
            .get_action("a_1")
            .await
            .unwrap();

        m.assert_async().await;
        assert_eq!(action.status, Some(ActionStatus::Approved));
    }

    #[tokio::test]
    async fn bearer_scheme_and_extra_headers() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/policy")
            .match_header("authorization", "Bearer secret")
            .match_header("x-tenant", "acme")
            .with_body(r#"{"rules":[]}"#)
            .create_async()
            .await;

        let mut cfg = ClientConfig::new(server.url())
            .with_api_key("secret")
            .with_header("x-tenant", "acme");
        cfg.auth = AuthScheme::Bearer;
        let policy = AccountabilityLayer::new(&cfg)
            .unwrap()
            .get_policy(None)
            .await
            .unwrap();

        m.assert_async().await;
        assert!(policy.rules.is_empty());
    }

    #[tokio::test]
    async fn non_2xx_error_includes_method_path_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/evidence")
            .with_status(422)
            .with_body("checks must not be empty")
            .create_async()
            .await;

        let err = client(&server).evidence("a_1", vec![]).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("POST"), "{msg}");
        assert!(msg.contains("/evidence"), "{msg}");
        assert!(msg.contains("422"), "{msg}");
        assert!(msg.contains("checks must not be empty"), "{msg}");
        assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[tokio::test]
    async fn no_content_is_empty_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/approve/a_1")
            .with_status(204)
            .create_async()
            .await;

        let v = client(&server).approve_action("a_1", None).await.unwrap();
        assert!(!v.verified);
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/actions/a_1")
            .with_body("<html>")
            .create_async()
            .await;

        let err = client(&server).get_action("a_1").await.unwrap_err();
        assert!(matches!(err, ApaaiError::Decode { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let c = AccountabilityLayer::new(&ClientConfig::new("http://127.0.0.1:1")).unwrap();
        let err = c.get_policy(None).await.unwrap_err();
        assert!(matches!(err, ApaaiError::Transport { .. }));
    }

    #[tokio::test]
    async fn action_ids_are_percent_encoded() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/evidence/a%2F1%20x")
            .with_body(r#"{"actionId":"a/1 x","checks":[{"name":"ok","pass":true}]}"#)
            .create_async()
            .await;

        let ev = client(&server).get_evidence("a/1 x").await.unwrap();
        m.assert_async().await;
        assert_eq!(ev.checks, vec![Check::passed("ok")]);
    }

    #[tokio::test]
    async fn approve_and_reject_bodies() {
        let mut server = mockito::Server::new_async().await;
        let approve = server
            .mock("POST", "/approve/a_1")
            .match_body(Matcher::Json(json!({"approver": "sarah"})))
            .with_body(r#"{"verified":true}"#)
            .create_async()
            .await;
        let reject = server
            .mock("POST", "/reject/a_2")
            .match_body(Matcher::Json(json!({})))
            .with_body(r#"{"verified":true}"#)
            .create_async()
            .await;

        let c = client(&server);
        assert!(c.approve_action("a_1", Some("sarah")).await.unwrap().verified);
        assert!(c.reject_action("a_2", None).await.unwrap().verified);
        approve.assert_async().await;
        reject.assert_async().await;
    }

    #[tokio::test]
    async fn nested_review_routes() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/actions/a_1/reject")
            .match_body(Matcher::Json(json!({"reason": "too risky"})))
            .with_body(r#"{"verified":true}"#)
            .create_async()
            .await;

        let mut cfg = ClientConfig::new(server.url());
        cfg.approval_routes = RouteStyle::Nested;
        let c = AccountabilityLayer::new(&cfg).unwrap();
        c.reject_action("a_1", Some("too risky")).await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn list_actions_sends_only_set_filters() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", Matcher::Regex("^/actions".into()))
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("status".into(), "requires_approval".into()),
                Matcher::UrlEncoded("limit".into(), "10".into()),
            ]))
            .with_body("[]")
            .create_async()
            .await;

        let filter = ActionFilter {
            status: Some(ActionStatus::RequiresApproval),
            limit: Some(10),
            ..Default::default()
        };
        let actions = client(&server).list_actions(&filter).await.unwrap();
        m.assert_async().await;
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn policy_is_scoped_client_side() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", Matcher::Regex("^/policy".into()))
            .match_query(Matcher::UrlEncoded("actionType".into(), "send_email".into()))
            .with_body(
                json!({"rules": [
                    {"when": {"actionType": "send_email"}, "require": ["reviewer_approval"], "mode": "enforce"},
                    {"when": {"actionType": "delete_repo"}, "require": ["cto_approval"], "mode": "enforce"}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let policy = client(&server).policy(Some("send_email")).await.unwrap();
        assert_eq!(policy.rules.len(), 1);
        assert_eq!(policy.rules[0].require, Some(vec!["reviewer_approval".into()]));
    }

    #[tokio::test]
    async fn set_policy_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({"rules": [{"when": {"action": "deploy"}, "require": ["qa"]}]});
        let m = server
            .mock("POST", "/policy")
            .match_body(Matcher::Json(body.clone()))
            .with_body(body.to_string())
            .create_async()
            .await;

        let policy = Policy {
            rules: vec![PolicyRule {
                when: Some(RuleMatch {
                    action: Some("deploy".into()),
                    action_type: None,
                }),
                require: Some(vec!["qa".into()]),
                mode: None,
            }],
        };
        let saved = client(&server).set_policy(&policy).await.unwrap();
        m.assert_async().await;
        assert_eq!(saved, policy);
    }
}
