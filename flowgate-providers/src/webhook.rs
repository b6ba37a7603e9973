// flowgate-providers/src/webhook.rs
// ============================================================================
// Module: Webhook Node Handler
// Description: Outbound HTTP dispatch for webhook/action nodes.
// Purpose: Implement the `webhook` entry of the default handler registry
//          (spec §4.4.3). Fire-and-forget at this revision (spec §7):
//          failures fail the node but are not retried.
// Dependencies: flowgate-core, reqwest
// ============================================================================

//! ## Overview
//! Requests are bounded by a fixed timeout and enforce `https` unless
//! explicitly configured otherwise, mirroring the evidence HTTP provider's
//! scheme restriction even though webhook nodes have no evidence-trust lane
//! to preserve. Unlike the evidence provider (a blocking `reqwest::blocking`
//! client, synchronous by design), this handler runs inside an async `axum`/
//! `tokio` runtime, so it uses async `reqwest` instead.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use flowgate_core::errors::FlowgateError;
use flowgate_core::execution::HandlerOutcome;
use flowgate_core::flow::Node;
use flowgate_core::flow::NodeKind;
use flowgate_core::flow::WebhookConfig;
use flowgate_core::interfaces::HandlerContext;
use flowgate_core::interfaces::NodeHandler;
use serde_json::Value;
use serde_json::json;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler for `webhook` nodes.
pub struct WebhookHandler {
    client: reqwest::Client,
    allow_http: bool,
    allowed_hosts: Option<BTreeSet<String>>,
}

impl WebhookHandler {
    /// Builds a new webhook handler.
    ///
    /// # Errors
    ///
    /// Returns [`FlowgateError`] when the HTTP client cannot be constructed.
    pub fn new(allow_http: bool, allowed_hosts: Option<BTreeSet<String>>) -> Result<Self, FlowgateError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| FlowgateError::internal(format!("webhook client build failed: {err}")))?;
        Ok(Self { client, allow_http, allowed_hosts })
    }

    fn validate_url(&self, url: &reqwest::Url) -> Result<(), String> {
        match url.scheme() {
            "https" => {}
            "http" if self.allow_http => {}
            other => return Err(format!("unsupported webhook url scheme: {other}")),
        }
        if let Some(allowlist) = &self.allowed_hosts {
            let host = url.host_str().ok_or_else(|| "webhook url host required".to_string())?;
            if !allowlist.contains(host) {
                return Err(format!("webhook url host not allowed: {host}"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NodeHandler for WebhookHandler {
    async fn execute(&self, _ctx: &HandlerContext, node: &Node, input: Value) -> HandlerOutcome {
        let NodeKind::Webhook(config) = &node.kind else {
            return HandlerOutcome::Fail(FlowgateError::internal("webhook handler invoked on non-webhook node"));
        };
        match dispatch(self, config, &input).await {
            Ok(()) => HandlerOutcome::Continue(json!({ "status": "sent" })),
            Err(message) => HandlerOutcome::Fail(FlowgateError::dependency(message)),
        }
    }
}

async fn dispatch(handler: &WebhookHandler, config: &WebhookConfig, input: &Value) -> Result<(), String> {
    let url = reqwest::Url::parse(&config.url).map_err(|err| format!("invalid webhook url: {err}"))?;
    handler.validate_url(&url)?;

    let method = reqwest::Method::from_bytes(config.method.as_bytes())
        .map_err(|_| format!("invalid webhook method: {}", config.method))?;

    let body = resolve_body(&config.body, input);
    let mut request = handler.client.request(method, url);
    for (key, value) in &config.headers {
        request = request.header(key, value);
    }
    if !body.is_null() {
        request = request.json(&body);
    }

    let response = request.send().await.map_err(|err| format!("webhook request failed: {err}"))?;
    if !response.status().is_success() {
        return Err(format!("webhook returned status {}", response.status()));
    }
    Ok(())
}

/// Substitutes `input` into the configured body template. `Value::Null`
/// templates pass the execution input through unmodified; any other
/// template is sent as-is (field-level `{{...}}` interpolation is left to a
/// future revision — see the open item in `DESIGN.md`).
fn resolve_body(template: &Value, input: &Value) -> Value {
    if template.is_null() { input.clone() } else { template.clone() }
}
