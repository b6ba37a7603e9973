// flowgate-providers/src/registry.rs
// ============================================================================
// Module: Default Handler Registry
// Description: Builds the process-wide handler registry (spec §4.4.3 table).
// Purpose: Wire the built-in node handlers into a flowgate_core::HandlerRegistry.
// Dependencies: flowgate-core
// ============================================================================

//! ## Overview
//! `loop`, `subflow`, and `internalEvent` have no entry here and never will:
//! they are not variants of `flowgate_core::flow::NodeKind`, so a flow
//! referencing them is rejected at deserialization, before a registry lookup
//! is ever attempted (REDESIGN FLAG: validated at flow-creation, not
//! execution).

use std::collections::BTreeSet;
use std::sync::Arc;

use flowgate_core::engine::HandlerRegistry;
use flowgate_core::errors::FlowgateError;
use flowgate_core::interfaces::AuditSink;

use crate::approval::ApprovalHandler;
use crate::audit::AuditHandler;
use crate::condition::ConditionHandler;
use crate::delay::DelayHandler;
use crate::transform::TransformHandler;
use crate::webhook::WebhookHandler;

/// Builds the default handler registry for `condition`, `webhook`,
/// `approval`, `audit`, `transform`, and `delay` nodes.
///
/// # Errors
///
/// Returns [`FlowgateError`] if the webhook handler's HTTP client cannot be
/// constructed.
pub fn build_default_registry(
    audit_sink: Arc<dyn AuditSink>,
    allow_http_webhooks: bool,
    webhook_allowed_hosts: Option<BTreeSet<String>>,
) -> Result<HandlerRegistry, FlowgateError> {
    let mut registry = HandlerRegistry::new();
    registry.register("condition", Arc::new(ConditionHandler));
    registry.register("webhook", Arc::new(WebhookHandler::new(allow_http_webhooks, webhook_allowed_hosts)?));
    registry.register("approval", Arc::new(ApprovalHandler));
    registry.register("audit", Arc::new(AuditHandler::new(audit_sink)));
    registry.register("transform", Arc::new(TransformHandler));
    registry.register("delay", Arc::new(DelayHandler));
    Ok(registry)
}
