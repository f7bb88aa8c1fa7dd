//! Webhook ingestion.
//!
//! External platforms deliver `{topic, payload}` events; the handler
//! routes known topics through the same map -> conflict-check ->
//! resolve -> write pipeline as a single-record sync. Signature
//! verification is owned by the transport layer, not here.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use merx_connector::ExternalRecord;

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{RecordDisposition, SyncOrchestrator};

/// A delivered webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Topic, e.g. `"inventory/update"` or `"products/create"`.
    pub topic: String,
    /// Raw event payload. Must carry the external id under `"id"`.
    pub payload: serde_json::Value,
}

/// What the handler did with an event.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The event went through the pipeline.
    Applied(RecordDisposition),
    /// The topic is not one we handle; accepted and dropped.
    Ignored,
}

/// Routes webhook events into an orchestrator.
pub struct WebhookHandler {
    orchestrator: Arc<SyncOrchestrator>,
}

impl WebhookHandler {
    /// Create a handler over the given orchestrator.
    #[must_use]
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Handle one event.
    ///
    /// Unknown topics are accepted and ignored so future event types
    /// never break ingestion. A known topic with a malformed payload
    /// is an error.
    #[instrument(skip(self, event), fields(topic = %event.topic))]
    pub async fn handle(&self, org_id: Uuid, event: &WebhookEvent) -> SyncResult<WebhookOutcome> {
        // Topic prefix names the entity kind: "inventory/update",
        // "products/create", ...
        let prefix = event.topic.split('/').next().unwrap_or_default();
        let entity = match prefix.parse() {
            Ok(entity) => entity,
            Err(_) => {
                debug!(topic = %event.topic, "Ignoring webhook with unknown topic");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let external_id = event
            .payload
            .get("id")
            .and_then(|v| {
                v.as_str()
                    .map(ToString::to_string)
                    .or_else(|| v.as_i64().map(|n| n.to_string()))
            })
            .ok_or_else(|| {
                SyncError::invalid_webhook(format!(
                    "payload for topic '{}' carries no external id",
                    event.topic
                ))
            })?;

        let record = ExternalRecord::new(external_id, entity, event.payload.clone());
        let disposition = self
            .orchestrator
            .apply_external_record(org_id, &record)
            .await?;
        Ok(WebhookOutcome::Applied(disposition))
    }
}
