use std::sync::Arc;

use chrono::Duration;
use reqwest::Client;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::database::OutboxRepository;
use crate::error::Result;
use crate::models::stage_event::{DeliveryResult, DeliveryStatus, StageEvent, StageEventKind};
use crate::utils::time::Clock;

pub const MAX_DELIVERY_ATTEMPTS: i32 = 5;

/// How long a claimed event may stay delivering before another worker takes it over.
pub const DELIVERY_LEASE_SECONDS: i64 = 300;

/// Seconds to wait before retrying after `attempts` failed deliveries.
pub fn retry_backoff_seconds(attempts: i32) -> i64 {
    let exponent = (attempts - 1).clamp(0, 16) as u32;
    (30_i64 * 2_i64.pow(exponent)).min(3600)
}

/// Records stage-transition events and pushes them to the configured webhook.
#[derive(Clone)]
pub struct NotificationService {
    outbox: Arc<dyn OutboxRepository>,
    clock: Arc<dyn Clock>,
    client: Client,
    target_url: Option<String>,
    webhook_secret: String,
}

impl NotificationService {
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        clock: Arc<dyn Clock>,
        target_url: Option<String>,
        webhook_secret: String,
    ) -> Self {
        Self {
            outbox,
            clock,
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            target_url,
            webhook_secret,
        }
    }

    pub async fn record(
        &self,
        application_id: Uuid,
        kind: StageEventKind,
        payload: JsonValue,
    ) -> Result<StageEvent> {
        let status = if self.target_url.is_some() {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::Skipped
        };
        let now = self.clock.now();
        let event = StageEvent {
            id: Uuid::new_v4(),
            application_id,
            kind,
            payload,
            status,
            attempts: 0,
            next_retry_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.outbox.enqueue(&event).await?;
        Ok(event)
    }

    pub async fn history(&self, application_id: Uuid) -> Result<Vec<StageEvent>> {
        self.outbox.history(application_id).await
    }

    async fn deliver(&self, url: &str, event: &StageEvent) -> std::result::Result<(), String> {
        let res = self
            .client
            .post(url)
            .header("X-Webhook-Secret", &self.webhook_secret)
            .json(&event.payload)
            .send()
            .await;
        match res {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Err(format!("HTTP {}: {}", status, body))
            }
            Err(err) => Err(err.to_string()),
        }
    }

    /// Delivers at most one due event. Returns `false` when nothing was due.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(url) = self.target_url.as_deref() else {
            return Ok(false);
        };
        let now = self.clock.now();
        let stale_before = now - Duration::seconds(DELIVERY_LEASE_SECONDS);
        let Some(event) = self.outbox.claim_due(now, stale_before).await? else {
            return Ok(false);
        };

        let result = match self.deliver(url, &event).await {
            Ok(()) => DeliveryResult::Delivered,
            Err(error) => {
                let attempts = event.attempts + 1;
                tracing::warn!(
                    event_id = %event.id,
                    event = %event.kind,
                    attempts,
                    error = %error,
                    "stage event delivery failed"
                );
                if attempts >= MAX_DELIVERY_ATTEMPTS {
                    DeliveryResult::GaveUp { error }
                } else {
                    DeliveryResult::Retry {
                        error,
                        next_retry_at: now + Duration::seconds(retry_backoff_seconds(attempts)),
                    }
                }
            }
        };
        self.outbox.record_delivery(event.id, result, self.clock.now()).await?;
        Ok(true)
    }
}
