//! # Webhook Batch Processor
//!
//! Drains the webhook event queue in batches: each claimed event is
//! classified into the ledger vocabulary, attributed to a profile, and
//! appended to the activity ledger. A failure on one event marks that row
//! failed and the batch keeps going.

use anyhow::Result;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::classify::{self, ClassifiedEvent};
use crate::identity::{IdentityOverrides, resolve_actor};
use crate::models::webhook_event;
use crate::repositories::{
    ActivityRepository, AppendOutcome, ProfileRepository, ResourceRepository,
    WebhookEventRepository,
};

/// Counts from one processor run, returned to the cron caller
#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessorRunSummary {
    /// Events claimed from the queue this run
    pub claimed: u64,
    /// Events that produced a new ledger row
    pub recorded: u64,
    /// Events whose dedupe key already existed in the ledger
    pub duplicates: u64,
    /// Events with no ledger mapping (unrecognized type, bot traffic)
    pub skipped: u64,
    /// Events that errored and were marked failed
    pub failed: u64,
    /// Events still pending after this run
    pub remaining: u64,
}

/// How a single claimed event was disposed of
enum EventOutcome {
    Recorded,
    Duplicate,
    Skipped,
}

/// Batch processor over the webhook event queue
pub struct WebhookProcessor {
    webhook_repo: Arc<WebhookEventRepository>,
    activity_repo: Arc<ActivityRepository>,
    profile_repo: Arc<ProfileRepository>,
    resource_repo: Arc<ResourceRepository>,
    overrides: Arc<IdentityOverrides>,
    batch_size: u64,
}

impl WebhookProcessor {
    /// Creates a new WebhookProcessor instance
    pub fn new(
        webhook_repo: Arc<WebhookEventRepository>,
        activity_repo: Arc<ActivityRepository>,
        profile_repo: Arc<ProfileRepository>,
        resource_repo: Arc<ResourceRepository>,
        overrides: Arc<IdentityOverrides>,
        batch_size: u64,
    ) -> Self {
        Self {
            webhook_repo,
            activity_repo,
            profile_repo,
            resource_repo,
            overrides,
            batch_size,
        }
    }

    /// Claim one batch from the queue and process every event in it.
    ///
    /// Concurrent runs are safe: the claim is atomic, so overlapping cron
    /// invocations partition the queue rather than double-processing.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<ProcessorRunSummary> {
        let mut summary = ProcessorRunSummary::default();

        let claimed = self.webhook_repo.claim_batch(self.batch_size).await?;
        summary.claimed = claimed.len() as u64;

        for event in claimed {
            let event_id = event.id;
            // A failed status write must not abort the batch; the row stays
            // in processing and the ledger append already deduped, so a
            // later requeue re-resolves to the same record.
            match self.process_event(&event).await {
                Ok(outcome) => {
                    match outcome {
                        EventOutcome::Recorded => summary.recorded += 1,
                        EventOutcome::Duplicate => summary.duplicates += 1,
                        EventOutcome::Skipped => summary.skipped += 1,
                    }
                    if let Err(e) = self.webhook_repo.mark_completed(event).await {
                        warn!(event_id = %event_id, error = ?e, "Failed to mark webhook event completed");
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(event_id = %event_id, error = ?e, "Webhook event processing failed");
                    if let Err(mark_err) = self.webhook_repo.mark_failed(event, &e.to_string()).await
                    {
                        warn!(event_id = %event_id, error = ?mark_err, "Failed to mark webhook event failed");
                    }
                }
            }
        }

        summary.remaining = self.webhook_repo.count_pending().await?;

        counter!("webhook_events_recorded_total").increment(summary.recorded);
        counter!("webhook_events_skipped_total").increment(summary.skipped);
        counter!("webhook_events_failed_total").increment(summary.failed);

        info!(
            claimed = summary.claimed,
            recorded = summary.recorded,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            failed = summary.failed,
            remaining = summary.remaining,
            "Webhook processor run completed"
        );

        Ok(summary)
    }

    /// Classify, attribute, and append a single claimed event
    async fn process_event(&self, event: &webhook_event::Model) -> Result<EventOutcome> {
        let classified = match event.provider.as_str() {
            "github" => classify::classify_github_event(&event.event_type, &event.payload),
            "slack" => classify::classify_slack_event(&event.event_type, &event.payload),
            other => {
                debug!(provider = %other, "No classifier for provider, skipping event");
                None
            }
        };

        let Some(classified) = classified else {
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Event has no ledger mapping, skipping"
            );
            return Ok(EventOutcome::Skipped);
        };

        let actor_id = self
            .attribute_actor(&event.org_id, &event.provider, &classified)
            .await?;

        let resource_id = match classified.resource_external_id.as_deref() {
            Some(external_id) => self
                .resource_repo
                .find_by_external_id(&event.org_id, external_id)
                .await?
                .map(|resource| resource.id),
            None => None,
        };

        let summary_line =
            classify::summarize(&classified.details, classified.actor_handle.as_deref());
        // Stable per queue row, so redelivered or re-claimed events no-op
        let dedupe_key = format!("{}:{}", event.provider, event.id);

        let outcome = self
            .activity_repo
            .append(
                event.org_id,
                actor_id,
                resource_id,
                summary_line,
                &classified.details,
                Some(dedupe_key),
            )
            .await?;

        Ok(match outcome {
            AppendOutcome::Inserted(_) => EventOutcome::Recorded,
            AppendOutcome::Duplicate => EventOutcome::Duplicate,
        })
    }

    /// Resolve the raw actor handle to a profile within the event's org
    async fn attribute_actor(
        &self,
        org_id: &Uuid,
        provider: &str,
        classified: &ClassifiedEvent,
    ) -> Result<Option<Uuid>> {
        let Some(raw_handle) = classified.actor_handle.as_deref() else {
            return Ok(None);
        };

        let profiles = self.profile_repo.find_with_platform_identities(org_id).await?;
        let verdict = resolve_actor(&profiles, &self.overrides, provider, raw_handle);

        if verdict.profile_id.is_none() {
            debug!(
                provider,
                handle = %verdict.canonical_handle,
                "No profile matched handle, recording anonymously"
            );
        }

        Ok(verdict.profile_id)
    }
}
