//! Applies tracking events to messages, contacts, enrollments and counters

use super::token::TokenSigner;
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use outreach_common::Result;
use outreach_storage::models::{
    CampaignCounter, ContactStatus, EngagementCounter, Message, StepCounter, WarmupLogDelta,
};
use outreach_storage::repository::Repositories;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Bounce classification reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceKind {
    #[default]
    Hard,
    Soft,
    Complaint,
}

/// `POST /bounce` body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BounceEvent {
    /// Tracking token or provider message id
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: BounceKind,
}

/// Idempotent ingestion of tracking events.
///
/// Every method returns whether the event was attributed to a known message or contact.
#[derive(Clone)]
pub struct TrackingIngester {
    repos: Repositories,
    signer: TokenSigner,
    metrics: EngineMetrics,
}

impl TrackingIngester {
    pub fn new(repos: Repositories, signer: TokenSigner, metrics: EngineMetrics) -> Self {
        Self {
            repos,
            signer,
            metrics,
        }
    }

    fn authentic(&self, token: &str) -> bool {
        if self.signer.verify(token).is_some() {
            return true;
        }
        debug!(token, "Ignoring tracking event with invalid token");
        self.metrics.record_tracking_event("invalid");
        false
    }

    /// Pixel hit. Aggregates move on the first open only.
    pub async fn record_open(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.authentic(token) {
            return Ok(false);
        }
        let Some(record) = self.repos.messages.record_open(token, at).await? else {
            return Ok(false);
        };
        self.metrics.record_tracking_event("open");

        if record.first_open {
            let message = &record.message;
            if let Some(campaign_id) = message.campaign_id {
                self.repos
                    .campaigns
                    .increment_counter(campaign_id, CampaignCounter::Opened)
                    .await?;
            }
            if let Some(step_id) = message.step_id {
                self.repos
                    .steps
                    .increment_counter(step_id, StepCounter::Opened)
                    .await?;
            }
            if let Some(contact_id) = message.contact_id {
                self.repos
                    .contacts
                    .increment_engagement(contact_id, EngagementCounter::Opens)
                    .await?;
            }
            debug!(message_id = %message.id, "First open recorded");
        }
        Ok(true)
    }

    /// Link click. The step counter moves on the first click only.
    pub async fn record_click(&self, token: &str, url: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.authentic(token) {
            return Ok(false);
        }
        let Some(record) = self.repos.messages.record_click(token, url, at).await? else {
            return Ok(false);
        };
        self.metrics.record_tracking_event("click");

        if let Some(contact_id) = record.message.contact_id {
            self.repos
                .contacts
                .increment_engagement(contact_id, EngagementCounter::Clicks)
                .await?;
        }
        if record.first_click {
            if let Some(step_id) = record.message.step_id {
                self.repos
                    .steps
                    .increment_counter(step_id, StepCounter::Clicked)
                    .await?;
            }
        }
        Ok(true)
    }

    /// Unsubscribe link. Stops the contact in every campaign.
    pub async fn record_unsubscribe(&self, token: &str) -> Result<bool> {
        if !self.authentic(token) {
            return Ok(false);
        }
        let Some(message) = self.repos.messages.get_by_tracking_id(token).await? else {
            return Ok(false);
        };
        self.metrics.record_tracking_event("unsubscribe");

        let Some(contact_id) = message.contact_id else {
            return Ok(true);
        };
        self.terminate_contact(contact_id, ContactStatus::Unsubscribed)
            .await?;
        Ok(true)
    }

    /// Provider bounce or complaint feedback
    pub async fn record_bounce(&self, event: &BounceEvent, at: DateTime<Utc>) -> Result<bool> {
        let message = match event.message_id.as_deref() {
            Some(id) => self.resolve_message(id).await?,
            None => None,
        };
        self.metrics.record_tracking_event(match event.kind {
            BounceKind::Hard => "bounce",
            BounceKind::Soft => "soft_bounce",
            BounceKind::Complaint => "complaint",
        });

        let terminal = match event.kind {
            BounceKind::Hard => Some(ContactStatus::Bounced),
            BounceKind::Complaint => Some(ContactStatus::Complained),
            BounceKind::Soft => None,
        };

        if let Some(message) = message {
            let record = self.repos.messages.record_bounce(message.id, at).await?;
            let first_time = record.as_ref().map_or(false, |r| r.first_time);

            if let Some(status) = terminal {
                if let Some(contact_id) = message.contact_id {
                    self.terminate_contact(contact_id, status).await?;
                }
                if let (true, Some(account_id)) = (first_time, message.account_id) {
                    let delta = match status {
                        ContactStatus::Complained => WarmupLogDelta::spam_report(),
                        _ => WarmupLogDelta::bounce(),
                    };
                    self.repos
                        .warmup_logs
                        .upsert_increment(account_id, at.date_naive(), delta)
                        .await?;
                }
            }

            info!(
                message_id = %message.id,
                kind = ?event.kind,
                reason = event.reason.as_deref().unwrap_or(""),
                "Bounce recorded"
            );
            return Ok(true);
        }

        // No message: fall back to the address
        let Some(email) = event.email.as_deref() else {
            return Ok(false);
        };
        let contacts = self.repos.contacts.find_by_email(email).await?;
        if contacts.is_empty() {
            return Ok(false);
        }
        if let Some(status) = terminal {
            for contact in &contacts {
                self.terminate_contact(contact.id, status).await?;
            }
        }
        info!(email, kind = ?event.kind, contacts = contacts.len(), "Bounce recorded by address");
        Ok(true)
    }

    /// Reply detected for a message. Ends that enrollment's sequence.
    pub async fn record_reply(&self, token: &str, at: DateTime<Utc>) -> Result<bool> {
        if !self.authentic(token) {
            return Ok(false);
        }
        let Some(record) = self.repos.messages.record_reply(token, at).await? else {
            return Ok(false);
        };
        self.metrics.record_tracking_event("reply");
        let message = &record.message;

        if record.first_time {
            if let Some(campaign_id) = message.campaign_id {
                self.repos
                    .campaigns
                    .increment_counter(campaign_id, CampaignCounter::Replied)
                    .await?;
            }
            if let Some(step_id) = message.step_id {
                self.repos
                    .steps
                    .increment_counter(step_id, StepCounter::Replied)
                    .await?;
            }
            if let Some(account_id) = message.account_id {
                self.repos
                    .warmup_logs
                    .upsert_increment(account_id, at.date_naive(), WarmupLogDelta::reply())
                    .await?;
            }
        }

        if let (Some(campaign_id), Some(contact_id)) = (message.campaign_id, message.contact_id) {
            if let Some(enrollment) = self
                .repos
                .enrollments
                .get_by_pair(campaign_id, contact_id)
                .await?
            {
                self.repos.enrollments.deactivate(enrollment.id).await?;
            }
        }
        Ok(true)
    }

    async fn resolve_message(&self, id: &str) -> Result<Option<Message>> {
        if self.signer.verify(id).is_some() {
            if let Some(message) = self.repos.messages.get_by_tracking_id(id).await? {
                return Ok(Some(message));
            }
        }
        self.repos.messages.get_by_provider_id(id).await
    }

    /// Terminal status plus deactivation across all campaigns
    async fn terminate_contact(&self, contact_id: uuid::Uuid, status: ContactStatus) -> Result<()> {
        if self.repos.contacts.mark_terminal(contact_id, status).await? {
            info!(contact_id = %contact_id, status = %status, "Contact marked terminal");
        }
        let deactivated = self
            .repos
            .enrollments
            .deactivate_for_contact(contact_id)
            .await?;
        if deactivated > 0 {
            info!(contact_id = %contact_id, deactivated, "Deactivated contact enrollments");
        }
        Ok(())
    }
}
