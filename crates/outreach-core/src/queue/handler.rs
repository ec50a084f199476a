//! Job dispatch onto the engine components

use super::{ChannelActionJob, Job, JobHandler, JobOutcome};
use crate::channels::{ChannelSender, SendRequest, SendTarget};
use crate::humanize::HumanDelay;
use crate::metrics::EngineMetrics;
use crate::sequence::SequenceScheduler;
use crate::warmup::WarmupEngine;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outreach_common::types::{AccountId, Channel};
use outreach_storage::models::{AccountStatus, CreateMessage, MessageStatus};
use outreach_storage::repository::Repositories;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Wait before retrying an action for an account that hit its daily limit
const LIMIT_RETRY: Duration = Duration::from_secs(3600);

/// Routes each job to the component that owns it
pub struct EngineJobHandler {
    scheduler: Arc<SequenceScheduler>,
    warmup: Arc<WarmupEngine>,
    channel: Arc<ChannelActionHandler>,
}

impl EngineJobHandler {
    pub fn new(
        scheduler: Arc<SequenceScheduler>,
        warmup: Arc<WarmupEngine>,
        channel: Arc<ChannelActionHandler>,
    ) -> Self {
        Self {
            scheduler,
            warmup,
            channel,
        }
    }
}

#[async_trait]
impl JobHandler for EngineJobHandler {
    async fn handle(&self, job: Job) -> Result<JobOutcome> {
        match job {
            Job::SequenceAdvance(job) => {
                let report = self.scheduler.run_cycle(job.campaign_id, Utc::now()).await?;
                if report.errors > 0 {
                    warn!(
                        campaign_id = %job.campaign_id,
                        errors = report.errors,
                        "Cycle finished with enrollment errors"
                    );
                }
                Ok(JobOutcome::Done)
            }
            Job::Warmup(job) => self.warmup.run(job, Utc::now()).await,
            Job::ChannelAction(job) => self.channel.run(job, Utc::now()).await,
        }
    }
}

/// Executes one-off driver actions with humanized spacing per account
pub struct ChannelActionHandler {
    repos: Repositories,
    sender: Arc<dyn ChannelSender>,
    pacing: HumanDelay,
    last_action: Mutex<HashMap<AccountId, DateTime<Utc>>>,
    metrics: EngineMetrics,
}

impl ChannelActionHandler {
    pub fn new(repos: Repositories, sender: Arc<dyn ChannelSender>, metrics: EngineMetrics) -> Self {
        Self {
            repos,
            sender,
            pacing: HumanDelay::seconds(45, 180),
            last_action: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn with_pacing(mut self, pacing: HumanDelay) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn run(&self, job: ChannelActionJob, now: DateTime<Utc>) -> Result<JobOutcome> {
        let account = self
            .repos
            .accounts
            .get(job.account_id)
            .await?
            .ok_or_else(|| anyhow!("Sending account {} not found", job.account_id))?;

        if !account.is_active || account.status_enum() == Some(AccountStatus::Blocked) {
            warn!(account_id = %account.id, status = %account.status, "Account unavailable, dropping action");
            return Ok(JobOutcome::Done);
        }
        if account.remaining_today() == 0 {
            debug!(account_id = %account.id, "Daily limit reached, retrying later");
            self.metrics.record_deferral("no_capacity");
            return Ok(JobOutcome::Reschedule {
                job: Job::ChannelAction(job),
                after: LIMIT_RETRY,
            });
        }

        {
            let mut last_action = self.last_action.lock().await;
            if let Some(last) = last_action.get(&account.id) {
                let elapsed = (now - *last).to_std().unwrap_or_default();
                if elapsed < self.pacing.min() {
                    return Ok(JobOutcome::Reschedule {
                        job: Job::ChannelAction(job),
                        after: self.pacing.sample(),
                    });
                }
            }
            last_action.insert(account.id, now);
        }

        let contact = match job.contact_id {
            Some(id) => self.repos.contacts.get(id).await?,
            None => None,
        };
        if let Some(contact) = contact.as_ref().filter(|c| !c.is_reachable()) {
            info!(contact_id = %contact.id, status = %contact.status, "Contact is terminal, dropping action");
            return Ok(JobOutcome::Done);
        }

        let target = match &contact {
            Some(contact) => SendTarget {
                profile_url: Some(job.target_url.clone()),
                ..SendTarget::from_contact(contact)
            },
            None => SendTarget {
                email: String::new(),
                name: None,
                profile_url: Some(job.target_url.clone()),
            },
        };
        let request = SendRequest {
            channel: Channel::Linkedin,
            action: job.action,
            account: account.clone(),
            target,
            subject: None,
            body: job.content.clone().unwrap_or_default(),
            html_body: None,
        };

        let outcome = self.sender.send(&request).await;
        if !outcome.success {
            self.metrics.record_send_failure("linkedin");
            bail!(
                "{} on {} failed: {}",
                job.action,
                job.target_url,
                outcome.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        if !self.repos.accounts.try_increment_sent_today(account.id).await? {
            warn!(account_id = %account.id, "Daily limit reached concurrently");
        }
        self.metrics.record_send("linkedin");
        self.repos
            .messages
            .create(CreateMessage {
                tracking_id: Uuid::now_v7().simple().to_string(),
                campaign_id: job.campaign_id,
                step_id: None,
                contact_id: job.contact_id,
                account_id: Some(account.id),
                channel: Channel::Linkedin,
                subject: None,
                provider_message_id: outcome.provider_message_id,
                status: MessageStatus::Sent,
                error: None,
                sent_at: Some(now),
            })
            .await?;

        info!(account_id = %account.id, action = %job.action, target = %job.target_url, "Channel action done");
        Ok(JobOutcome::Done)
    }
}
