//! Periodic dispatch: campaign cycles every interval, rollover once per UTC day

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use outreach_common::types::Channel;
use outreach_core::{CampaignManager, Job, JobQueue};
use outreach_storage::models::{AccountStatus, CampaignStatus};
use outreach_storage::Repositories;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

pub struct Dispatcher {
    repos: Repositories,
    queue: Arc<dyn JobQueue>,
    manager: Arc<CampaignManager>,
    warmup_enabled: bool,
}

impl Dispatcher {
    pub fn new(
        repos: Repositories,
        queue: Arc<dyn JobQueue>,
        manager: Arc<CampaignManager>,
        warmup_enabled: bool,
    ) -> Self {
        Self {
            repos,
            queue,
            manager,
            warmup_enabled,
        }
    }

    /// Complete finished campaigns and enqueue a cycle for the rest.
    /// Returns the number of jobs enqueued.
    pub async fn dispatch_cycles(&self, now: DateTime<Utc>) -> Result<usize> {
        let campaigns = self.repos.campaigns.list_by_status(CampaignStatus::Active).await?;
        let mut enqueued = 0;

        for campaign in campaigns {
            match self.manager.check_completion(campaign.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Completion check failed: {}", e);
                    continue;
                }
            }
            if self
                .queue
                .enqueue(Job::sequence_advance(campaign.id), now)
                .await?
                .is_some()
            {
                enqueued += 1;
            } else {
                debug!(campaign_id = %campaign.id, "Cycle already queued");
            }
        }
        Ok(enqueued)
    }

    /// Enqueue the day's warmup run for every warming email account not yet warmed today
    pub async fn dispatch_warmup(&self, now: DateTime<Utc>) -> Result<usize> {
        if !self.warmup_enabled {
            return Ok(0);
        }
        let today = now.date_naive();
        let accounts = self.repos.accounts.list_by_status(AccountStatus::Warming).await?;
        let mut enqueued = 0;
        for account in accounts
            .iter()
            .filter(|a| a.channel_enum() == Some(Channel::Email) && !a.warmed_on(today))
        {
            if self.queue.enqueue(Job::warmup(account.id), now).await?.is_some() {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }

    /// New UTC day: reset daily counters, then start warmup
    pub async fn rollover(&self, now: DateTime<Utc>) -> Result<()> {
        let reset = self.repos.accounts.reset_sent_today().await?;
        let warmups = self.dispatch_warmup(now).await?;
        info!(day = %now.date_naive(), reset, warmups, "Daily rollover");
        Ok(())
    }

    /// Run until the task is aborted
    pub async fn run(self, cycle_interval: Duration) {
        let mut ticker = interval(cycle_interval);
        let mut today: NaiveDate = Utc::now().date_naive();

        // Counters are not reset on startup; the process may restart mid-day
        if let Err(e) = self.dispatch_warmup(Utc::now()).await {
            error!("Warmup dispatch failed: {}", e);
        }

        loop {
            ticker.tick().await;
            let now = Utc::now();

            if now.date_naive() != today {
                today = now.date_naive();
                if let Err(e) = self.rollover(now).await {
                    error!("Daily rollover failed: {}", e);
                }
            }

            match self.dispatch_cycles(now).await {
                Ok(0) => {}
                Ok(n) => debug!(campaigns = n, "Campaign cycles enqueued"),
                Err(e) => error!("Cycle dispatch failed: {}", e),
            }
        }
    }
}
