//! In-memory implementation of every repository trait
//!
//! All tables live behind one lock, so each method is atomic the same way the
//! conditional SQL updates are.

use crate::models::*;
use crate::repository::{
    AccountRepository, CampaignRepository, ContactRepository, EnrollmentRepository,
    MessageRepository, StepRepository, WarmupLogRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use outreach_common::types::{
    AccountId, CampaignId, Channel, ContactId, EnrollmentId, MessageId, OrganizationId, StepId,
};
use outreach_common::{Error, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    campaigns: HashMap<CampaignId, Campaign>,
    steps: HashMap<StepId, CampaignStep>,
    contacts: HashMap<ContactId, Contact>,
    enrollments: HashMap<EnrollmentId, CampaignContact>,
    accounts: HashMap<AccountId, SendingAccount>,
    messages: HashMap<MessageId, Message>,
    warmup_logs: HashMap<(AccountId, NaiveDate), WarmupLog>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            name: input.name,
            channel: input.channel.to_string(),
            status: CampaignStatus::Draft.to_string(),
            timezone: input.schedule.timezone,
            sending_days: serde_json::to_value(&input.schedule.days)
                .map_err(|e| Error::Validation(e.to_string()))?,
            start_hour: input.schedule.start_hour as i32,
            end_hour: input.schedule.end_hour as i32,
            contacted_count: 0,
            opened_count: 0,
            replied_count: 0,
            meetings_count: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };
        self.tables
            .write()
            .await
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut campaigns: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| c.status_enum() == Some(status))
            .cloned()
            .collect();
        campaigns.sort_by_key(|c| (c.created_at, c.id));
        Ok(campaigns)
    }

    async fn transition_status(
        &self,
        id: CampaignId,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(campaign) = tables.campaigns.get_mut(&id) else {
            return Ok(false);
        };
        match campaign.status_enum() {
            Some(current) if from.contains(&current) => {}
            _ => return Ok(false),
        }

        let now = Utc::now();
        campaign.status = to.to_string();
        campaign.updated_at = now;
        match to {
            CampaignStatus::Active => {
                campaign.started_at.get_or_insert(now);
            }
            CampaignStatus::Completed => campaign.completed_at = Some(now),
            _ => {}
        }
        Ok(true)
    }

    async fn increment_counter(&self, id: CampaignId, counter: CampaignCounter) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(c) = tables.campaigns.get_mut(&id) {
            match counter {
                CampaignCounter::Contacted => c.contacted_count += 1,
                CampaignCounter::Opened => c.opened_count += 1,
                CampaignCounter::Replied => c.replied_count += 1,
                CampaignCounter::Meetings => c.meetings_count += 1,
            }
            c.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl StepRepository for MemoryStore {
    async fn create(&self, input: CreateCampaignStep) -> Result<CampaignStep> {
        let mut tables = self.tables.write().await;
        if tables
            .steps
            .values()
            .any(|s| s.campaign_id == input.campaign_id && s.step_number == input.step_number)
        {
            return Err(Error::Conflict(format!(
                "Step {} already exists",
                input.step_number
            )));
        }

        let step = CampaignStep {
            id: Uuid::now_v7(),
            campaign_id: input.campaign_id,
            step_number: input.step_number,
            channel: input.channel.to_string(),
            delay_days: input.delay_days,
            delay_hours: input.delay_hours,
            subject: input.subject,
            body: input.body,
            action: input.action.map(|a| a.to_string()),
            conditions: serde_json::to_value(&input.conditions)
                .map_err(|e| Error::Validation(e.to_string()))?,
            sent_count: 0,
            opened_count: 0,
            clicked_count: 0,
            replied_count: 0,
            created_at: Utc::now(),
        };
        tables.steps.insert(step.id, step.clone());
        Ok(step)
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<CampaignStep>> {
        let tables = self.tables.read().await;
        let mut steps: Vec<CampaignStep> = tables
            .steps
            .values()
            .filter(|s| s.campaign_id == campaign_id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.step_number);
        Ok(steps)
    }

    async fn increment_counter(&self, id: StepId, counter: StepCounter) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(s) = tables.steps.get_mut(&id) {
            match counter {
                StepCounter::Sent => s.sent_count += 1,
                StepCounter::Opened => s.opened_count += 1,
                StepCounter::Clicked => s.clicked_count += 1,
                StepCounter::Replied => s.replied_count += 1,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        let mut tables = self.tables.write().await;
        let email = input.email.trim().to_string();
        if tables.contacts.values().any(|c| {
            c.organization_id == input.organization_id && c.email.eq_ignore_ascii_case(&email)
        }) {
            return Err(Error::Conflict(format!("Contact {} already exists", email)));
        }

        let now = Utc::now();
        let contact = Contact {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            email,
            first_name: input.first_name,
            last_name: input.last_name,
            company: input.company,
            title: input.title,
            linkedin_url: input.linkedin_url,
            status: ContactStatus::Active.to_string(),
            total_opens: 0,
            total_clicks: 0,
            attributes: input.attributes.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        tables.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.tables.read().await.contacts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Vec<Contact>> {
        let email = email.trim();
        Ok(self
            .tables
            .read()
            .await
            .contacts
            .values()
            .filter(|c| c.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn mark_terminal(&self, id: ContactId, status: ContactStatus) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.contacts.get_mut(&id) {
            Some(c) if c.is_reachable() => {
                c.status = status.to_string();
                c.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_engagement(&self, id: ContactId, counter: EngagementCounter) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(c) = tables.contacts.get_mut(&id) {
            match counter {
                EngagementCounter::Opens => c.total_opens += 1,
                EngagementCounter::Clicks => c.total_clicks += 1,
            }
            c.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryStore {
    async fn create(&self, input: CreateCampaignContact) -> Result<CampaignContact> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .enrollments
            .values()
            .find(|e| e.campaign_id == input.campaign_id && e.contact_id == input.contact_id)
        {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let enrollment = CampaignContact {
            id: Uuid::now_v7(),
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            current_step: 0,
            next_action_at: Some(input.next_action_at),
            is_active: true,
            error_count: 0,
            last_error: None,
            first_contacted_at: None,
            last_contacted_at: None,
            variables: input.variables.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        tables.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn get(&self, id: EnrollmentId) -> Result<Option<CampaignContact>> {
        Ok(self.tables.read().await.enrollments.get(&id).cloned())
    }

    async fn get_by_pair(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Option<CampaignContact>> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .values()
            .find(|e| e.campaign_id == campaign_id && e.contact_id == contact_id)
            .cloned())
    }

    async fn list_due(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CampaignContact>> {
        let tables = self.tables.read().await;
        let mut due: Vec<CampaignContact> = tables
            .enrollments
            .values()
            .filter(|e| e.campaign_id == campaign_id && e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| (e.next_action_at, e.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn apply_transition(
        &self,
        id: EnrollmentId,
        expected_step: i32,
        transition: StepTransition,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.enrollments.get_mut(&id) {
            Some(e) if e.is_active && e.current_step == expected_step => {
                e.current_step = transition.current_step;
                e.next_action_at = transition.next_action_at;
                e.is_active = transition.is_active;
                e.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_contacted(&self, id: EnrollmentId, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let Some(e) = tables.enrollments.get_mut(&id) else {
            return Ok(false);
        };
        let first = e.first_contacted_at.is_none();
        e.first_contacted_at.get_or_insert(at);
        e.last_contacted_at = Some(at);
        e.error_count = 0;
        e.last_error = None;
        e.updated_at = Utc::now();
        Ok(first)
    }

    async fn record_error(&self, id: EnrollmentId, error: &str) -> Result<i32> {
        let mut tables = self.tables.write().await;
        let Some(e) = tables.enrollments.get_mut(&id) else {
            return Ok(0);
        };
        e.error_count += 1;
        e.last_error = Some(error.to_string());
        e.updated_at = Utc::now();
        Ok(e.error_count)
    }

    async fn deactivate(&self, id: EnrollmentId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.enrollments.get_mut(&id) {
            Some(e) if e.is_active => {
                e.is_active = false;
                e.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn deactivate_for_contact(&self, contact_id: ContactId) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for e in tables
            .enrollments
            .values_mut()
            .filter(|e| e.contact_id == contact_id && e.is_active)
        {
            e.is_active = false;
            e.updated_at = now;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_active(&self, campaign_id: CampaignId) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.campaign_id == campaign_id && e.is_active)
            .count() as i64)
    }

    async fn count_all(&self, campaign_id: CampaignId) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .values()
            .filter(|e| e.campaign_id == campaign_id)
            .count() as i64)
    }

    async fn delete(&self, campaign_id: CampaignId, contact_id: ContactId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.enrollments.len();
        tables
            .enrollments
            .retain(|_, e| !(e.campaign_id == campaign_id && e.contact_id == contact_id));
        Ok(tables.enrollments.len() < before)
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn create(&self, input: CreateSendingAccount) -> Result<SendingAccount> {
        let now = Utc::now();
        let account = SendingAccount {
            id: Uuid::now_v7(),
            organization_id: input.organization_id,
            channel: input.channel.to_string(),
            email: input.email,
            display_name: input.display_name,
            smtp_host: input.smtp_host,
            smtp_port: input.smtp_port,
            smtp_username: input.smtp_username,
            smtp_password: input.smtp_password,
            daily_limit: input.daily_limit,
            sent_today: 0,
            warmup_day: 0,
            last_warmup_on: None,
            status: input.status.to_string(),
            is_active: true,
            health_score: 100.0,
            delivery_rate: 0.0,
            bounce_rate: 0.0,
            reply_rate: 0.0,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(account)
    }

    async fn get(&self, id: AccountId) -> Result<Option<SendingAccount>> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn list_eligible(
        &self,
        organization_id: OrganizationId,
        channel: Channel,
    ) -> Result<Vec<SendingAccount>> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<SendingAccount> = tables
            .accounts
            .values()
            .filter(|a| {
                a.organization_id == organization_id
                    && a.channel_enum() == Some(channel)
                    && a.can_send()
            })
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn list_by_status(&self, status: AccountStatus) -> Result<Vec<SendingAccount>> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<SendingAccount> = tables
            .accounts
            .values()
            .filter(|a| a.is_active && a.status_enum() == Some(status))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn try_increment_sent_today(&self, id: AccountId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.accounts.get_mut(&id) {
            Some(a) if a.sent_today < a.daily_limit => {
                a.sent_today += 1;
                a.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_sent_today(&self) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for a in tables.accounts.values_mut().filter(|a| a.sent_today != 0) {
            a.sent_today = 0;
            changed += 1;
        }
        Ok(changed)
    }

    async fn update_warmup(&self, id: AccountId, update: WarmupUpdate) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Account {}", id)))?;
        if account.warmed_on(update.day) {
            return Ok(false);
        }
        account.warmup_day = update.warmup_day;
        account.last_warmup_on = Some(update.day);
        account.daily_limit = update.daily_limit;
        account.status = update.status.to_string();
        account.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_reputation(&self, id: AccountId, reputation: Reputation) -> Result<()> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Account {}", id)))?;
        account.health_score = reputation.health_score;
        account.delivery_rate = reputation.delivery_rate;
        account.bounce_rate = reputation.bounce_rate;
        account.reply_rate = reputation.reply_rate;
        account.updated_at = Utc::now();
        Ok(())
    }
}

fn find_by_tracking_id<'a>(tables: &'a mut Tables, tracking_id: &str) -> Option<&'a mut Message> {
    tables
        .messages
        .values_mut()
        .find(|m| m.tracking_id == tracking_id)
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let mut tables = self.tables.write().await;
        if tables
            .messages
            .values()
            .any(|m| m.tracking_id == input.tracking_id)
        {
            return Err(Error::Conflict("Duplicate tracking id".to_string()));
        }

        let now = Utc::now();
        let message = Message {
            id: Uuid::now_v7(),
            tracking_id: input.tracking_id,
            campaign_id: input.campaign_id,
            step_id: input.step_id,
            contact_id: input.contact_id,
            account_id: input.account_id,
            channel: input.channel.to_string(),
            subject: input.subject,
            provider_message_id: input.provider_message_id,
            status: input.status.to_string(),
            error: input.error,
            sent_at: input.sent_at,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            replied_at: None,
            bounced_at: None,
            opens_count: 0,
            clicks_count: 0,
            clicked_links: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn get_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Message>> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .values()
            .find(|m| m.tracking_id == tracking_id)
            .cloned())
    }

    async fn get_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        Ok(self
            .tables
            .read()
            .await
            .messages
            .values()
            .filter(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
            .max_by_key(|m| m.created_at)
            .cloned())
    }

    async fn list_for_enrollment(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.campaign_id == Some(campaign_id) && m.contact_id == Some(contact_id))
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.created_at, m.id));
        Ok(messages)
    }

    async fn record_open(&self, tracking_id: &str, at: DateTime<Utc>) -> Result<Option<OpenRecord>> {
        let mut tables = self.tables.write().await;
        let Some(m) = find_by_tracking_id(&mut tables, tracking_id) else {
            return Ok(None);
        };
        let first_open = m.opened_at.is_none();
        m.opens_count += 1;
        m.opened_at.get_or_insert(at);
        if matches!(
            m.status_enum(),
            Some(MessageStatus::Sent | MessageStatus::Delivered)
        ) {
            m.status = MessageStatus::Opened.to_string();
        }
        m.updated_at = Utc::now();
        Ok(Some(OpenRecord {
            message: m.clone(),
            first_open,
        }))
    }

    async fn record_click(
        &self,
        tracking_id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<ClickRecord>> {
        let mut tables = self.tables.write().await;
        let Some(m) = find_by_tracking_id(&mut tables, tracking_id) else {
            return Ok(None);
        };
        let first_click = m.clicked_at.is_none();
        m.clicks_count += 1;
        m.clicked_at.get_or_insert(at);
        if !m.clicked_links.iter().any(|l| l == url) {
            m.clicked_links.push(url.to_string());
        }
        if matches!(
            m.status_enum(),
            Some(MessageStatus::Sent | MessageStatus::Delivered | MessageStatus::Opened)
        ) {
            m.status = MessageStatus::Clicked.to_string();
        }
        m.updated_at = Utc::now();
        Ok(Some(ClickRecord {
            message: m.clone(),
            first_click,
        }))
    }

    async fn record_reply(
        &self,
        tracking_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<TransitionRecord>> {
        let mut tables = self.tables.write().await;
        let Some(m) = find_by_tracking_id(&mut tables, tracking_id) else {
            return Ok(None);
        };
        let first_time = m.replied_at.is_none();
        m.replied_at.get_or_insert(at);
        if !matches!(
            m.status_enum(),
            Some(MessageStatus::Bounced | MessageStatus::Failed)
        ) {
            m.status = MessageStatus::Replied.to_string();
        }
        m.updated_at = Utc::now();
        Ok(Some(TransitionRecord {
            message: m.clone(),
            first_time,
        }))
    }

    async fn record_bounce(&self, id: MessageId, at: DateTime<Utc>) -> Result<Option<TransitionRecord>> {
        let mut tables = self.tables.write().await;
        let Some(m) = tables.messages.get_mut(&id) else {
            return Ok(None);
        };
        let first_time = m.bounced_at.is_none();
        m.bounced_at.get_or_insert(at);
        m.status = MessageStatus::Bounced.to_string();
        m.updated_at = Utc::now();
        Ok(Some(TransitionRecord {
            message: m.clone(),
            first_time,
        }))
    }
}

#[async_trait]
impl WarmupLogRepository for MemoryStore {
    async fn upsert_increment(
        &self,
        account_id: AccountId,
        day: NaiveDate,
        delta: WarmupLogDelta,
    ) -> Result<WarmupLog> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let log = tables
            .warmup_logs
            .entry((account_id, day))
            .or_insert_with(|| empty_log(account_id, day));
        log.emails_sent += delta.emails_sent;
        log.emails_received += delta.emails_received;
        log.bounces += delta.bounces;
        log.spam_reports += delta.spam_reports;
        log.replies_sent += delta.replies_sent;
        log.updated_at = now;
        Ok(log.clone())
    }

    async fn set_health_score(&self, account_id: AccountId, day: NaiveDate, score: f64) -> Result<()> {
        let mut tables = self.tables.write().await;
        let log = tables
            .warmup_logs
            .entry((account_id, day))
            .or_insert_with(|| empty_log(account_id, day));
        log.health_score = Some(score);
        log.updated_at = Utc::now();
        Ok(())
    }

    async fn list_since(&self, account_id: AccountId, since: NaiveDate) -> Result<Vec<WarmupLog>> {
        let tables = self.tables.read().await;
        let mut logs: Vec<WarmupLog> = tables
            .warmup_logs
            .values()
            .filter(|l| l.account_id == account_id && l.log_date >= since)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.log_date);
        Ok(logs)
    }
}

fn empty_log(account_id: AccountId, day: NaiveDate) -> WarmupLog {
    let now = Utc::now();
    WarmupLog {
        id: Uuid::now_v7(),
        account_id,
        log_date: day,
        emails_sent: 0,
        emails_received: 0,
        bounces: 0,
        spam_reports: 0,
        replies_sent: 0,
        health_score: None,
        created_at: now,
        updated_at: now,
    }
}
