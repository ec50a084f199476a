//! Fixtures shared by the engine's unit tests

use crate::channels::{CapabilityProbe, ChannelSender, SendOutcome, SendRequest};
use async_trait::async_trait;
use chrono::Utc;
use outreach_common::types::Channel;
use outreach_common::Result;
use outreach_storage::models::{
    AccountStatus, Campaign, CampaignStep, Contact, CreateCampaign, CreateCampaignStep,
    CreateContact, CreateSendingAccount, Message, SchedulePolicy, SendingAccount, StepConditions,
};
use outreach_storage::repository::Repositories;
use std::collections::VecDeque;
use std::sync::Mutex;
use uuid::Uuid;

pub fn account_row(channel: Channel, daily_limit: i32, sent_today: i32) -> SendingAccount {
    let id = Uuid::now_v7();
    SendingAccount {
        id,
        organization_id: Uuid::nil(),
        channel: channel.to_string(),
        email: format!("sender-{}@example.com", id.simple()),
        display_name: Some("Sam Sender".to_string()),
        smtp_host: Some("localhost".to_string()),
        smtp_port: Some(1025),
        smtp_username: None,
        smtp_password: None,
        daily_limit,
        sent_today,
        warmup_day: 0,
        last_warmup_on: None,
        status: AccountStatus::Ready.to_string(),
        is_active: true,
        health_score: 100.0,
        delivery_rate: 0.0,
        bounce_rate: 0.0,
        reply_rate: 0.0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn contact_row(email: &str) -> Contact {
    Contact {
        id: Uuid::now_v7(),
        organization_id: Uuid::nil(),
        email: email.to_string(),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        company: Some("Analytical Engines".to_string()),
        title: None,
        linkedin_url: Some("https://www.linkedin.com/in/ada".to_string()),
        status: "active".to_string(),
        total_opens: 0,
        total_clicks: 0,
        attributes: serde_json::json!({}),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn message_row(tracking_id: &str) -> Message {
    Message {
        id: Uuid::now_v7(),
        tracking_id: tracking_id.to_string(),
        campaign_id: None,
        step_id: None,
        contact_id: None,
        account_id: None,
        channel: "email".to_string(),
        subject: None,
        provider_message_id: None,
        status: "sent".to_string(),
        error: None,
        sent_at: Some(Utc::now()),
        delivered_at: None,
        opened_at: None,
        clicked_at: None,
        replied_at: None,
        bounced_at: None,
        opens_count: 0,
        clicks_count: 0,
        clicked_links: Vec::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Sender that replays queued outcomes and records every request
#[derive(Default)]
pub struct ScriptedSender {
    outcomes: Mutex<VecDeque<SendOutcome>>,
    requests: Mutex<Vec<SendRequest>>,
}

impl ScriptedSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: SendOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    async fn send(&self, request: &SendRequest) -> SendOutcome {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let n = requests.len();
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| SendOutcome::sent(format!("<{}@test>", n)))
    }
}

/// Probe answering `true` for the listed contacts
#[derive(Default)]
pub struct FixedProbe {
    pub connected: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl CapabilityProbe for FixedProbe {
    async fn has_capability(&self, contact: &Contact, _capability: &str) -> Result<bool> {
        Ok(self.connected.lock().unwrap().contains(&contact.id))
    }
}

/// Schedule that is open around the clock, every day
pub fn always_open() -> SchedulePolicy {
    use chrono::Weekday::*;
    SchedulePolicy {
        timezone: "UTC".to_string(),
        days: vec![Mon, Tue, Wed, Thu, Fri, Sat, Sun],
        start_hour: 0,
        end_hour: 24,
    }
}

pub async fn seed_campaign(repos: &Repositories, channel: Channel) -> Campaign {
    repos
        .campaigns
        .create(CreateCampaign {
            organization_id: Uuid::nil(),
            name: "Q3 founders".to_string(),
            channel,
            schedule: always_open(),
        })
        .await
        .unwrap()
}

pub async fn seed_step(
    repos: &Repositories,
    campaign: &Campaign,
    step_number: i32,
    delay_days: i32,
    conditions: StepConditions,
) -> CampaignStep {
    repos
        .steps
        .create(CreateCampaignStep {
            campaign_id: campaign.id,
            step_number,
            channel: Channel::Email,
            delay_days,
            delay_hours: 0,
            subject: Some(format!("Step {} for {{{{first_name}}}}", step_number)),
            body: Some("Hi {{first_name}}, see https://example.com/deck".to_string()),
            action: None,
            conditions,
        })
        .await
        .unwrap()
}

pub async fn seed_contact(repos: &Repositories, email: &str) -> Contact {
    repos
        .contacts
        .create(CreateContact {
            organization_id: Uuid::nil(),
            email: email.to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            company: Some("Analytical Engines".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn seed_account(repos: &Repositories, daily_limit: i32, status: AccountStatus) -> SendingAccount {
    repos
        .accounts
        .create(CreateSendingAccount {
            organization_id: Uuid::nil(),
            channel: Channel::Email,
            email: format!("sender-{}@example.com", Uuid::now_v7().simple()),
            display_name: Some("Sam Sender".to_string()),
            smtp_host: Some("localhost".to_string()),
            smtp_port: Some(1025),
            smtp_username: None,
            smtp_password: None,
            daily_limit,
            status,
        })
        .await
        .unwrap()
}
