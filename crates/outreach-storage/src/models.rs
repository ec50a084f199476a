//! Database models

use chrono::{DateTime, Duration, NaiveDate, Utc, Weekday};
use outreach_common::types::{
    AccountId, CampaignId, Channel, ChannelAction, ContactId, EnrollmentId, MessageId,
    OrganizationId, StepId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Campaigns
// ============================================================================

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "draft"),
            CampaignStatus::Active => write!(f, "active"),
            CampaignStatus::Paused => write!(f, "paused"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            "completed" => Ok(CampaignStatus::Completed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Sending window of a campaign, evaluated in the campaign's timezone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    /// IANA timezone name, e.g. "Europe/Berlin"
    pub timezone: String,
    pub days: Vec<Weekday>,
    /// First hour (inclusive) of the window
    pub start_hour: u32,
    /// Last hour (exclusive) of the window
    pub end_hour: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            start_hour: 9,
            end_hour: 17,
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub channel: String,
    pub status: String,
    pub timezone: String,
    pub sending_days: serde_json::Value,
    pub start_hour: i32,
    pub end_hour: i32,
    pub contacted_count: i32,
    pub opened_count: i32,
    pub replied_count: i32,
    pub meetings_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Get channel enum
    pub fn channel_enum(&self) -> Option<Channel> {
        self.channel.parse().ok()
    }

    /// Sending window; unparseable day lists become empty (never due)
    pub fn schedule(&self) -> SchedulePolicy {
        SchedulePolicy {
            timezone: self.timezone.clone(),
            days: serde_json::from_value(self.sending_days.clone()).unwrap_or_default(),
            start_hour: self.start_hour.clamp(0, 24) as u32,
            end_hour: self.end_hour.clamp(0, 24) as u32,
        }
    }
}

/// Aggregate counters kept on a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignCounter {
    Contacted,
    Opened,
    Replied,
    Meetings,
}

impl CampaignCounter {
    pub fn column(&self) -> &'static str {
        match self {
            CampaignCounter::Contacted => "contacted_count",
            CampaignCounter::Opened => "opened_count",
            CampaignCounter::Replied => "replied_count",
            CampaignCounter::Meetings => "meetings_count",
        }
    }
}

/// Create campaign input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub organization_id: OrganizationId,
    pub name: String,
    pub channel: Channel,
    pub schedule: SchedulePolicy,
}

// ============================================================================
// Campaign steps
// ============================================================================

/// Branch predicate attached to a step; all declared conditions must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepConditions {
    pub only_if_opened: bool,
    pub only_if_clicked: bool,
    pub only_if_not_replied: bool,
    pub skip_if_linkedin_connected: bool,
}

impl StepConditions {
    pub fn is_empty(&self) -> bool {
        !(self.only_if_opened
            || self.only_if_clicked
            || self.only_if_not_replied
            || self.skip_if_linkedin_connected)
    }
}

/// Campaign step model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: StepId,
    pub campaign_id: CampaignId,
    pub step_number: i32,
    pub channel: String,
    pub delay_days: i32,
    pub delay_hours: i32,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub action: Option<String>,
    pub conditions: serde_json::Value,
    pub sent_count: i32,
    pub opened_count: i32,
    pub clicked_count: i32,
    pub replied_count: i32,
    pub created_at: DateTime<Utc>,
}

impl CampaignStep {
    /// Get channel enum
    pub fn channel_enum(&self) -> Option<Channel> {
        self.channel.parse().ok()
    }

    /// Driver action for non-email steps; defaults to a plain send
    pub fn action_enum(&self) -> ChannelAction {
        match self.action.as_deref() {
            Some("connect") => ChannelAction::Connect,
            Some("visit") => ChannelAction::Visit,
            _ => ChannelAction::Send,
        }
    }

    /// Declared branch conditions (malformed JSON counts as none)
    pub fn conditions(&self) -> StepConditions {
        serde_json::from_value(self.conditions.clone()).unwrap_or_default()
    }

    /// Delay applied before this step runs, relative to the previous step
    pub fn delay(&self) -> Duration {
        Duration::days(self.delay_days.max(0) as i64) + Duration::hours(self.delay_hours.max(0) as i64)
    }
}

/// Per-step counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCounter {
    Sent,
    Opened,
    Clicked,
    Replied,
}

impl StepCounter {
    pub fn column(&self) -> &'static str {
        match self {
            StepCounter::Sent => "sent_count",
            StepCounter::Opened => "opened_count",
            StepCounter::Clicked => "clicked_count",
            StepCounter::Replied => "replied_count",
        }
    }
}

/// Create campaign step input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignStep {
    pub campaign_id: CampaignId,
    pub step_number: i32,
    pub channel: Channel,
    pub delay_days: i32,
    pub delay_hours: i32,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub action: Option<ChannelAction>,
    #[serde(default)]
    pub conditions: StepConditions,
}

// ============================================================================
// Contacts
// ============================================================================

/// Contact status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Active,
    Unsubscribed,
    Bounced,
    Complained,
}

impl ContactStatus {
    /// Terminal statuses stop all outreach to the contact
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContactStatus::Active)
    }
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactStatus::Active => write!(f, "active"),
            ContactStatus::Unsubscribed => write!(f, "unsubscribed"),
            ContactStatus::Bounced => write!(f, "bounced"),
            ContactStatus::Complained => write!(f, "complained"),
        }
    }
}

impl std::str::FromStr for ContactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ContactStatus::Active),
            "unsubscribed" => Ok(ContactStatus::Unsubscribed),
            "bounced" => Ok(ContactStatus::Bounced),
            "complained" => Ok(ContactStatus::Complained),
            _ => Err(format!("Invalid contact status: {}", s)),
        }
    }
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub organization_id: OrganizationId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub linkedin_url: Option<String>,
    pub status: String,
    pub total_opens: i32,
    pub total_clicks: i32,
    pub attributes: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ContactStatus> {
        self.status.parse().ok()
    }

    /// Whether the contact may still receive outreach
    pub fn is_reachable(&self) -> bool {
        matches!(self.status_enum(), Some(ContactStatus::Active))
    }

    /// "First Last", falling back to whichever part exists
    pub fn full_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Per-contact engagement counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementCounter {
    Opens,
    Clicks,
}

impl EngagementCounter {
    pub fn column(&self) -> &'static str {
        match self {
            EngagementCounter::Opens => "total_opens",
            EngagementCounter::Clicks => "total_clicks",
        }
    }
}

/// Create contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContact {
    pub organization_id: OrganizationId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub linkedin_url: Option<String>,
    pub attributes: Option<serde_json::Value>,
}

// ============================================================================
// Campaign contacts (enrollments)
// ============================================================================

/// Per (campaign, contact) state machine instance
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignContact {
    pub id: EnrollmentId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    /// 0 = not started
    pub current_step: i32,
    pub next_action_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub error_count: i32,
    pub last_error: Option<String>,
    pub first_contacted_at: Option<DateTime<Utc>>,
    pub last_contacted_at: Option<DateTime<Utc>>,
    pub variables: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignContact {
    /// Whether the enrollment is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_action_at.map_or(false, |at| at <= now)
    }
}

/// New state written when an enrollment moves past a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTransition {
    pub current_step: i32,
    pub next_action_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl StepTransition {
    /// Step `step_number` is done and the following step fires at `next_action_at`
    pub fn advance(step_number: i32, next_action_at: DateTime<Utc>) -> Self {
        Self {
            current_step: step_number,
            next_action_at: Some(next_action_at),
            is_active: true,
        }
    }

    /// Step `step_number` was the last one
    pub fn complete(step_number: i32) -> Self {
        Self {
            current_step: step_number,
            next_action_at: None,
            is_active: false,
        }
    }
}

/// Create enrollment input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignContact {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub next_action_at: DateTime<Utc>,
    pub variables: Option<serde_json::Value>,
}

// ============================================================================
// Sending accounts
// ============================================================================

/// Sending account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Warming,
    Ready,
    Limited,
    Blocked,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Warming => write!(f, "warming"),
            AccountStatus::Ready => write!(f, "ready"),
            AccountStatus::Limited => write!(f, "limited"),
            AccountStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warming" => Ok(AccountStatus::Warming),
            "ready" => Ok(AccountStatus::Ready),
            "limited" => Ok(AccountStatus::Limited),
            "blocked" => Ok(AccountStatus::Blocked),
            _ => Err(format!("Invalid account status: {}", s)),
        }
    }
}

/// Sending account model (email mailbox or LinkedIn seat)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendingAccount {
    pub id: AccountId,
    pub organization_id: OrganizationId,
    pub channel: String,
    pub email: String,
    pub display_name: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    pub daily_limit: i32,
    pub sent_today: i32,
    pub warmup_day: i32,
    /// Date of the last finished warmup run
    pub last_warmup_on: Option<NaiveDate>,
    pub status: String,
    pub is_active: bool,
    pub health_score: f64,
    pub delivery_rate: f64,
    pub bounce_rate: f64,
    pub reply_rate: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SendingAccount {
    /// Whether a warmup run already finished on `day` or later
    pub fn warmed_on(&self, day: NaiveDate) -> bool {
        self.last_warmup_on.map_or(false, |last| last >= day)
    }

    /// Get status enum
    pub fn status_enum(&self) -> Option<AccountStatus> {
        self.status.parse().ok()
    }

    /// Get channel enum
    pub fn channel_enum(&self) -> Option<Channel> {
        self.channel.parse().ok()
    }

    /// Sends left today
    pub fn remaining_today(&self) -> i32 {
        (self.daily_limit - self.sent_today).max(0)
    }

    /// Active, not blocked, and below its daily limit
    pub fn can_send(&self) -> bool {
        self.is_active
            && !matches!(self.status_enum(), Some(AccountStatus::Blocked) | None)
            && self.sent_today < self.daily_limit
    }
}

/// Create sending account input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSendingAccount {
    pub organization_id: OrganizationId,
    pub channel: Channel,
    pub email: String,
    pub display_name: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub daily_limit: i32,
    pub status: AccountStatus,
}

/// Warmup progression written after each warmup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupUpdate {
    /// The warmup day being finished; at most one update per date
    pub day: NaiveDate,
    pub warmup_day: i32,
    pub daily_limit: i32,
    pub status: AccountStatus,
}

/// Reputation metrics derived from the warmup log window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reputation {
    pub health_score: f64,
    pub delivery_rate: f64,
    pub bounce_rate: f64,
    pub reply_rate: f64,
}

// ============================================================================
// Warmup logs
// ============================================================================

/// One row per (account, calendar day)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WarmupLog {
    pub id: uuid::Uuid,
    pub account_id: AccountId,
    pub log_date: NaiveDate,
    pub emails_sent: i32,
    pub emails_received: i32,
    pub bounces: i32,
    pub spam_reports: i32,
    pub replies_sent: i32,
    pub health_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Increments applied to a warmup log row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupLogDelta {
    pub emails_sent: i32,
    pub emails_received: i32,
    pub bounces: i32,
    pub spam_reports: i32,
    pub replies_sent: i32,
}

impl WarmupLogDelta {
    pub fn sent(n: i32) -> Self {
        Self {
            emails_sent: n,
            ..Default::default()
        }
    }

    pub fn bounce() -> Self {
        Self {
            bounces: 1,
            ..Default::default()
        }
    }

    pub fn spam_report() -> Self {
        Self {
            spam_reports: 1,
            ..Default::default()
        }
    }

    pub fn reply() -> Self {
        Self {
            replies_sent: 1,
            ..Default::default()
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Message status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Failed,
}

impl MessageStatus {
    /// Engagement rank; tracking events only ever move a message up
    pub fn rank(&self) -> u8 {
        match self {
            MessageStatus::Failed => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Opened => 3,
            MessageStatus::Clicked => 4,
            MessageStatus::Replied => 5,
            MessageStatus::Bounced => 6,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::Delivered => write!(f, "delivered"),
            MessageStatus::Opened => write!(f, "opened"),
            MessageStatus::Clicked => write!(f, "clicked"),
            MessageStatus::Replied => write!(f, "replied"),
            MessageStatus::Bounced => write!(f, "bounced"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "opened" => Ok(MessageStatus::Opened),
            "clicked" => Ok(MessageStatus::Clicked),
            "replied" => Ok(MessageStatus::Replied),
            "bounced" => Ok(MessageStatus::Bounced),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Message model, one per send attempt
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub tracking_id: String,
    pub campaign_id: Option<CampaignId>,
    pub step_id: Option<StepId>,
    pub contact_id: Option<ContactId>,
    pub account_id: Option<AccountId>,
    pub channel: String,
    pub subject: Option<String>,
    pub provider_message_id: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
    pub opens_count: i32,
    pub clicks_count: i32,
    pub clicked_links: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub tracking_id: String,
    pub campaign_id: Option<CampaignId>,
    pub step_id: Option<StepId>,
    pub contact_id: Option<ContactId>,
    pub account_id: Option<AccountId>,
    pub channel: Channel,
    pub subject: Option<String>,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
    pub error: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Result of recording an open
#[derive(Debug, Clone, FromRow)]
pub struct OpenRecord {
    #[sqlx(flatten)]
    pub message: Message,
    /// This call set `opened_at`
    pub first_open: bool,
}

/// Result of recording a click
#[derive(Debug, Clone, FromRow)]
pub struct ClickRecord {
    #[sqlx(flatten)]
    pub message: Message,
    /// This call set `clicked_at`
    pub first_click: bool,
}

/// Result of recording a bounce or reply
#[derive(Debug, Clone, FromRow)]
pub struct TransitionRecord {
    #[sqlx(flatten)]
    pub message: Message,
    /// This call set the event timestamp
    pub first_time: bool,
}

// ============================================================================
// Job queue
// ============================================================================

/// Job queue model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: uuid::Uuid,
    pub queue: String,
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
