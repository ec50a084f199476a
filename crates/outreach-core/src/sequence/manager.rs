//! Campaign lifecycle and enrollment

use crate::queue::{ChannelActionJob, Job, JobQueue, QueueError};
use chrono::{DateTime, Utc};
use outreach_common::types::{CampaignId, Channel, ContactId, JobId};
use outreach_storage::models::{
    Campaign, CampaignContact, CampaignCounter, CampaignStatus, CampaignStep, CreateCampaign,
    CreateCampaignContact, CreateCampaignStep,
};
use outreach_storage::repository::Repositories;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Campaign errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Contact not found")]
    ContactNotFound,

    #[error("Campaign has no steps")]
    NoSteps,

    #[error("Step numbers must be contiguous from 1, expected {expected}")]
    NonContiguousSteps { expected: i32 },

    #[error("Cannot move campaign from {from} to {to}")]
    InvalidTransition { from: String, to: CampaignStatus },

    #[error("Contact is {0} and cannot be enrolled")]
    ContactTerminal(String),

    #[error("Invalid campaign: {0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] outreach_common::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Campaign Manager - manages campaign lifecycle and enrollments
pub struct CampaignManager {
    repos: Repositories,
    queue: Arc<dyn JobQueue>,
}

impl CampaignManager {
    pub fn new(repos: Repositories, queue: Arc<dyn JobQueue>) -> Self {
        Self { repos, queue }
    }

    /// Create a campaign in draft
    pub async fn create_campaign(&self, input: CreateCampaign) -> Result<Campaign, CampaignError> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Invalid("name is required".to_string()));
        }
        let schedule = &input.schedule;
        if schedule.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(CampaignError::Invalid(format!(
                "unknown timezone {}",
                schedule.timezone
            )));
        }
        if schedule.start_hour >= schedule.end_hour || schedule.end_hour > 24 {
            return Err(CampaignError::Invalid(format!(
                "sending hours {}-{} are not a valid window",
                schedule.start_hour, schedule.end_hour
            )));
        }
        if schedule.days.is_empty() {
            return Err(CampaignError::Invalid("no sending days".to_string()));
        }

        let campaign = self.repos.campaigns.create(input).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    /// Append a step; numbering stays contiguous from 1
    pub async fn add_step(&self, input: CreateCampaignStep) -> Result<CampaignStep, CampaignError> {
        let campaign = self.get(input.campaign_id).await?;
        if campaign.status_enum() == Some(CampaignStatus::Completed) {
            return Err(CampaignError::Invalid("campaign is completed".to_string()));
        }

        let campaign_channel = campaign.channel_enum().unwrap_or(Channel::Multi);
        match input.channel {
            Channel::Multi => {
                return Err(CampaignError::Invalid(
                    "a step must use a single channel".to_string(),
                ))
            }
            channel if campaign_channel != Channel::Multi && channel != campaign_channel => {
                return Err(CampaignError::Invalid(format!(
                    "{} step in a {} campaign",
                    channel, campaign_channel
                )))
            }
            _ => {}
        }
        if input.delay_days < 0 || input.delay_hours < 0 {
            return Err(CampaignError::Invalid("negative delay".to_string()));
        }
        if input.channel == Channel::Email && input.body.as_deref().map_or(true, str::is_empty) {
            return Err(CampaignError::Invalid("email steps need a body".to_string()));
        }

        let existing = self.repos.steps.list_by_campaign(campaign.id).await?;
        let expected = existing.len() as i32 + 1;
        if input.step_number != expected {
            return Err(CampaignError::NonContiguousSteps { expected });
        }

        Ok(self.repos.steps.create(input).await?)
    }

    /// Enroll a contact; the first step fires after its own delay
    pub async fn enroll_contact(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
        variables: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<CampaignContact, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status_enum() == Some(CampaignStatus::Completed) {
            return Err(CampaignError::Invalid("campaign is completed".to_string()));
        }

        let contact = self
            .repos
            .contacts
            .get(contact_id)
            .await?
            .ok_or(CampaignError::ContactNotFound)?;
        if !contact.is_reachable() {
            return Err(CampaignError::ContactTerminal(contact.status));
        }

        let steps = self.repos.steps.list_by_campaign(campaign_id).await?;
        let first = steps
            .iter()
            .find(|s| s.step_number == 1)
            .ok_or(CampaignError::NoSteps)?;

        let enrollment = self
            .repos
            .enrollments
            .create(CreateCampaignContact {
                campaign_id,
                contact_id,
                next_action_at: now + first.delay(),
                variables,
            })
            .await?;
        Ok(enrollment)
    }

    /// Drop an enrollment entirely
    pub async fn remove_contact(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<bool, CampaignError> {
        Ok(self.repos.enrollments.delete(campaign_id, contact_id).await?)
    }

    /// draft|paused -> active, then schedule an immediate cycle
    pub async fn start_campaign(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        let steps = self.repos.steps.list_by_campaign(campaign_id).await?;
        validate_steps(&steps)?;

        self.transition(
            &campaign,
            &[CampaignStatus::Draft, CampaignStatus::Paused],
            CampaignStatus::Active,
        )
        .await?;
        self.queue
            .enqueue(Job::sequence_advance(campaign_id), Utc::now())
            .await?;

        info!(campaign_id = %campaign_id, steps = steps.len(), "Campaign started");
        self.get(campaign_id).await
    }

    /// active -> paused
    pub async fn pause_campaign(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        self.transition(&campaign, &[CampaignStatus::Active], CampaignStatus::Paused)
            .await?;
        info!(campaign_id = %campaign_id, "Campaign paused");
        self.get(campaign_id).await
    }

    /// paused -> active
    pub async fn resume_campaign(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Paused) {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status,
                to: CampaignStatus::Active,
            });
        }
        self.start_campaign(campaign_id).await
    }

    /// Complete an active campaign once everyone enrolled has left the sequence.
    /// Campaigns nobody was enrolled in stay active. Returns true if this call completed it.
    pub async fn check_completion(&self, campaign_id: CampaignId) -> Result<bool, CampaignError> {
        let campaign = self.get(campaign_id).await?;
        if campaign.status_enum() != Some(CampaignStatus::Active) {
            return Ok(false);
        }
        if self.repos.enrollments.count_active(campaign_id).await? > 0 {
            return Ok(false);
        }
        if self.repos.enrollments.count_all(campaign_id).await? == 0 {
            debug!(campaign_id = %campaign_id, "Active campaign has no enrollments yet");
            return Ok(false);
        }

        let completed = self
            .repos
            .campaigns
            .transition_status(campaign_id, &[CampaignStatus::Active], CampaignStatus::Completed)
            .await?;
        if completed {
            info!(campaign_id = %campaign_id, "Campaign completed");
        }
        Ok(completed)
    }

    /// Count a booked meeting against the campaign
    pub async fn record_meeting(&self, campaign_id: CampaignId) -> Result<(), CampaignError> {
        self.get(campaign_id).await?;
        self.repos
            .campaigns
            .increment_counter(campaign_id, CampaignCounter::Meetings)
            .await?;
        Ok(())
    }

    /// Queue a one-off channel action (connect, visit, message)
    pub async fn queue_channel_action(
        &self,
        job: ChannelActionJob,
        run_at: DateTime<Utc>,
    ) -> Result<Option<JobId>, CampaignError> {
        if job.target_url.trim().is_empty() {
            return Err(CampaignError::Invalid("target url is required".to_string()));
        }
        Ok(self.queue.enqueue(Job::ChannelAction(job), run_at).await?)
    }

    async fn get(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        self.repos
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)
    }

    async fn transition(
        &self,
        campaign: &Campaign,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<(), CampaignError> {
        let moved = self
            .repos
            .campaigns
            .transition_status(campaign.id, from, to)
            .await?;
        if !moved {
            return Err(CampaignError::InvalidTransition {
                from: campaign.status.clone(),
                to,
            });
        }
        Ok(())
    }
}

fn validate_steps(steps: &[CampaignStep]) -> Result<(), CampaignError> {
    if steps.is_empty() {
        return Err(CampaignError::NoSteps);
    }
    // Sorted by step number
    for (i, step) in steps.iter().enumerate() {
        let expected = i as i32 + 1;
        if step.step_number != expected {
            return Err(CampaignError::NonContiguousSteps { expected });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobCategory, MemoryJobQueue};
    use crate::testing::{always_open, seed_campaign, seed_contact, seed_step};
    use chrono::{Duration, TimeZone};
    use outreach_common::types::ChannelAction;
    use outreach_storage::models::{ContactStatus, SchedulePolicy, StepConditions};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn manager() -> (CampaignManager, Repositories, Arc<MemoryJobQueue>) {
        let repos = Repositories::in_memory();
        let queue = Arc::new(MemoryJobQueue::new());
        (CampaignManager::new(repos.clone(), queue.clone()), repos, queue)
    }

    fn step(campaign_id: CampaignId, step_number: i32, channel: Channel) -> CreateCampaignStep {
        CreateCampaignStep {
            campaign_id,
            step_number,
            channel,
            delay_days: 1,
            delay_hours: 6,
            subject: Some("Hello".to_string()),
            body: Some("Hi {{first_name}}".to_string()),
            action: None,
            conditions: StepConditions::default(),
        }
    }

    #[tokio::test]
    async fn test_create_campaign_validation() {
        let (manager, _, _) = manager();
        let input = |schedule: SchedulePolicy| CreateCampaign {
            organization_id: Uuid::nil(),
            name: "Launch".to_string(),
            channel: Channel::Email,
            schedule,
        };

        let bad_tz = manager
            .create_campaign(input(SchedulePolicy {
                timezone: "Mars/Olympus".to_string(),
                ..Default::default()
            }))
            .await;
        assert!(matches!(bad_tz, Err(CampaignError::Invalid(_))));

        let bad_hours = manager
            .create_campaign(input(SchedulePolicy {
                start_hour: 17,
                end_hour: 9,
                ..Default::default()
            }))
            .await;
        assert!(matches!(bad_hours, Err(CampaignError::Invalid(_))));

        let campaign = manager.create_campaign(input(always_open())).await.unwrap();
        assert_eq!(campaign.status, "draft");
    }

    #[tokio::test]
    async fn test_add_step_rules() {
        let (manager, repos, _) = manager();
        let campaign = seed_campaign(&repos, Channel::Email).await;

        let gap = manager.add_step(step(campaign.id, 2, Channel::Email)).await;
        assert!(matches!(gap, Err(CampaignError::NonContiguousSteps { expected: 1 })));

        let wrong_channel = manager.add_step(step(campaign.id, 1, Channel::Linkedin)).await;
        assert!(matches!(wrong_channel, Err(CampaignError::Invalid(_))));

        manager.add_step(step(campaign.id, 1, Channel::Email)).await.unwrap();
        manager.add_step(step(campaign.id, 2, Channel::Email)).await.unwrap();
        assert_eq!(repos.steps.list_by_campaign(campaign.id).await.unwrap().len(), 2);

        let multi = seed_campaign(&repos, Channel::Multi).await;
        manager.add_step(step(multi.id, 1, Channel::Email)).await.unwrap();
        let mut visit = step(multi.id, 2, Channel::Linkedin);
        visit.action = Some(ChannelAction::Visit);
        manager.add_step(visit).await.unwrap();
    }

    #[tokio::test]
    async fn test_enroll_contact() {
        let (manager, repos, _) = manager();
        let campaign = seed_campaign(&repos, Channel::Email).await;
        let contact = seed_contact(&repos, "ada@example.org").await;
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

        let none = manager.enroll_contact(campaign.id, contact.id, None, now).await;
        assert!(matches!(none, Err(CampaignError::NoSteps)));

        seed_step(&repos, &campaign, 1, 2, StepConditions::default()).await;
        let enrollment = manager
            .enroll_contact(campaign.id, contact.id, None, now)
            .await
            .unwrap();
        assert_eq!(enrollment.current_step, 0);
        assert!(enrollment.is_active);
        assert_eq!(enrollment.next_action_at, Some(now + Duration::days(2)));

        let again = manager
            .enroll_contact(campaign.id, contact.id, None, now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(again.id, enrollment.id);

        let gone = seed_contact(&repos, "gone@example.org").await;
        repos
            .contacts
            .mark_terminal(gone.id, ContactStatus::Unsubscribed)
            .await
            .unwrap();
        let refused = manager.enroll_contact(campaign.id, gone.id, None, now).await;
        assert!(matches!(refused, Err(CampaignError::ContactTerminal(s)) if s == "unsubscribed"));

        assert!(manager.remove_contact(campaign.id, contact.id).await.unwrap());
        assert!(!manager.remove_contact(campaign.id, contact.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let (manager, repos, queue) = manager();
        let campaign = seed_campaign(&repos, Channel::Email).await;

        assert!(matches!(
            manager.start_campaign(campaign.id).await,
            Err(CampaignError::NoSteps)
        ));
        assert!(matches!(
            manager.pause_campaign(campaign.id).await,
            Err(CampaignError::InvalidTransition { .. })
        ));

        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let started = manager.start_campaign(campaign.id).await.unwrap();
        assert_eq!(started.status, "active");
        assert!(started.started_at.is_some());
        let pending = queue.pending(JobCategory::SequenceAdvance).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, Job::sequence_advance(campaign.id));

        assert!(matches!(
            manager.resume_campaign(campaign.id).await,
            Err(CampaignError::InvalidTransition { .. })
        ));
        let paused = manager.pause_campaign(campaign.id).await.unwrap();
        assert_eq!(paused.status, "paused");
        let resumed = manager.resume_campaign(campaign.id).await.unwrap();
        assert_eq!(resumed.status, "active");

        assert!(matches!(
            manager.start_campaign(Uuid::now_v7()).await,
            Err(CampaignError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_check_completion() {
        let (manager, repos, _) = manager();
        let campaign = seed_campaign(&repos, Channel::Email).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let contact = seed_contact(&repos, "ada@example.org").await;
        let enrollment = manager
            .enroll_contact(campaign.id, contact.id, None, Utc::now())
            .await
            .unwrap();

        // Drafts never complete
        assert!(!manager.check_completion(campaign.id).await.unwrap());

        manager.start_campaign(campaign.id).await.unwrap();
        assert!(!manager.check_completion(campaign.id).await.unwrap());

        repos.enrollments.deactivate(enrollment.id).await.unwrap();
        assert!(manager.check_completion(campaign.id).await.unwrap());
        let campaign = repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.status, "completed");
        assert!(campaign.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_started_empty_campaign_accepts_late_enrollment() {
        let (manager, repos, _) = manager();
        let campaign = seed_campaign(&repos, Channel::Email).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        manager.start_campaign(campaign.id).await.unwrap();

        // Nobody enrolled yet: stays active
        assert!(!manager.check_completion(campaign.id).await.unwrap());
        let stored = repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "active");

        let contact = seed_contact(&repos, "late@example.org").await;
        let enrollment = manager
            .enroll_contact(campaign.id, contact.id, None, Utc::now())
            .await
            .unwrap();
        assert!(enrollment.is_active);
        assert!(!manager.check_completion(campaign.id).await.unwrap());

        // Once the only enrollment is removed there is nothing left to finish
        assert!(manager.remove_contact(campaign.id, contact.id).await.unwrap());
        assert!(!manager.check_completion(campaign.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_meeting_and_channel_action() {
        let (manager, repos, queue) = manager();
        let campaign = seed_campaign(&repos, Channel::Linkedin).await;

        manager.record_meeting(campaign.id).await.unwrap();
        let campaign = repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.meetings_count, 1);

        let job = ChannelActionJob {
            account_id: Uuid::now_v7(),
            action: ChannelAction::Connect,
            target_url: "https://www.linkedin.com/in/ada".to_string(),
            content: Some("Hi Ada".to_string()),
            contact_id: None,
            campaign_id: Some(campaign.id),
        };
        manager
            .queue_channel_action(job.clone(), Utc::now())
            .await
            .unwrap();
        let pending = queue.pending(JobCategory::ChannelAction).await;
        assert_eq!(pending[0].0, Job::ChannelAction(job));
    }
}
