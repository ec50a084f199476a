//! Per-campaign scheduling cycle: the enrollment state machine

use super::business_hours::BusinessHoursGate;
use super::capacity::CapacityAllocator;
use super::conditions::ConditionEvaluator;
use super::template::{RenderContext, TemplateRenderer, TrackingLinks};
use crate::channels::{CapabilityProbe, ChannelSender, SendRequest, SendTarget};
use crate::metrics::EngineMetrics;
use crate::tracking::TokenSigner;
use chrono::{DateTime, Utc};
use outreach_common::config::SchedulerConfig;
use outreach_common::types::{CampaignId, Channel};
use outreach_common::Result;
use outreach_storage::models::{
    Campaign, CampaignContact, CampaignCounter, CampaignStatus, CampaignStep, Contact,
    ContactStatus, CreateMessage, MessageStatus, SendingAccount, StepCounter, StepTransition,
    WarmupLogDelta,
};
use outreach_storage::repository::Repositories;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a whole cycle did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSkip {
    NotFound,
    NotActive,
    NoSteps,
    OutsideWindow,
}

/// What happened to one due enrollment. Exactly one per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    /// Step sent, enrollment advanced
    Sent,
    /// Conditions failed, enrollment advanced without sending
    Skipped,
    /// Left untouched for a later cycle
    Deferred,
    /// Send failed, enrollment stays on the same step
    Failed,
    /// No steps left
    Completed,
    /// Contact terminal or too many failures
    Deactivated,
}

/// Tally of one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub skipped_cycle: Option<CycleSkip>,
    pub due: usize,
    pub sent: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub failed: usize,
    pub completed: usize,
    pub deactivated: usize,
    /// Enrollments aborted by a storage error
    pub errors: usize,
}

impl CycleReport {
    fn skipped(reason: CycleSkip) -> Self {
        Self {
            skipped_cycle: Some(reason),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: EnrollmentOutcome) {
        match outcome {
            EnrollmentOutcome::Sent => self.sent += 1,
            EnrollmentOutcome::Skipped => self.skipped += 1,
            EnrollmentOutcome::Deferred => self.deferred += 1,
            EnrollmentOutcome::Failed => self.failed += 1,
            EnrollmentOutcome::Completed => self.completed += 1,
            EnrollmentOutcome::Deactivated => self.deactivated += 1,
        }
    }
}

/// Advances due enrollments of a campaign by one step each
pub struct SequenceScheduler {
    repos: Repositories,
    sender: Arc<dyn ChannelSender>,
    conditions: ConditionEvaluator,
    renderer: TemplateRenderer,
    links: TrackingLinks,
    signer: TokenSigner,
    metrics: EngineMetrics,
    batch_size: i64,
    max_send_errors: i32,
}

impl SequenceScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Repositories,
        sender: Arc<dyn ChannelSender>,
        probe: Arc<dyn CapabilityProbe>,
        links: TrackingLinks,
        signer: TokenSigner,
        metrics: EngineMetrics,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            repos,
            sender,
            conditions: ConditionEvaluator::new(probe),
            renderer: TemplateRenderer::new(),
            links,
            signer,
            metrics,
            batch_size: config.batch_size.max(1),
            max_send_errors: config.max_send_errors,
        }
    }

    /// Run one cycle for a campaign
    pub async fn run_cycle(&self, campaign_id: CampaignId, now: DateTime<Utc>) -> Result<CycleReport> {
        let Some(campaign) = self.repos.campaigns.get(campaign_id).await? else {
            warn!(campaign_id = %campaign_id, "Campaign not found, skipping cycle");
            return Ok(CycleReport::skipped(CycleSkip::NotFound));
        };
        if campaign.status_enum() != Some(CampaignStatus::Active) {
            debug!(campaign_id = %campaign_id, status = %campaign.status, "Campaign not active");
            return Ok(CycleReport::skipped(CycleSkip::NotActive));
        }

        let steps = self.repos.steps.list_by_campaign(campaign_id).await?;
        if steps.is_empty() {
            debug!(campaign_id = %campaign_id, "Campaign has no steps");
            return Ok(CycleReport::skipped(CycleSkip::NoSteps));
        }
        if !BusinessHoursGate::is_open(&campaign.schedule(), now) {
            debug!(campaign_id = %campaign_id, "Outside sending window");
            self.metrics.record_deferral("outside_window");
            return Ok(CycleReport::skipped(CycleSkip::OutsideWindow));
        }

        let due = self
            .repos
            .enrollments
            .list_due(campaign_id, now, self.batch_size)
            .await?;
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };
        let mut allocators: HashMap<Channel, CapacityAllocator> = HashMap::new();

        for enrollment in &due {
            match self
                .advance(&campaign, &steps, enrollment, &mut allocators, now)
                .await
            {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(
                        campaign_id = %campaign_id,
                        enrollment_id = %enrollment.id,
                        "Error advancing enrollment: {}",
                        e
                    );
                    report.errors += 1;
                }
            }
        }

        if report.due > 0 {
            info!(
                campaign_id = %campaign_id,
                due = report.due,
                sent = report.sent,
                skipped = report.skipped,
                deferred = report.deferred,
                failed = report.failed,
                completed = report.completed,
                deactivated = report.deactivated,
                "Sequence cycle finished"
            );
        }
        Ok(report)
    }

    async fn advance(
        &self,
        campaign: &Campaign,
        steps: &[CampaignStep],
        enrollment: &CampaignContact,
        allocators: &mut HashMap<Channel, CapacityAllocator>,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentOutcome> {
        let Some(step) = steps
            .iter()
            .find(|s| s.step_number == enrollment.current_step + 1)
        else {
            let applied = self
                .transition(enrollment, StepTransition::complete(enrollment.current_step))
                .await?;
            return Ok(if applied {
                EnrollmentOutcome::Completed
            } else {
                EnrollmentOutcome::Deferred
            });
        };

        let contact = match self.repos.contacts.get(enrollment.contact_id).await? {
            Some(contact) if contact.is_reachable() => contact,
            _ => {
                self.repos.enrollments.deactivate(enrollment.id).await?;
                return Ok(EnrollmentOutcome::Deactivated);
            }
        };

        let history = self
            .repos
            .messages
            .list_for_enrollment(campaign.id, contact.id)
            .await?;
        let proceed = match self
            .conditions
            .evaluate(&step.conditions(), &history, &contact)
            .await
        {
            Ok(proceed) => proceed,
            Err(e) => {
                warn!(enrollment_id = %enrollment.id, "Condition check failed, deferring: {}", e);
                self.metrics.record_deferral("condition_check");
                return Ok(EnrollmentOutcome::Deferred);
            }
        };
        if !proceed {
            debug!(
                enrollment_id = %enrollment.id,
                step = step.step_number,
                "Step conditions not met, skipping"
            );
            self.metrics.record_condition_skip();
            let applied = self
                .transition(enrollment, next_transition(step, steps, now))
                .await?;
            return Ok(if applied {
                EnrollmentOutcome::Skipped
            } else {
                EnrollmentOutcome::Deferred
            });
        }

        let channel = match step.channel_enum() {
            Some(channel @ (Channel::Email | Channel::Linkedin)) => channel,
            _ => {
                let error = format!("Step {} has unsupported channel {}", step.step_number, step.channel);
                return self.record_failure(enrollment, &error).await;
            }
        };

        // One quota snapshot per channel per cycle
        if !allocators.contains_key(&channel) {
            let eligible = self
                .repos
                .accounts
                .list_eligible(campaign.organization_id, channel)
                .await?;
            allocators.insert(channel, CapacityAllocator::new(eligible));
        }
        let Some(account) = allocators.get_mut(&channel).and_then(|a| a.allocate()) else {
            debug!(enrollment_id = %enrollment.id, channel = %channel, "No sending capacity, deferring");
            self.metrics.record_deferral("no_capacity");
            return Ok(EnrollmentOutcome::Deferred);
        };

        let token = self.signer.generate();
        let request = self.build_request(campaign, step, channel, &contact, enrollment, &account, &token);
        let outcome = self.sender.send(&request).await;

        if outcome.success {
            let persisted = self.repos.accounts.try_increment_sent_today(account.id).await?;
            if let Some(allocator) = allocators.get_mut(&channel) {
                allocator.record_send(account.id);
                if !persisted {
                    warn!(account_id = %account.id, "Daily limit reached concurrently");
                    allocator.exhaust(account.id);
                }
            }
            self.metrics.record_send(channel.to_string().as_str());

            self.repos
                .messages
                .create(CreateMessage {
                    tracking_id: token,
                    campaign_id: Some(campaign.id),
                    step_id: Some(step.id),
                    contact_id: Some(contact.id),
                    account_id: Some(account.id),
                    channel,
                    subject: request.subject.clone(),
                    provider_message_id: outcome.provider_message_id.clone(),
                    status: MessageStatus::Sent,
                    error: None,
                    sent_at: Some(now),
                })
                .await?;
            self.repos
                .steps
                .increment_counter(step.id, StepCounter::Sent)
                .await?;
            if self.repos.enrollments.record_contacted(enrollment.id, now).await? {
                self.repos
                    .campaigns
                    .increment_counter(campaign.id, CampaignCounter::Contacted)
                    .await?;
            }

            if !self
                .transition(enrollment, next_transition(step, steps, now))
                .await?
            {
                warn!(enrollment_id = %enrollment.id, "Sent, but enrollment changed concurrently");
            }
            return Ok(EnrollmentOutcome::Sent);
        }

        self.metrics.record_send_failure(channel.to_string().as_str());
        let error = outcome
            .error
            .clone()
            .unwrap_or_else(|| "Unknown send failure".to_string());
        self.repos
            .messages
            .create(CreateMessage {
                tracking_id: token,
                campaign_id: Some(campaign.id),
                step_id: Some(step.id),
                contact_id: Some(contact.id),
                account_id: Some(account.id),
                channel,
                subject: request.subject.clone(),
                provider_message_id: None,
                status: if outcome.bounced {
                    MessageStatus::Bounced
                } else {
                    MessageStatus::Failed
                },
                error: Some(error.clone()),
                sent_at: None,
            })
            .await?;

        if outcome.bounced {
            warn!(contact_id = %contact.id, "Recipient rejected permanently: {}", error);
            self.repos
                .contacts
                .mark_terminal(contact.id, ContactStatus::Bounced)
                .await?;
            self.repos
                .enrollments
                .deactivate_for_contact(contact.id)
                .await?;
            self.repos
                .warmup_logs
                .upsert_increment(account.id, now.date_naive(), WarmupLogDelta::bounce())
                .await?;
            return Ok(EnrollmentOutcome::Deactivated);
        }

        warn!(enrollment_id = %enrollment.id, account_id = %account.id, "Send failed: {}", error);
        self.record_failure(enrollment, &error).await
    }

    #[allow(clippy::too_many_arguments)]
    fn build_request(
        &self,
        campaign: &Campaign,
        step: &CampaignStep,
        channel: Channel,
        contact: &Contact,
        enrollment: &CampaignContact,
        account: &SendingAccount,
        token: &str,
    ) -> SendRequest {
        let unsubscribe_url = self.links.unsubscribe_url(token);
        let ctx = RenderContext {
            contact,
            campaign_name: &campaign.name,
            sender: Some(account),
            variables: &enrollment.variables,
            unsubscribe_url: Some(&unsubscribe_url),
        };

        let subject = step
            .subject
            .as_deref()
            .map(|s| self.renderer.render(s, &ctx));
        let body = self
            .renderer
            .render(step.body.as_deref().unwrap_or_default(), &ctx);
        let html_body = match channel {
            Channel::Email => Some(
                self.links
                    .instrument_html(&TrackingLinks::text_to_html(&body), token),
            ),
            _ => None,
        };

        SendRequest {
            channel,
            action: step.action_enum(),
            account: account.clone(),
            target: SendTarget::from_contact(contact),
            subject,
            body,
            html_body,
        }
    }

    /// Guarded by the step the enrollment was read at
    async fn transition(&self, enrollment: &CampaignContact, transition: StepTransition) -> Result<bool> {
        let applied = self
            .repos
            .enrollments
            .apply_transition(enrollment.id, enrollment.current_step, transition)
            .await?;
        if !applied {
            debug!(enrollment_id = %enrollment.id, "Enrollment changed concurrently");
        }
        Ok(applied)
    }

    async fn record_failure(
        &self,
        enrollment: &CampaignContact,
        error: &str,
    ) -> Result<EnrollmentOutcome> {
        let errors = self.repos.enrollments.record_error(enrollment.id, error).await?;
        if self.max_send_errors > 0 && errors >= self.max_send_errors {
            warn!(
                enrollment_id = %enrollment.id,
                errors,
                "Too many consecutive send failures, deactivating"
            );
            self.repos.enrollments.deactivate(enrollment.id).await?;
            return Ok(EnrollmentOutcome::Deactivated);
        }
        Ok(EnrollmentOutcome::Failed)
    }
}

/// Done with `step`: schedule the following one or complete
fn next_transition(step: &CampaignStep, steps: &[CampaignStep], now: DateTime<Utc>) -> StepTransition {
    match steps.iter().find(|s| s.step_number == step.step_number + 1) {
        Some(next) => StepTransition::advance(step.step_number, now + next.delay()),
        None => StepTransition::complete(step.step_number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{NoCapabilities, SendOutcome};
    use crate::testing::{seed_account, seed_campaign, seed_contact, seed_step, ScriptedSender};
    use chrono::{Duration, TimeZone};
    use outreach_storage::models::{AccountStatus, CreateCampaign, CreateCampaignContact, SchedulePolicy, StepConditions};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        // Monday
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    fn scheduler(repos: &Repositories, sender: Arc<ScriptedSender>, max_send_errors: i32) -> SequenceScheduler {
        SequenceScheduler::new(
            repos.clone(),
            sender,
            Arc::new(NoCapabilities),
            TrackingLinks::new("https://t.example.com"),
            TokenSigner::new("s3cret").unwrap(),
            EngineMetrics::new().unwrap(),
            &SchedulerConfig {
                max_send_errors,
                ..Default::default()
            },
        )
    }

    async fn active_campaign(repos: &Repositories) -> Campaign {
        let campaign = seed_campaign(repos, Channel::Email).await;
        repos
            .campaigns
            .transition_status(campaign.id, &[CampaignStatus::Draft], CampaignStatus::Active)
            .await
            .unwrap();
        campaign
    }

    async fn enroll(repos: &Repositories, campaign: &Campaign, email: &str, at: DateTime<Utc>) -> CampaignContact {
        let contact = seed_contact(repos, email).await;
        repos
            .enrollments
            .create(CreateCampaignContact {
                campaign_id: campaign.id,
                contact_id: contact.id,
                next_action_at: at,
                variables: None,
            })
            .await
            .unwrap()
    }

    async fn reload(repos: &Repositories, enrollment: &CampaignContact) -> CampaignContact {
        repos.enrollments.get(enrollment.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_three_step_sequence_with_unmet_condition() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let step2 = seed_step(
            &repos,
            &campaign,
            2,
            2,
            StepConditions {
                only_if_opened: true,
                ..Default::default()
            },
        )
        .await;
        seed_step(&repos, &campaign, 3, 3, StepConditions::default()).await;
        seed_account(&repos, 50, AccountStatus::Ready).await;
        let enrollment = enroll(&repos, &campaign, "ada@example.org", t0()).await;

        let sender = Arc::new(ScriptedSender::new());
        let scheduler = scheduler(&repos, sender.clone(), 5);

        // Step 1 at T0
        let report = scheduler.run_cycle(campaign.id, t0()).await.unwrap();
        assert_eq!(report.sent, 1);
        let state = reload(&repos, &enrollment).await;
        assert_eq!(state.current_step, 1);
        assert_eq!(state.next_action_at, Some(t0() + Duration::days(2)));

        // Not due yet: nothing happens
        let report = scheduler
            .run_cycle(campaign.id, t0() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(report.due, 0);

        // Step 2 requires an open that never happened
        let t2 = t0() + Duration::days(2);
        let report = scheduler.run_cycle(campaign.id, t2).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.sent, 0);
        let state = reload(&repos, &enrollment).await;
        assert_eq!(state.current_step, 2);
        assert_eq!(state.next_action_at, Some(t2 + Duration::days(3)));

        // Step 3 is the last one
        let report = scheduler
            .run_cycle(campaign.id, t2 + Duration::days(3))
            .await
            .unwrap();
        assert_eq!(report.sent, 1);
        let state = reload(&repos, &enrollment).await;
        assert_eq!(state.current_step, 3);
        assert!(!state.is_active);
        assert_eq!(state.next_action_at, None);

        let steps = repos.steps.list_by_campaign(campaign.id).await.unwrap();
        let sent: Vec<i32> = steps.iter().map(|s| s.sent_count).collect();
        assert_eq!(sent, vec![1, 0, 1]);
        assert_eq!(steps[1].id, step2.id);
        assert_eq!(sender.sent().len(), 2);

        let campaign = repos.campaigns.get(campaign.id).await.unwrap().unwrap();
        assert_eq!(campaign.contacted_count, 1);
    }

    #[tokio::test]
    async fn test_rendered_email_carries_tracking() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let account = seed_account(&repos, 50, AccountStatus::Ready).await;
        let enrollment = enroll(&repos, &campaign, "ada@example.org", t0()).await;
        let sender = Arc::new(ScriptedSender::new());

        scheduler(&repos, sender.clone(), 5)
            .run_cycle(campaign.id, t0())
            .await
            .unwrap();

        let request = &sender.sent()[0];
        assert_eq!(request.subject.as_deref(), Some("Step 1 for Ada"));
        assert_eq!(request.body, "Hi Ada, see https://example.com/deck");
        assert_eq!(request.account.id, account.id);
        assert_eq!(request.target.email, "ada@example.org");

        let history = repos
            .messages
            .list_for_enrollment(campaign.id, enrollment.contact_id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        let html = request.html_body.as_deref().unwrap();
        assert!(html.contains(&format!("https://t.example.com/o/{}", history[0].tracking_id)));
        assert!(html.contains("url=https%3A%2F%2Fexample.com%2Fdeck"));
        assert_eq!(history[0].provider_message_id.as_deref(), Some("<1@test>"));

        let account = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(account.sent_today, 1);
    }

    #[tokio::test]
    async fn test_exhausted_account_defers_everyone() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let account = seed_account(&repos, 5, AccountStatus::Ready).await;
        for _ in 0..5 {
            assert!(repos.accounts.try_increment_sent_today(account.id).await.unwrap());
        }
        let mut enrollments = Vec::new();
        for i in 0..3 {
            enrollments.push(enroll(&repos, &campaign, &format!("lead{}@example.org", i), t0()).await);
        }
        let sender = Arc::new(ScriptedSender::new());

        let report = scheduler(&repos, sender.clone(), 5)
            .run_cycle(campaign.id, t0())
            .await
            .unwrap();

        assert_eq!(report.deferred, 3);
        assert_eq!(report.sent, 0);
        assert!(sender.sent().is_empty());
        for enrollment in &enrollments {
            let state = reload(&repos, enrollment).await;
            assert_eq!(state.current_step, 0);
            assert_eq!(state.next_action_at, Some(t0()));
        }
    }

    #[tokio::test]
    async fn test_round_robin_respects_limits() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        let a = seed_account(&repos, 1, AccountStatus::Ready).await;
        let b = seed_account(&repos, 1, AccountStatus::Warming).await;
        for i in 0..3 {
            enroll(&repos, &campaign, &format!("lead{}@example.org", i), t0()).await;
        }
        let sender = Arc::new(ScriptedSender::new());

        let report = scheduler(&repos, sender.clone(), 5)
            .run_cycle(campaign.id, t0())
            .await
            .unwrap();
        assert_eq!(report.sent, 2);
        assert_eq!(report.deferred, 1);

        let used: Vec<Uuid> = sender.sent().iter().map(|r| r.account.id).collect();
        assert!(used.contains(&a.id) && used.contains(&b.id));
        for id in [a.id, b.id] {
            let account = repos.accounts.get(id).await.unwrap().unwrap();
            assert!(account.sent_today <= account.daily_limit);
        }
    }

    #[tokio::test]
    async fn test_failures_retry_then_deactivate() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        seed_account(&repos, 50, AccountStatus::Ready).await;
        let enrollment = enroll(&repos, &campaign, "ada@example.org", t0()).await;
        let sender = Arc::new(ScriptedSender::new());
        sender.push(SendOutcome::failed("421 try again later"));
        sender.push(SendOutcome::failed("421 try again later"));
        let scheduler = scheduler(&repos, sender, 2);

        let report = scheduler.run_cycle(campaign.id, t0()).await.unwrap();
        assert_eq!(report.failed, 1);
        let state = reload(&repos, &enrollment).await;
        assert_eq!(state.current_step, 0);
        assert!(state.is_active);
        assert_eq!(state.error_count, 1);
        assert_eq!(state.last_error.as_deref(), Some("421 try again later"));

        let report = scheduler.run_cycle(campaign.id, t0()).await.unwrap();
        assert_eq!(report.deactivated, 1);
        assert!(!reload(&repos, &enrollment).await.is_active);
    }

    #[tokio::test]
    async fn test_hard_bounce_at_send_time() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        seed_account(&repos, 50, AccountStatus::Ready).await;
        let enrollment = enroll(&repos, &campaign, "ada@example.org", t0()).await;
        let sender = Arc::new(ScriptedSender::new());
        sender.push(SendOutcome::bounced("550 5.1.1 user unknown"));

        let report = scheduler(&repos, sender, 5)
            .run_cycle(campaign.id, t0())
            .await
            .unwrap();
        assert_eq!(report.deactivated, 1);

        let contact = repos.contacts.get(enrollment.contact_id).await.unwrap().unwrap();
        assert_eq!(contact.status, "bounced");
        assert!(!reload(&repos, &enrollment).await.is_active);
    }

    #[tokio::test]
    async fn test_terminal_contact_is_deactivated_without_sending() {
        let repos = Repositories::in_memory();
        let campaign = active_campaign(&repos).await;
        seed_step(&repos, &campaign, 1, 0, StepConditions::default()).await;
        seed_account(&repos, 50, AccountStatus::Ready).await;
        let enrollment = enroll(&repos, &campaign, "ada@example.org", t0()).await;
        repos
            .contacts
            .mark_terminal(enrollment.contact_id, ContactStatus::Unsubscribed)
            .await
            .unwrap();
        let sender = Arc::new(ScriptedSender::new());

        let report = scheduler(&repos, sender.clone(), 5)
            .run_cycle(campaign.id, t0())
            .await
            .unwrap();
        assert_eq!(report.deactivated, 1);
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_campaign_and_closed_window_are_skipped() {
        let repos = Repositories::in_memory();
        let draft = seed_campaign(&repos, Channel::Email).await;
        seed_step(&repos, &draft, 1, 0, StepConditions::default()).await;
        let sender = Arc::new(ScriptedSender::new());
        let scheduler = scheduler(&repos, sender, 5);

        let report = scheduler.run_cycle(draft.id, t0()).await.unwrap();
        assert_eq!(report.skipped_cycle, Some(CycleSkip::NotActive));

        let office_hours = repos
            .campaigns
            .create(CreateCampaign {
                organization_id: Uuid::nil(),
                name: "Office hours".to_string(),
                channel: Channel::Email,
                schedule: SchedulePolicy::default(),
            })
            .await
            .unwrap();
        repos
            .campaigns
            .transition_status(office_hours.id, &[CampaignStatus::Draft], CampaignStatus::Active)
            .await
            .unwrap();
        seed_step(&repos, &office_hours, 1, 0, StepConditions::default()).await;
        let enrollment = enroll(&repos, &office_hours, "ada@example.org", t0()).await;

        // Saturday
        let saturday = t0() + Duration::days(5);
        let report = scheduler.run_cycle(office_hours.id, saturday).await.unwrap();
        assert_eq!(report.skipped_cycle, Some(CycleSkip::OutsideWindow));
        assert_eq!(reload(&repos, &enrollment).await.next_action_at, Some(t0()));

        let report = scheduler.run_cycle(Uuid::now_v7(), t0()).await.unwrap();
        assert_eq!(report.skipped_cycle, Some(CycleSkip::NotFound));
    }
}
