//! Warmup runs: one untracked partner exchange per job invocation

use super::health::{HealthScore, HEALTH_WINDOW_DAYS};
use super::ramp::{RampTable, RAMP_DAYS};
use crate::channels::{ChannelSender, SendRequest, SendTarget};
use crate::humanize::HumanDelay;
use crate::metrics::EngineMetrics;
use crate::queue::{Job, JobOutcome, WarmupJob};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use outreach_common::types::{AccountId, Channel, ChannelAction};
use outreach_storage::models::{AccountStatus, SendingAccount, WarmupLogDelta, WarmupUpdate};
use outreach_storage::repository::Repositories;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const EXCHANGE_TEMPLATES: &[(&str, &str)] = &[
    (
        "Quick question about next week",
        "Hi,\n\nAre we still on for the sync next week? Let me know what works.\n\nThanks",
    ),
    (
        "Notes from today",
        "Hey,\n\nSharing my notes from today. Nothing urgent, just for reference.\n\nBest",
    ),
    (
        "Following up",
        "Hi there,\n\nJust following up on my last note. Happy to chat whenever.\n\nCheers",
    ),
    (
        "Lunch on Thursday?",
        "Hi,\n\nWould Thursday work for lunch? I can book a table nearby.\n\nThanks",
    ),
    (
        "Document review",
        "Hello,\n\nCould you take a look at the document when you get a chance?\n\nRegards",
    ),
];

/// Progress of one warmup day, carried in the job payload between exchanges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupSession {
    pub day: NaiveDate,
    /// Number drawn from the ramp entry
    pub target: u32,
    /// Partner per exchange: shuffled, cycled, at most partners x 3 long
    pub plan: Vec<AccountId>,
    pub next: usize,
    pub sent: u32,
}

impl WarmupSession {
    /// Build today's plan from the drawn target and the available partners
    pub fn plan<R: Rng + ?Sized>(
        day: NaiveDate,
        target: u32,
        mut partners: Vec<AccountId>,
        rng: &mut R,
    ) -> Self {
        partners.shuffle(rng);
        let attempts = (target as usize).min(partners.len() * 3);
        let plan = partners.iter().copied().cycle().take(attempts).collect();
        Self {
            day,
            target,
            plan,
            next: 0,
            sent: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.plan.len()
    }
}

/// Drives `warming` accounts through the ramp
pub struct WarmupEngine {
    repos: Repositories,
    sender: Arc<dyn ChannelSender>,
    pacing: HumanDelay,
    metrics: EngineMetrics,
}

impl WarmupEngine {
    pub fn new(
        repos: Repositories,
        sender: Arc<dyn ChannelSender>,
        pacing: HumanDelay,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            repos,
            sender,
            pacing,
            metrics,
        }
    }

    /// Handle one warmup job: plan the day, send one exchange, or finish the day
    pub async fn run(&self, job: WarmupJob, now: DateTime<Utc>) -> Result<JobOutcome> {
        let account = self
            .repos
            .accounts
            .get(job.account_id)
            .await?
            .ok_or_else(|| anyhow!("Sending account {} not found", job.account_id))?;

        if account.status_enum() != Some(AccountStatus::Warming) || !account.is_active {
            debug!(account_id = %account.id, status = %account.status, "Account is not warming, skipping");
            return Ok(JobOutcome::Done);
        }

        let day = job.session.as_ref().map_or(now.date_naive(), |s| s.day);
        if account.warmed_on(day) {
            debug!(account_id = %account.id, day = %day, "Warmup already finished for the day");
            return Ok(JobOutcome::Done);
        }

        let mut session = match job.session {
            Some(session) => session,
            None => self.plan_day(&account, now.date_naive()).await?,
        };

        if !session.is_finished() {
            self.exchange(&account, &mut session).await?;
        }

        if session.is_finished() {
            self.finish_day(&account, &session).await?;
            return Ok(JobOutcome::Done);
        }

        Ok(JobOutcome::Reschedule {
            job: Job::Warmup(WarmupJob {
                account_id: account.id,
                session: Some(session),
            }),
            after: self.pacing.sample(),
        })
    }

    async fn plan_day(&self, account: &SendingAccount, day: NaiveDate) -> Result<WarmupSession> {
        // `warmup_day` counts finished days; today runs the next ramp entry
        let ramp_day = account.warmup_day + 1;
        let entry = RampTable::entry(ramp_day);
        let partners: Vec<AccountId> = self
            .repos
            .accounts
            .list_by_status(AccountStatus::Warming)
            .await?
            .into_iter()
            .filter(|p| p.id != account.id && p.channel_enum() == Some(Channel::Email))
            .map(|p| p.id)
            .collect();

        let session = {
            let mut rng = rand::thread_rng();
            let target = rng.gen_range(entry.min..=entry.max);
            WarmupSession::plan(day, target, partners, &mut rng)
        };

        info!(
            account_id = %account.id,
            ramp_day,
            target = session.target,
            exchanges = session.plan.len(),
            "Planned warmup day"
        );
        Ok(session)
    }

    async fn exchange(&self, account: &SendingAccount, session: &mut WarmupSession) -> Result<()> {
        let partner_id = session.plan[session.next];
        session.next += 1;

        let Some(partner) = self.repos.accounts.get(partner_id).await? else {
            warn!(account_id = %account.id, partner_id = %partner_id, "Warmup partner disappeared");
            return Ok(());
        };

        let (subject, body) = EXCHANGE_TEMPLATES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(EXCHANGE_TEMPLATES[0]);

        let request = SendRequest {
            channel: Channel::Email,
            action: ChannelAction::Send,
            account: account.clone(),
            target: SendTarget {
                email: partner.email.clone(),
                name: partner.display_name.clone(),
                profile_url: None,
            },
            subject: Some(subject.to_string()),
            body: body.to_string(),
            html_body: None,
        };

        let outcome = self.sender.send(&request).await;
        if outcome.success {
            session.sent += 1;
            self.repos
                .warmup_logs
                .upsert_increment(account.id, session.day, WarmupLogDelta::sent(1))
                .await?;
            self.repos
                .warmup_logs
                .upsert_increment(
                    partner.id,
                    session.day,
                    WarmupLogDelta {
                        emails_received: 1,
                        ..Default::default()
                    },
                )
                .await?;
        } else {
            warn!(
                account_id = %account.id,
                partner_id = %partner.id,
                "Warmup exchange failed: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            if outcome.bounced {
                self.repos
                    .warmup_logs
                    .upsert_increment(account.id, session.day, WarmupLogDelta::bounce())
                    .await?;
            }
        }
        Ok(())
    }

    async fn finish_day(&self, account: &SendingAccount, session: &WarmupSession) -> Result<()> {
        // Make sure the day has a row even when nothing went out
        self.repos
            .warmup_logs
            .upsert_increment(account.id, session.day, WarmupLogDelta::default())
            .await?;

        let warmup_day = account.warmup_day + 1;
        let entry = RampTable::entry(warmup_day);
        let status = if warmup_day >= RAMP_DAYS {
            AccountStatus::Ready
        } else {
            AccountStatus::Warming
        };

        let recorded = self
            .repos
            .accounts
            .update_warmup(
                account.id,
                WarmupUpdate {
                    day: session.day,
                    warmup_day,
                    daily_limit: entry.max as i32,
                    status,
                },
            )
            .await?;
        if !recorded {
            warn!(account_id = %account.id, day = %session.day, "Warmup day was already recorded");
            return Ok(());
        }

        let score = self.refresh_health(account.id, session.day).await?;

        info!(
            account_id = %account.id,
            warmup_day,
            daily_limit = entry.max,
            sent = session.sent,
            health_score = score,
            status = %status,
            "Warmup day finished"
        );
        Ok(())
    }

    /// Recompute reputation over the trailing window and publish the gauge
    pub async fn refresh_health(&self, account_id: AccountId, today: NaiveDate) -> Result<f64> {
        let since = today - Duration::days(HEALTH_WINDOW_DAYS - 1);
        let logs = self.repos.warmup_logs.list_since(account_id, since).await?;
        let reputation = HealthScore::reputation(&logs);

        self.repos
            .accounts
            .update_reputation(account_id, reputation)
            .await?;
        self.repos
            .warmup_logs
            .set_health_score(account_id, today, reputation.health_score)
            .await?;
        self.metrics
            .set_account_health(account_id, reputation.health_score);

        Ok(reputation.health_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::SendOutcome;
    use crate::testing::{seed_account, ScriptedSender};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn engine(repos: &Repositories, sender: Arc<ScriptedSender>) -> WarmupEngine {
        WarmupEngine::new(
            repos.clone(),
            sender,
            HumanDelay::minutes(5, 15),
            EngineMetrics::new().unwrap(),
        )
    }

    async fn run_to_completion(engine: &WarmupEngine, account_id: AccountId) -> usize {
        run_day(engine, account_id, Utc::now()).await
    }

    async fn run_day(engine: &WarmupEngine, account_id: AccountId, now: DateTime<Utc>) -> usize {
        let mut job = WarmupJob {
            account_id,
            session: None,
        };
        let mut invocations = 0;
        loop {
            invocations += 1;
            match engine.run(job.clone(), now).await.unwrap() {
                JobOutcome::Done => return invocations,
                JobOutcome::Reschedule { job: Job::Warmup(next), after } => {
                    assert!(after >= std::time::Duration::from_secs(5 * 60));
                    assert!(after <= std::time::Duration::from_secs(15 * 60));
                    job = next;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[test]
    fn test_plan_cycles_partners_with_bound() {
        let mut rng = StdRng::seed_from_u64(7);
        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let partners = vec![Uuid::now_v7(), Uuid::now_v7()];

        let session = WarmupSession::plan(day, 5, partners.clone(), &mut rng);
        assert_eq!(session.plan.len(), 5);
        assert!(session.plan.iter().all(|p| partners.contains(p)));

        // Bounded to partners x 3
        let session = WarmupSession::plan(day, 50, partners.clone(), &mut rng);
        assert_eq!(session.plan.len(), 6);

        let session = WarmupSession::plan(day, 50, Vec::new(), &mut rng);
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_day_one_run_sends_and_advances() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 3, AccountStatus::Warming).await;
        let partner_a = seed_account(&repos, 3, AccountStatus::Warming).await;
        let partner_b = seed_account(&repos, 3, AccountStatus::Warming).await;
        let sender = Arc::new(ScriptedSender::new());

        let invocations = run_to_completion(&engine(&repos, sender.clone()), account.id).await;

        // Day one draws 2 or 3 exchanges, one per invocation
        let sent = sender.sent();
        assert!((2..=3).contains(&sent.len()));
        assert_eq!(invocations, sent.len());
        assert!(sent.iter().all(|r| r.html_body.is_none()));
        assert!(sent
            .iter()
            .all(|r| r.target.email == partner_a.email || r.target.email == partner_b.email));

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(updated.warmup_day, 1);
        assert_eq!(updated.daily_limit, 3);
        assert_eq!(updated.status, "warming");

        let today = Utc::now().date_naive();
        let logs = repos.warmup_logs.list_since(account.id, today).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].emails_sent as usize, sent.len());
        assert!(logs[0].health_score.is_some());
    }

    #[tokio::test]
    async fn test_no_partners_still_finishes_day() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 3, AccountStatus::Warming).await;
        let sender = Arc::new(ScriptedSender::new());

        let invocations = run_to_completion(&engine(&repos, sender.clone()), account.id).await;
        assert_eq!(invocations, 1);
        assert!(sender.sent().is_empty());

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(updated.warmup_day, 1);
    }

    #[tokio::test]
    async fn test_last_ramp_day_becomes_ready() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 96, AccountStatus::Warming).await;
        repos
            .accounts
            .update_warmup(
                account.id,
                WarmupUpdate {
                    day: Utc::now().date_naive() - Duration::days(1),
                    warmup_day: RAMP_DAYS - 1,
                    daily_limit: 96,
                    status: AccountStatus::Warming,
                },
            )
            .await
            .unwrap();

        run_to_completion(&engine(&repos, Arc::new(ScriptedSender::new())), account.id).await;

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(updated.warmup_day, RAMP_DAYS);
        assert_eq!(updated.daily_limit, 100);
        assert_eq!(updated.status, "ready");

        // Ready accounts are left alone
        let outcome = engine(&repos, Arc::new(ScriptedSender::new()))
            .run(WarmupJob { account_id: account.id, session: None }, Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Done);
        let again = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(again.warmup_day, RAMP_DAYS);
    }

    #[tokio::test]
    async fn test_bounced_exchange_hurts_health() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 3, AccountStatus::Warming).await;
        seed_account(&repos, 3, AccountStatus::Warming).await;
        let sender = Arc::new(ScriptedSender::new());
        for _ in 0..3 {
            sender.push(SendOutcome::bounced("550 mailbox unavailable"));
        }

        run_to_completion(&engine(&repos, sender), account.id).await;

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert!(updated.health_score < 100.0);
    }

    #[tokio::test]
    async fn test_second_run_on_same_day_does_nothing() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 3, AccountStatus::Warming).await;
        seed_account(&repos, 3, AccountStatus::Warming).await;
        let sender = Arc::new(ScriptedSender::new());
        let engine = engine(&repos, sender.clone());

        run_to_completion(&engine, account.id).await;
        let sent = sender.sent().len();

        // A restart re-dispatches the day's job
        assert_eq!(run_to_completion(&engine, account.id).await, 1);
        assert_eq!(sender.sent().len(), sent);

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(updated.warmup_day, 1);
        assert_eq!(updated.daily_limit, 3);
        assert_eq!(updated.last_warmup_on, Some(Utc::now().date_naive()));

        let today = Utc::now().date_naive();
        let logs = repos.warmup_logs.list_since(account.id, today).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].emails_sent as usize, sent);

        // A session left over from the finished day is dropped too
        let stale = WarmupJob {
            account_id: account.id,
            session: Some(WarmupSession::plan(
                today,
                3,
                vec![Uuid::now_v7()],
                &mut StdRng::seed_from_u64(1),
            )),
        };
        assert_eq!(engine.run(stale, Utc::now()).await.unwrap(), JobOutcome::Done);
        assert_eq!(sender.sent().len(), sent);
    }

    #[tokio::test]
    async fn test_ramp_walks_every_entry_once() {
        let repos = Repositories::in_memory();
        let account = seed_account(&repos, 3, AccountStatus::Warming).await;
        seed_account(&repos, 3, AccountStatus::Warming).await;
        let engine = engine(&repos, Arc::new(ScriptedSender::new()));
        let start = Utc::now() - Duration::days(RAMP_DAYS as i64);

        for day in 1..=RAMP_DAYS {
            let now = start + Duration::days(day as i64);
            run_day(&engine, account.id, now).await;

            let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
            assert_eq!(updated.warmup_day, day);
            assert_eq!(updated.daily_limit, RampTable::entry(day).max as i32);
            let expected = if day == RAMP_DAYS { "ready" } else { "warming" };
            assert_eq!(updated.status, expected);
        }

        let updated = repos.accounts.get(account.id).await.unwrap().unwrap();
        assert_eq!(updated.daily_limit, 100);
    }
}
