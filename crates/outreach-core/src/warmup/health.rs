//! Health score over a trailing window of warmup logs

use outreach_storage::models::{Reputation, WarmupLog};

/// Days of warmup logs considered by the score
pub const HEALTH_WINDOW_DAYS: i64 = 30;

const BOUNCE_PENALTY: f64 = 2.0;
const SPAM_PENALTY: f64 = 10.0;
const REPLY_BONUS: f64 = 0.5;
const REPLY_BONUS_CAP: f64 = 10.0;
const CONSISTENCY_BONUS: f64 = 0.2;
const CONSISTENCY_BONUS_CAP: f64 = 6.0;

/// Summed counters of a log window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTotals {
    pub sent: i64,
    pub received: i64,
    pub bounces: i64,
    pub spam_reports: i64,
    pub replies: i64,
    /// Days with at least one warmup email sent
    pub active_days: i64,
}

impl WindowTotals {
    pub fn from_logs(logs: &[WarmupLog]) -> Self {
        logs.iter().fold(Self::default(), |mut totals, log| {
            totals.sent += log.emails_sent as i64;
            totals.received += log.emails_received as i64;
            totals.bounces += log.bounces as i64;
            totals.spam_reports += log.spam_reports as i64;
            totals.replies += log.replies_sent as i64;
            if log.emails_sent > 0 {
                totals.active_days += 1;
            }
            totals
        })
    }
}

/// 0-100 reputation score
pub struct HealthScore;

impl HealthScore {
    pub fn from_totals(totals: &WindowTotals) -> f64 {
        let score = 100.0
            - BOUNCE_PENALTY * totals.bounces as f64
            - SPAM_PENALTY * totals.spam_reports as f64
            + (REPLY_BONUS * totals.replies as f64).min(REPLY_BONUS_CAP)
            + (CONSISTENCY_BONUS * totals.active_days as f64).min(CONSISTENCY_BONUS_CAP);
        score.clamp(0.0, 100.0)
    }

    pub fn compute(logs: &[WarmupLog]) -> f64 {
        Self::from_totals(&WindowTotals::from_logs(logs))
    }

    /// Score plus delivery, bounce and reply rates (fractions of sent)
    pub fn reputation(logs: &[WarmupLog]) -> Reputation {
        let totals = WindowTotals::from_logs(logs);
        let rate = |n: i64| {
            if totals.sent > 0 {
                (n as f64 / totals.sent as f64).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };

        Reputation {
            health_score: Self::from_totals(&totals),
            delivery_rate: rate(totals.sent - totals.bounces),
            bounce_rate: rate(totals.bounces),
            reply_rate: rate(totals.replies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn log(day: u32, sent: i32, bounces: i32, spam: i32, replies: i32) -> WarmupLog {
        WarmupLog {
            id: Uuid::now_v7(),
            account_id: Uuid::nil(),
            log_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            emails_sent: sent,
            emails_received: 0,
            bounces,
            spam_reports: spam,
            replies_sent: replies,
            health_score: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_penalties_and_bonuses() {
        // 100 - 2*2 - 10*1 + 0.5*4 + 0.2*2
        let score = HealthScore::compute(&[log(1, 10, 2, 1, 0), log(2, 10, 0, 0, 4)]);
        assert!((score - 88.4).abs() < 1e-9);
    }

    #[test]
    fn test_bonuses_are_capped() {
        let logs: Vec<_> = (1..=30).map(|d| log(d, 5, 0, 0, 10)).collect();
        assert_eq!(HealthScore::compute(&logs), 100.0);

        let totals = WindowTotals::from_logs(&logs);
        assert_eq!(totals.active_days, 30);
        assert_eq!(totals.replies, 300);
    }

    #[test]
    fn test_score_clamps_at_zero() {
        assert_eq!(HealthScore::compute(&[log(1, 60, 50, 0, 0)]), 0.0);
        assert_eq!(HealthScore::compute(&[log(1, 0, 0, 40, 0)]), 0.0);
    }

    #[test]
    fn test_reputation_rates() {
        let reputation = HealthScore::reputation(&[log(1, 20, 2, 0, 5)]);
        assert!((reputation.delivery_rate - 0.9).abs() < 1e-9);
        assert!((reputation.bounce_rate - 0.1).abs() < 1e-9);
        assert!((reputation.reply_rate - 0.25).abs() < 1e-9);

        let empty = HealthScore::reputation(&[]);
        assert_eq!(empty.health_score, 100.0);
        assert_eq!(empty.bounce_rate, 0.0);
    }
}
