//! Sending-window check in the campaign's timezone

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use outreach_storage::models::SchedulePolicy;
use tracing::warn;

/// Decides whether an instant falls inside a campaign's sending window
pub struct BusinessHoursGate;

impl BusinessHoursGate {
    /// `weekday ∈ days && start_hour <= hour < end_hour`, evaluated in the policy timezone.
    /// An empty day list or an unknown timezone is never open.
    pub fn is_open(policy: &SchedulePolicy, now: DateTime<Utc>) -> bool {
        if policy.days.is_empty() {
            return false;
        }

        let tz: Tz = match policy.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %policy.timezone, "Unknown campaign timezone, window closed");
                return false;
            }
        };

        let local = now.with_timezone(&tz);
        let hour = local.hour();
        policy.days.contains(&local.weekday())
            && policy.start_hour <= hour
            && hour < policy.end_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Weekday};

    fn policy(tz: &str, days: Vec<Weekday>) -> SchedulePolicy {
        SchedulePolicy {
            timezone: tz.to_string(),
            days,
            start_hour: 9,
            end_hour: 17,
        }
    }

    #[test]
    fn test_inside_window() {
        // Monday 2024-03-04 10:30 UTC
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 30, 0).unwrap();
        assert!(BusinessHoursGate::is_open(&policy("UTC", vec![Weekday::Mon]), now));
    }

    #[test]
    fn test_end_hour_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 17, 0, 0).unwrap();
        assert!(!BusinessHoursGate::is_open(&policy("UTC", vec![Weekday::Mon]), now));
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        assert!(BusinessHoursGate::is_open(&policy("UTC", vec![Weekday::Mon]), now));
    }

    #[test]
    fn test_resolves_local_weekday() {
        // Monday 02:00 UTC is still Sunday evening in New York
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 2, 0, 0).unwrap();
        let mut p = policy("America/New_York", vec![Weekday::Sun]);
        p.start_hour = 20;
        p.end_hour = 23;
        assert!(BusinessHoursGate::is_open(&p, now));
    }

    #[test]
    fn test_empty_days_fails_closed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        assert!(!BusinessHoursGate::is_open(&policy("UTC", vec![]), now));
    }

    #[test]
    fn test_unknown_timezone_fails_closed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        assert!(!BusinessHoursGate::is_open(&policy("Mars/Olympus", vec![Weekday::Mon]), now));
    }
}
