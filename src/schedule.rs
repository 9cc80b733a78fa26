//! Send-window and per-target gating rules.
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};

use crate::model::{Campaign, OutreachTarget};

/// True iff `now`, read on `clock`, falls on the campaign's weekday and hour.
pub fn is_due(campaign: &Campaign, now: DateTime<Utc>, clock: &FixedOffset) -> bool {
    let local = now.with_timezone(clock);
    local.weekday().num_days_from_sunday() == u32::from(campaign.weekday)
        && local.hour() == u32::from(campaign.hour)
}

/// Clock used for send windows; out-of-range offsets fall back to UTC.
pub fn schedule_clock(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    CapReached,
    CoolingDown,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

pub fn is_eligible(
    target: &OutreachTarget,
    campaign: &Campaign,
    immediate: bool,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Eligibility {
    if immediate {
        return Eligibility::Eligible;
    }
    if let Some(max) = campaign.max_sends {
        if target.send_count >= max {
            return Eligibility::CapReached;
        }
    }
    if let Some(last) = target.last_sent_at {
        if now - last < cooldown {
            return Eligibility::CoolingDown;
        }
    }
    Eligibility::Eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn campaign(weekday: u8, hour: u8, max_sends: Option<i64>) -> Campaign {
        Campaign {
            id: "c".into(),
            user_id: "u".into(),
            template_id: "t".into(),
            industry: "HVAC".into(),
            is_active: true,
            weekday,
            hour,
            max_sends,
        }
    }

    fn target(send_count: i64, last_sent_at: Option<DateTime<Utc>>) -> OutreachTarget {
        OutreachTarget {
            id: "t".into(),
            campaign_id: "c".into(),
            company_id: "co".into(),
            send_count,
            last_sent_at,
        }
    }

    // 2024-01-02 is a Tuesday.
    fn tuesday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, hour, minute, 0).unwrap()
    }

    #[test]
    fn due_only_in_matching_weekday_and_hour() {
        let utc = schedule_clock(0);
        let c = campaign(2, 10, None);
        assert!(is_due(&c, tuesday(10, 0), &utc));
        assert!(is_due(&c, tuesday(10, 59), &utc));
        assert!(!is_due(&c, tuesday(11, 0), &utc));
        assert!(!is_due(&c, tuesday(10, 0) + Duration::days(1), &utc));
    }

    #[test]
    fn sunday_is_zero() {
        let utc = schedule_clock(0);
        // 2024-01-07 is a Sunday.
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 0, 30, 0).unwrap();
        assert!(is_due(&campaign(0, 0, None), sunday, &utc));
        assert!(is_due(&campaign(6, 23, None), sunday - Duration::hours(1), &utc));
    }

    #[test]
    fn offset_shifts_the_window() {
        // 10:00 UTC is 05:00 at UTC-5.
        let est = schedule_clock(-5 * 60);
        assert!(is_due(&campaign(2, 5, None), tuesday(10, 0), &est));
        assert!(!is_due(&campaign(2, 10, None), tuesday(10, 0), &est));
    }

    #[test]
    fn immediate_bypasses_every_rule() {
        let now = tuesday(10, 0);
        let t = target(5, Some(now - Duration::hours(1)));
        let e = is_eligible(&t, &campaign(2, 10, Some(3)), true, now, Duration::days(7));
        assert_eq!(e, Eligibility::Eligible);
    }

    #[test]
    fn cap_is_checked_before_cooldown() {
        let now = tuesday(10, 0);
        let c = campaign(2, 10, Some(3));
        let t = target(3, Some(now - Duration::days(1)));
        assert_eq!(is_eligible(&t, &c, false, now, Duration::days(7)), Eligibility::CapReached);
        let t = target(2, None);
        assert!(is_eligible(&t, &c, false, now, Duration::days(7)).is_eligible());
    }

    #[test]
    fn no_cap_means_unlimited() {
        let now = tuesday(10, 0);
        let t = target(1_000, None);
        assert!(is_eligible(&t, &campaign(2, 10, None), false, now, Duration::days(7)).is_eligible());
    }

    #[test]
    fn cooldown_boundary() {
        let now = tuesday(10, 0);
        let c = campaign(2, 10, None);
        let recent = target(1, Some(now - Duration::days(7) + Duration::seconds(1)));
        assert_eq!(
            is_eligible(&recent, &c, false, now, Duration::days(7)),
            Eligibility::CoolingDown
        );
        let old = target(1, Some(now - Duration::days(7)));
        assert!(is_eligible(&old, &c, false, now, Duration::days(7)).is_eligible());
    }
}
