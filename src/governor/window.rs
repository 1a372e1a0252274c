// Bucket window anchoring for period quotas.

use chrono::{DateTime, Datelike, Duration, Months, TimeZone, Utc};

use crate::domain::QuotaPeriod;

/// Parse an "HH:MM" reset anchor; malformed or absent input means midnight.
fn parse_reset(reset_time: Option<&str>) -> (u32, u32) {
    let Some(raw) = reset_time else {
        return (0, 0);
    };
    let mut parts = raw.splitn(2, ':');
    let hour = parts.next().and_then(|h| h.parse().ok()).unwrap_or(0);
    let minute = parts.next().and_then(|m| m.parse().ok()).unwrap_or(0);
    if hour > 23 || minute > 59 {
        return (0, 0);
    }
    (hour, minute)
}

/// The `[period_start, period_end)` window containing `now`.
///
/// - minute/hour: floored to the boundary.
/// - day: anchored at today's reset time, or yesterday's if `now` precedes it.
/// - month: anchored at the first of the month at the reset time.
pub fn window_for(
    period: QuotaPeriod,
    reset_time: Option<&str>,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    match period {
        QuotaPeriod::Minute => {
            let ts = now.timestamp();
            let start = Utc
                .timestamp_opt(ts - ts.rem_euclid(60), 0)
                .single()
                .unwrap_or(now);
            (start, start + Duration::minutes(1))
        }
        QuotaPeriod::Hour => {
            let ts = now.timestamp();
            let start = Utc
                .timestamp_opt(ts - ts.rem_euclid(3600), 0)
                .single()
                .unwrap_or(now);
            (start, start + Duration::hours(1))
        }
        QuotaPeriod::Day => {
            let (hour, minute) = parse_reset(reset_time);
            let today = now.date_naive();
            let mut anchor = Utc
                .with_ymd_and_hms(today.year(), today.month(), today.day(), hour, minute, 0)
                .single()
                .unwrap_or(now);
            if now < anchor {
                anchor -= Duration::days(1);
            }
            (anchor, anchor + Duration::days(1))
        }
        QuotaPeriod::Month => {
            let (hour, minute) = parse_reset(reset_time);
            let mut anchor = Utc
                .with_ymd_and_hms(now.year(), now.month(), 1, hour, minute, 0)
                .single()
                .unwrap_or(now);
            if now < anchor {
                anchor = anchor.checked_sub_months(Months::new(1)).unwrap_or(anchor);
            }
            let end = anchor.checked_add_months(Months::new(1)).unwrap_or(anchor);
            (anchor, end)
        }
    }
}
