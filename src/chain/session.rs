//! Market-session clock.
//!
//! Classifies a wall-clock instant against the weekday trading window of the
//! reference exchange (IST, UTC+05:30):
//!
//! | Local time (Mon–Fri) | Status |
//! |---|---|
//! | before 09:00 | `Closed`, counting down to open |
//! | 09:00 – 09:15 | `PreOpen`, counting down to open |
//! | 09:15 – 15:15 | `Open`, counting down to close |
//! | 15:15 – 15:30 | `ClosingSoon`, counting down to close |
//! | from 15:30 | `Closed`, counting down to the next weekday open |
//!
//! Saturdays and Sundays are `Closed` all day. Exchange holidays are not
//! modelled.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Timelike, Weekday};
use serde::Serialize;

use crate::constants::session::{
    CLOSE_MINUTE, CLOSING_SOON_MINUTES, OPEN_MINUTE, PRE_OPEN_MINUTE, UTC_OFFSET_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionStatus {
    Open,
    Closed,
    PreOpen,
    ClosingSoon,
}

/// Session status plus the countdown that goes with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarketSession {
    pub status: SessionStatus,
    /// Minutes until the close (`Open`, `ClosingSoon`) or until the next
    /// open (`Closed`, `PreOpen`).
    pub countdown_minutes: i64,
}

/// Exchange-local timezone.
pub const EXCHANGE_OFFSET: FixedOffset = match FixedOffset::east_opt(UTC_OFFSET_SECS) {
    Some(offset) => offset,
    None => panic!("exchange UTC offset out of range"),
};

impl MarketSession {
    /// Classify `now` (any timezone) against the trading window.
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let local = now.with_timezone(&EXCHANGE_OFFSET);
        let minute = local.hour() * 60 + local.minute();
        let trading_day = is_weekday(local.weekday());

        if trading_day && (OPEN_MINUTE..CLOSE_MINUTE).contains(&minute) {
            let to_close = i64::from(CLOSE_MINUTE - minute);
            let status = if to_close <= i64::from(CLOSING_SOON_MINUTES) {
                SessionStatus::ClosingSoon
            } else {
                SessionStatus::Open
            };
            return Self {
                status,
                countdown_minutes: to_close,
            };
        }

        let status = if trading_day && (PRE_OPEN_MINUTE..OPEN_MINUTE).contains(&minute) {
            SessionStatus::PreOpen
        } else {
            SessionStatus::Closed
        };
        Self {
            status,
            countdown_minutes: minutes_to_next_open(&local),
        }
    }

    pub fn is_trading(&self) -> bool {
        matches!(self.status, SessionStatus::Open | SessionStatus::ClosingSoon)
    }
}

fn is_weekday(day: Weekday) -> bool {
    !matches!(day, Weekday::Sat | Weekday::Sun)
}

fn minutes_to_next_open(local: &DateTime<FixedOffset>) -> i64 {
    let open = NaiveTime::from_hms_opt(OPEN_MINUTE / 60, OPEN_MINUTE % 60, 0)
        .unwrap_or(NaiveTime::MIN);
    let now_minute = local.hour() * 60 + local.minute();

    let mut date = local.date_naive();
    if now_minute >= OPEN_MINUTE {
        date += Duration::days(1);
    }
    while !is_weekday(date.weekday()) {
        date += Duration::days(1);
    }

    let open_at = date.and_time(open);
    let now_naive = local
        .naive_local()
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local.naive_local());
    (open_at - now_naive).num_minutes()
}
