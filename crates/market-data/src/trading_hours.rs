//! Trading-session calendar per provider.
//!
//! Freshness of a snapshot is derived from wall-clock time only: if the
//! provider's exchange session is open now, prices are live, otherwise they
//! are the last close. No network calls are made here.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveTime, Offset, TimeZone, Timelike, Utc, Weekday,
};
use serde::{Deserialize, Serialize};

use crate::models::Freshness;
use crate::provider::{moex::PROVIDER_ID as MOEX_ID, tbank::PROVIDER_ID as TBANK_ID};

const MOSCOW_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    PreMarket,
    AfterHours,
    /// Weekend.
    Closed,
}

/// Weekday session window in a fixed UTC offset. Both bounds are inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradingCalendar {
    utc_offset_secs: i32,
    open_secs: u32,
    close_secs: u32,
}

impl TradingCalendar {
    pub const fn new(utc_offset_secs: i32, open: (u32, u32), close: (u32, u32)) -> Self {
        Self {
            utc_offset_secs,
            open_secs: open.0 * 3600 + open.1 * 60,
            close_secs: close.0 * 3600 + close.1 * 60,
        }
    }

    /// MOEX main session, 10:00-18:45 Moscow time.
    pub const fn moex_main() -> Self {
        Self::new(MOSCOW_OFFSET_SECS, (10, 0), (18, 45))
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| Utc.fix())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        let local = now.with_timezone(&self.offset());
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return SessionStatus::Closed;
        }

        let secs = local.num_seconds_from_midnight();
        if secs < self.open_secs {
            SessionStatus::PreMarket
        } else if secs <= self.close_secs {
            SessionStatus::Open
        } else {
            SessionStatus::AfterHours
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == SessionStatus::Open
    }

    pub fn freshness_at(&self, now: DateTime<Utc>) -> Freshness {
        if self.is_open(now) {
            Freshness::Live
        } else {
            Freshness::LastClose
        }
    }

    /// Start of the next session strictly after today's, skipping weekends.
    pub fn next_open(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let offset = self.offset();
        let local = now.with_timezone(&offset);
        let open = NaiveTime::from_num_seconds_from_midnight_opt(self.open_secs, 0)?;

        (1..=7)
            .map(|days| local.date_naive() + Duration::days(days))
            .find(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .and_then(|d| offset.from_local_datetime(&d.and_time(open)).single())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

const CALENDARS: &[(&str, TradingCalendar)] = &[
    (MOEX_ID, TradingCalendar::moex_main()),
    (TBANK_ID, TradingCalendar::moex_main()),
];

/// Calendar used for a provider's exchange. Unknown providers trade on MOEX hours.
pub fn calendar_for(provider: &str) -> TradingCalendar {
    CALENDARS
        .iter()
        .find(|(id, _)| *id == provider)
        .map(|(_, calendar)| *calendar)
        .unwrap_or_else(TradingCalendar::moex_main)
}
