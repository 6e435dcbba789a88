use crate::error::PrimerError;
use crate::primer::config::PrimerConfig;
use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Weekday,
};
use chrono_tz::Tz;

const WEEKDAY_CODES: [char; 7] = ['M', 'T', 'W', 'R', 'F', 'S', 'U'];
const WEEKDAYS_ALIAS: &str = "WEEKDAYS";

/// Active weekdays, one bit per day starting at Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub fn parse(raw: &str) -> Result<Self, PrimerError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized == WEEKDAYS_ALIAS {
            return Ok(Self(0b0001_1111));
        }
        let mut bits = 0u8;
        for ch in normalized.chars() {
            let Some(idx) = WEEKDAY_CODES.iter().position(|code| *code == ch) else {
                return Err(PrimerError::Config(format!(
                    "invalid weekday code `{ch}` in `{}`: use MTWRFSU or WEEKDAYS",
                    raw.trim()
                )));
            };
            bits |= 1 << idx;
        }
        if bits == 0 {
            return Err(PrimerError::Config(
                "weekdays cannot be empty".to_string(),
            ));
        }
        Ok(Self(bits))
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn codes(&self) -> String {
        WEEKDAY_CODES
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.0 & (1 << idx) != 0)
            .map(|(_, code)| *code)
            .collect()
    }
}

pub fn parse_hhmm(raw: &str) -> Result<NaiveTime, PrimerError> {
    let invalid = || PrimerError::Config(format!("invalid time `{}`: expected HH:MM", raw.trim()));
    let (hh, mm) = raw.trim().split_once(':').ok_or_else(invalid)?;
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(hh) || hh.len() > 2 || !digits(mm) || mm.len() != 2 {
        return Err(invalid());
    }
    let hour = hh.parse::<u32>().map_err(|_| invalid())?;
    let minute = mm.parse::<u32>().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Wall-clock time `minutes` before `start`, and whether it falls on the previous day.
pub fn pre_wake_time(start: NaiveTime, minutes: u32) -> (NaiveTime, bool) {
    let (at, overflow_secs) =
        start.overflowing_sub_signed(ChronoDuration::minutes(i64::from(minutes)));
    (at, overflow_secs != 0)
}

/// Resolve a local wall-clock time, skipping forward across a DST gap.
pub fn localize(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + ChronoDuration::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySchedule {
    pub date: NaiveDate,
    pub active: bool,
    pub start_at: DateTime<Tz>,
    pub sleep_at: DateTime<Tz>,
    pub pre_wake_at: DateTime<Tz>,
}

impl DaySchedule {
    pub fn contains(&self, now: &DateTime<Tz>) -> bool {
        self.active && self.start_at <= *now && *now < self.sleep_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPlan {
    pub tz: Tz,
    pub start: NaiveTime,
    pub sleep: NaiveTime,
    pub weekdays: WeekdaySet,
    pub pre_wake_minutes: u32,
}

impl DailyPlan {
    pub fn from_config(cfg: &PrimerConfig) -> Result<Self, PrimerError> {
        let tz = cfg.timezone.trim().parse::<Tz>().map_err(|_| {
            PrimerError::Config(format!("unknown timezone `{}`", cfg.timezone.trim()))
        })?;
        let start = parse_hhmm(&cfg.start_time)?;
        let sleep = parse_hhmm(&cfg.sleep_time)?;
        if sleep < start {
            return Err(PrimerError::Config(format!(
                "sleep_time {} is earlier than start_time {}; windows crossing midnight are not supported",
                cfg.sleep_time.trim(),
                cfg.start_time.trim()
            )));
        }
        Ok(Self {
            tz,
            start,
            sleep,
            weekdays: WeekdaySet::parse(&cfg.weekdays)?,
            pre_wake_minutes: cfg.pre_wake_minutes,
        })
    }

    pub fn day(&self, date: NaiveDate) -> DaySchedule {
        let start_at = localize(self.tz, date, self.start);
        let sleep_at = localize(self.tz, date, self.sleep);
        DaySchedule {
            date,
            active: self.weekdays.contains(date.weekday()) && start_at < sleep_at,
            pre_wake_at: start_at - ChronoDuration::minutes(i64::from(self.pre_wake_minutes)),
            start_at,
            sleep_at,
        }
    }

    pub fn today(&self, now: &DateTime<Tz>) -> DaySchedule {
        self.day(now.date_naive())
    }

    /// The active window `now` falls in, if any.
    pub fn window_containing(&self, now: &DateTime<Tz>) -> Option<DaySchedule> {
        let today = self.today(now);
        today.contains(now).then_some(today)
    }

    /// First active day whose start lies strictly after `now`.
    pub fn next_start_after(&self, now: &DateTime<Tz>) -> Option<DaySchedule> {
        let today = now.date_naive();
        (0..=7)
            .filter_map(|offset| today.checked_add_days(chrono::Days::new(offset)))
            .map(|date| self.day(date))
            .find(|day| day.active && day.start_at > *now)
    }
}
