use crate::error::PrimerError;
use crate::primer::config::CommandsConfig;
use crate::primer::runner::{CommandRunner, CommandSpec, resolve_program};
use crate::primer::schedule::localize;
use crate::primer::util::tail_with_ellipsis;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use std::sync::LazyLock;

const SNIPPET_CHARS: usize = 1200;
const ABSOLUTE_PREFIX: &str = r"(?:Limit\s+resets\s+at|Next\s+reset(?:\s+at)?)\s*[:\-]?\s*";
const RELATIVE_PREFIX: &str = r"Time\s*to\s*Reset\s*[:\-]?\s*";

static ANSI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid ansi pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPattern {
    Absolute12h,
    Absolute24h,
    RelativeClock,
    RelativeHoursMinutes,
}

impl ResetPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute12h => "absolute-12h",
            Self::Absolute24h => "absolute-24h",
            Self::RelativeClock => "relative-clock",
            Self::RelativeHoursMinutes => "relative-hm",
        }
    }
}

static RESET_PATTERNS: LazyLock<Vec<(ResetPattern, Regex)>> = LazyLock::new(|| {
    [
        (
            ResetPattern::Absolute12h,
            format!(r"(?i){ABSOLUTE_PREFIX}(\d{{1,2}}):(\d{{2}})\s*(a\.m\.|p\.m\.|am|pm)"),
        ),
        (
            ResetPattern::Absolute24h,
            format!(r"(?i){ABSOLUTE_PREFIX}(\d{{1,2}}):(\d{{2}})"),
        ),
        (
            ResetPattern::RelativeClock,
            format!(r"(?i){RELATIVE_PREFIX}(\d{{1,2}}):(\d{{2}})(?::(\d{{2}}))?"),
        ),
        (
            ResetPattern::RelativeHoursMinutes,
            format!(r"(?i){RELATIVE_PREFIX}(\d{{1,4}})\s*h\s*(?:(\d{{1,4}})\s*m)?"),
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(&pattern).expect("valid reset pattern")))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorResult {
    pub reset_at: Option<DateTime<Tz>>,
    pub parsed: bool,
    pub pattern: Option<ResetPattern>,
}

impl MonitorResult {
    pub fn unparsed() -> Self {
        Self {
            reset_at: None,
            parsed: false,
            pattern: None,
        }
    }

    fn found(reset_at: DateTime<Tz>, pattern: ResetPattern) -> Self {
        Self {
            reset_at: Some(reset_at),
            parsed: true,
            pattern: Some(pattern),
        }
    }
}

/// Text-extraction port over the quota monitor's report. Never fails: input it
/// cannot read yields `parsed == false`.
pub trait ResetExtractor {
    fn extract(&self, raw: &str, now: &DateTime<Tz>) -> MonitorResult;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl ResetExtractor for PatternExtractor {
    fn extract(&self, raw: &str, now: &DateTime<Tz>) -> MonitorResult {
        parse_reset(raw, now)
    }
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_RE.replace_all(text, "").to_string()
}

fn capture_u32(caps: &Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse::<u32>().ok()
}

/// Next occurrence of `time` strictly after `now`, in `now`'s timezone.
fn next_occurrence(now: &DateTime<Tz>, time: NaiveTime) -> Option<DateTime<Tz>> {
    let tz = now.timezone();
    let today = now.date_naive();
    let target = localize(tz, today, time);
    if target > *now {
        return Some(target);
    }
    let tomorrow = today.succ_opt()?;
    Some(localize(tz, tomorrow, time))
}

fn resolve(kind: ResetPattern, caps: &Captures<'_>, now: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    match kind {
        ResetPattern::Absolute12h => {
            let hour = capture_u32(caps, 1)?;
            let minute = capture_u32(caps, 2)?;
            if !(1..=12).contains(&hour) {
                return None;
            }
            let pm = caps.get(3)?.as_str().to_ascii_lowercase().starts_with('p');
            let hour24 = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            };
            next_occurrence(now, NaiveTime::from_hms_opt(hour24, minute, 0)?)
        }
        ResetPattern::Absolute24h => {
            let time = NaiveTime::from_hms_opt(capture_u32(caps, 1)?, capture_u32(caps, 2)?, 0)?;
            next_occurrence(now, time)
        }
        ResetPattern::RelativeClock => {
            let hours = capture_u32(caps, 1)?;
            let minutes = capture_u32(caps, 2)?;
            let seconds = caps.get(3).map_or(Some(0), |m| m.as_str().parse::<u32>().ok())?;
            if minutes >= 60 || seconds >= 60 {
                return None;
            }
            offset_from(
                now,
                i64::from(hours),
                i64::from(minutes),
                i64::from(seconds),
            )
        }
        ResetPattern::RelativeHoursMinutes => {
            let hours = caps.get(1)?.as_str().parse::<i64>().ok()?;
            let minutes = caps.get(2).map_or(Some(0), |m| m.as_str().parse::<i64>().ok())?;
            offset_from(now, hours, minutes, 0)
        }
    }
}

/// `now` plus a countdown, or `None` when the countdown does not fit.
fn offset_from(
    now: &DateTime<Tz>,
    hours: i64,
    minutes: i64,
    seconds: i64,
) -> Option<DateTime<Tz>> {
    let span = ChronoDuration::try_hours(hours)?
        .checked_add(&ChronoDuration::try_minutes(minutes)?)?
        .checked_add(&ChronoDuration::try_seconds(seconds)?)?;
    now.checked_add_signed(span)
}

/// Extract the next quota reset from a monitor report. The first recognised
/// token wins; absolute times are read in `now`'s timezone and roll to the next
/// day when they are not after `now`.
pub fn parse_reset(raw: &str, now: &DateTime<Tz>) -> MonitorResult {
    let text = strip_ansi(raw);
    for (kind, re) in RESET_PATTERNS.iter() {
        let Some(caps) = re.captures(&text) else {
            continue;
        };
        if let Some(reset_at) = resolve(*kind, &caps, now) {
            return MonitorResult::found(reset_at, *kind);
        }
    }
    MonitorResult::unparsed()
}

pub fn monitor_spec(cfg: &CommandsConfig) -> CommandSpec {
    let (program, args) = resolve_program(&cfg.monitor_bin, &cfg.monitor_args);
    CommandSpec::new(program, args, cfg.monitor_timeout_secs)
}

#[derive(Debug, Clone)]
pub struct MonitorProbe {
    pub result: MonitorResult,
    pub exit_code: Option<i32>,
    pub snippet: String,
    pub error: Option<PrimerError>,
}

/// Run the quota monitor once and extract the reset. Invocation failures and
/// unreadable output are both reported through `error`, never raised.
pub fn probe(
    runner: &dyn CommandRunner,
    extractor: &dyn ResetExtractor,
    cfg: &CommandsConfig,
    now: &DateTime<Tz>,
) -> MonitorProbe {
    let spec = monitor_spec(cfg);
    let output = match runner.run(&spec) {
        Ok(output) => output,
        Err(err) => {
            return MonitorProbe {
                result: MonitorResult::unparsed(),
                exit_code: None,
                snippet: String::new(),
                error: Some(err),
            };
        }
    };

    let combined = output.combined();
    let result = extractor.extract(combined, now);
    let snippet = tail_with_ellipsis(&strip_ansi(combined), SNIPPET_CHARS);
    let error = if result.parsed {
        None
    } else if !output.success() {
        Some(PrimerError::CommandInvocation(format!(
            "`{}` exited with {}",
            spec.display(),
            output.exit_code
        )))
    } else {
        Some(PrimerError::Parse(
            "no reset timestamp in monitor output".to_string(),
        ))
    };

    MonitorProbe {
        result,
        exit_code: Some(output.exit_code),
        snippet,
        error,
    }
}
