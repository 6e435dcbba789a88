use anyhow::Result;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};

use crate::commands::CommandReport;
use crate::primer::config::load_config;
use crate::primer::schedule::localize;

#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    pub date: Option<NaiveDate>,
}

pub fn run(opts: &ScheduleOptions) -> Result<CommandReport> {
    let cfg = load_config()?;
    let plan = cfg.plan()?;
    let now = Utc::now().with_timezone(&plan.tz);
    let date = opts.date.unwrap_or_else(|| now.date_naive());
    let day = plan.day(date);
    let mut report = CommandReport::new("schedule");

    report.detail(format!("timezone={}", plan.tz.name()));
    report.detail(format!("date={date}"));
    report.detail(format!("weekday={}", date.weekday()));
    report.detail(format!("active={}", day.active));
    report.detail(format!("pre_wake_at={}", day.pre_wake_at.to_rfc3339()));
    report.detail(format!("start_at={}", day.start_at.to_rfc3339()));
    report.detail(format!("sleep_at={}", day.sleep_at.to_rfc3339()));

    let from = match opts.date {
        Some(date) => localize(plan.tz, date, NaiveTime::MIN) - ChronoDuration::seconds(1),
        None => now,
    };
    match plan.next_start_after(&from) {
        Some(next) => report.detail(format!("next_start_at={}", next.start_at.to_rfc3339())),
        None => report.issue("no active day in the week: check weekdays and start/sleep times"),
    }
    Ok(report)
}
