use anyhow::Result;
use chrono::Utc;

use crate::commands::CommandReport;
use crate::primer::config::load_config;
use crate::primer::monitor::{self, PatternExtractor};
use crate::primer::runner::SystemRunner;

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let plan = cfg.plan()?;
    let now = Utc::now().with_timezone(&plan.tz);
    let mut report = CommandReport::new("next-reset");

    let probe = monitor::probe(&SystemRunner, &PatternExtractor, &cfg.commands, &now);
    if let Some(rc) = probe.exit_code {
        report.detail(format!("rc={rc}"));
    }
    match probe.result.reset_at {
        Some(reset_at) => {
            report.detail(format!("reset_at={}", reset_at.to_rfc3339()));
            if let Some(pattern) = probe.result.pattern {
                report.detail(format!("pattern={}", pattern.as_str()));
            }
            report.detail(format!(
                "seconds_until_reset={}",
                (reset_at - now).num_seconds().max(0)
            ));
        }
        None => {
            let err_text = probe
                .error
                .map(|err| format!("code={} {err}", err.code()))
                .unwrap_or_else(|| "no reset timestamp in monitor output".to_string());
            report.issue(err_text);
            if !probe.snippet.trim().is_empty() {
                report.detail(format!("snippet={}", probe.snippet));
            }
        }
    }
    Ok(report)
}
