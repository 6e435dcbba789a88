use anyhow::Result;
use chrono::Utc;

use crate::commands::CommandReport;
use crate::primer::audit::{AuditEvent, AuditLog, Outcome};
use crate::primer::config::load_config;
use crate::primer::kickoff;
use crate::primer::paths::resolve_paths;
use crate::primer::runner::SystemRunner;
use crate::primer::util::tail_with_ellipsis;

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let plan = cfg.plan()?;
    let log = AuditLog::new(&paths.log_file);
    let now = Utc::now().with_timezone(&plan.tz);
    let mut report = CommandReport::new("kickoff");

    match kickoff::send(&SystemRunner, &cfg) {
        Ok(outcome) => {
            report.detail(format!("cmd={}", outcome.command));
            report.detail(format!("rc={}", outcome.output.exit_code));
            report.detail(format!(
                "stdout={}",
                tail_with_ellipsis(&outcome.output.stdout, 400)
            ));
            log.record(
                AuditEvent::new(&now, "kickoff", Outcome::Ok)
                    .field("rc", outcome.output.exit_code)
                    .field("cmd", outcome.command)
                    .field("trigger", "manual"),
            );
        }
        Err(err) => {
            report.issue(format!("code={} {err}", err.code()));
            log.record(
                AuditEvent::new(&now, "kickoff", Outcome::Failed)
                    .field("error", err.to_string())
                    .field("trigger", "manual"),
            );
        }
    }
    report.detail(format!("log_file={}", log.path().display()));
    Ok(report)
}
