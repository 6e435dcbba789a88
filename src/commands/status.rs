use anyhow::Result;

use crate::commands::CommandReport;
use crate::primer::audit::AuditLog;
use crate::primer::config::{PrimerConfig, load_config};
use crate::primer::daemon_lock::{daemon_lock_held, read_daemon_lock_payload};
use crate::primer::paths::resolve_paths;
use crate::primer::runner::SystemRunner;
use crate::primer::util::pid_alive;
use crate::primer::wake_check;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!(
        "primer_home={} explicit={}",
        paths.primer_home.display(),
        paths.primer_home_is_explicit
    ));
    report.detail(format!("config_file={}", paths.config_file.display()));
    report.detail(format!("log_file={}", paths.log_file.display()));
    report.detail(format!("lock_file={}", paths.lock_file.display()));

    match read_daemon_lock_payload(&paths.lock_file)? {
        None => report.detail("daemon=not-running"),
        Some(payload) => {
            let held = daemon_lock_held(&paths.lock_file)?;
            let alive = pid_alive(payload.pid);
            report.detail(format!("daemon.pid={}", payload.pid));
            report.detail(format!(
                "daemon.started_at_epoch_secs={}",
                payload.started_at_epoch_secs
            ));
            report.detail(format!("daemon.lock_held={held}"));
            report.detail(format!("daemon.pid_alive={alive}"));
            if held && alive {
                let current = env!("BUILD_UUID");
                let matches = payload.build_uuid == current;
                report.detail(format!("daemon.build_uuid={}", payload.build_uuid));
                report.detail(format!("daemon.build_match={matches}"));
                if !matches {
                    report.issue(format!(
                        "daemon runs build {} but this binary is {current}; restart the daemon",
                        payload.build_uuid
                    ));
                }
            } else {
                report.detail("daemon=stopped (stale lock payload)");
            }
        }
    }

    match AuditLog::new(&paths.log_file).last_event()? {
        Some(event) => report.detail(format!("last_event={event}")),
        None => report.detail("last_event=none"),
    }

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("{err:#}"));
            return Ok(report);
        }
    };
    report.merge(wake_schedule_report(&cfg)?);
    Ok(report)
}

fn wake_schedule_report(cfg: &PrimerConfig) -> Result<CommandReport> {
    let mut report = CommandReport::new("wake-schedule");
    let plan = cfg.plan()?;
    let expected = wake_check::expected_wake_time(&plan);
    match wake_check::check(&SystemRunner, &cfg.commands.wake_task_name, &expected) {
        None => report.detail("wake_schedule=unsupported-platform"),
        Some(check) if check.found => {
            report.detail(format!("wake_schedule=ok expected={}", check.expected));
        }
        Some(check) => report.issue(format!(
            "no wake timer at {} (rc={}): {}",
            check.expected,
            check
                .exit_code
                .map(|rc| rc.to_string())
                .unwrap_or_else(|| "none".to_string()),
            check.snippet
        )),
    }
    Ok(report)
}
