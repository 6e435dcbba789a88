use anyhow::Result;
use chrono::Utc;

use crate::commands::CommandReport;
use crate::primer::audit::{AuditEvent, AuditLog, Outcome};
use crate::primer::clock::SystemClock;
use crate::primer::config::{PrimerConfig, load_config};
use crate::primer::daemon::Daemon;
use crate::primer::daemon_lock::{DaemonLockPayload, acquire_daemon_lock};
use crate::primer::monitor::PatternExtractor;
use crate::primer::paths::resolve_paths;
use crate::primer::runner::{CommandRunner, SystemRunner};
use crate::primer::wake_check;
use crate::primer::wake_lock::ProcessWakeLock;
use crate::primer::warn::{self, WarnEvent};

fn record_wake_schedule(
    runner: &dyn CommandRunner,
    cfg: &PrimerConfig,
    log: &AuditLog,
) -> Result<()> {
    let plan = cfg.plan()?;
    let now = Utc::now().with_timezone(&plan.tz);
    let expected = wake_check::expected_wake_time(&plan);
    let Some(check) = wake_check::check(runner, &cfg.commands.wake_task_name, &expected) else {
        log.record(
            AuditEvent::new(&now, "wake_schedule", Outcome::Skipped)
                .field("reason", "unsupported-platform"),
        );
        return Ok(());
    };

    let outcome = if check.found {
        Outcome::Ok
    } else {
        warn::emit(WarnEvent {
            code: "WAKE_TIMER_MISSING",
            stage: "startup",
            action: "check-wake-schedule",
            outcome: "missing",
            retry: "none",
            reason: "no-wake-timer-at-pre-wake",
            err: &check.snippet,
        });
        Outcome::Failed
    };
    log.record(
        AuditEvent::new(&now, "wake_schedule", outcome)
            .field("expected", check.expected)
            .field("rc", check.exit_code)
            .field("snippet", check.snippet),
    );
    Ok(())
}

pub fn run() -> Result<CommandReport> {
    let cfg = load_config()?;
    let paths = resolve_paths()?;
    let started_at = Utc::now().timestamp().max(0) as u64;
    let payload = DaemonLockPayload::current(&paths, started_at);
    let _daemon_lock = acquire_daemon_lock(&paths.lock_file, &payload)?;

    let log = AuditLog::new(&paths.log_file);
    let runner = SystemRunner;
    let clock = SystemClock;
    let mut wake_lock = ProcessWakeLock::new();
    record_wake_schedule(&runner, &cfg, &log)?;

    let daemon = Daemon::new(
        &cfg,
        &runner,
        &PatternExtractor,
        &clock,
        &mut wake_lock,
        &log,
    )?;
    daemon.run()
}
