use crate::primer::audit::{AuditEvent, AuditLog, Outcome};
use crate::primer::runner::{CommandRunner, CommandSpec};
use crate::primer::warn::{self, WarnEvent};
use chrono::DateTime;
use chrono_tz::Tz;

const SLEEP_COMMAND_TIMEOUT_SECS: u64 = 5;

/// Platform command that puts the host to sleep right away.
pub fn system_sleep_command() -> CommandSpec {
    let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
        ("sudo", &["-n", "pmset", "sleepnow"])
    } else if cfg!(windows) {
        ("shutdown", &["/h"])
    } else {
        ("systemctl", &["suspend"])
    };
    CommandSpec::new(
        program,
        args.iter().map(|arg| arg.to_string()).collect(),
        SLEEP_COMMAND_TIMEOUT_SECS,
    )
}

/// Best-effort: request system sleep when `force_sleep` is set. Failures are
/// logged and swallowed; the returned outcome is informational only.
pub fn enter(
    runner: &dyn CommandRunner,
    log: &AuditLog,
    force_sleep: bool,
    at: &DateTime<Tz>,
) -> Outcome {
    if !force_sleep {
        log.record(
            AuditEvent::new(at, "quiet_hours", Outcome::Skipped).field("force_sleep", false),
        );
        return Outcome::Skipped;
    }

    let spec = system_sleep_command();
    let result = runner.run(&spec);
    let (outcome, err) = match &result {
        Ok(output) if output.success() => (Outcome::Ok, None),
        Ok(output) => (
            Outcome::Failed,
            Some(format!("rc={} {}", output.exit_code, output.stderr.trim())),
        ),
        Err(err) => (Outcome::Failed, Some(err.to_string())),
    };

    let mut event = AuditEvent::new(at, "quiet_hours", outcome)
        .field("force_sleep", true)
        .field("cmd", spec.display());
    if let Some(err) = &err {
        event = event.field("error", err.as_str());
        warn::emit(WarnEvent {
            code: "FORCE_SLEEP_FAILED",
            stage: "quiet-hours",
            action: "system-sleep",
            outcome: outcome.as_str(),
            retry: "none",
            reason: "sleep-command-failed",
            err,
        });
    }
    log.record(event);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrimerError;
    use crate::primer::runner::CommandOutput;
    use chrono::TimeZone;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct CountingRunner {
        calls: Cell<u32>,
        fail: bool,
    }

    impl CommandRunner for CountingRunner {
        fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput, PrimerError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(PrimerError::CommandInvocation(
                    "sudo: a password is required".to_string(),
                ));
            }
            Ok(CommandOutput::default())
        }
    }

    fn at() -> DateTime<Tz> {
        chrono_tz::Europe::London
            .with_ymd_and_hms(2026, 10, 19, 23, 0, 0)
            .single()
            .expect("ts")
    }

    #[test]
    fn noop_when_not_forced() {
        let tmp = tempdir().expect("tempdir");
        let log = AuditLog::new(tmp.path().join("primer.log"));
        let runner = CountingRunner {
            calls: Cell::new(0),
            fail: false,
        };
        assert_eq!(enter(&runner, &log, false, &at()), Outcome::Skipped);
        assert_eq!(runner.calls.get(), 0);
    }

    #[test]
    fn failure_is_swallowed_and_logged() {
        let tmp = tempdir().expect("tempdir");
        let log = AuditLog::new(tmp.path().join("primer.log"));
        let runner = CountingRunner {
            calls: Cell::new(0),
            fail: true,
        };
        assert_eq!(enter(&runner, &log, true, &at()), Outcome::Failed);
        assert_eq!(runner.calls.get(), 1);
        let last = log.last_event().expect("read").expect("event");
        assert_eq!(last["event"], "quiet_hours");
        assert_eq!(last["outcome"], "failed");
    }

    #[test]
    fn forced_sleep_runs_platform_command() {
        let tmp = tempdir().expect("tempdir");
        let log = AuditLog::new(tmp.path().join("primer.log"));
        let runner = CountingRunner {
            calls: Cell::new(0),
            fail: false,
        };
        assert_eq!(enter(&runner, &log, true, &at()), Outcome::Ok);
        assert_eq!(runner.calls.get(), 1);
    }
}
