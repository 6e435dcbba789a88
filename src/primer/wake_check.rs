use crate::primer::runner::{CommandRunner, CommandSpec};
use crate::primer::schedule::{DailyPlan, pre_wake_time};
use crate::primer::util::tail_with_ellipsis;

const CHECK_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeScheduleCheck {
    pub expected: String,
    pub found: bool,
    pub exit_code: Option<i32>,
    pub snippet: String,
}

pub fn wake_schedule_command(task_name: &str) -> Option<CommandSpec> {
    if cfg!(target_os = "macos") {
        Some(CommandSpec::new(
            "pmset",
            vec!["-g".to_string(), "sched".to_string()],
            CHECK_TIMEOUT_SECS,
        ))
    } else if cfg!(windows) {
        Some(CommandSpec::new(
            "schtasks",
            ["/query", "/tn", task_name, "/fo", "LIST"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            CHECK_TIMEOUT_SECS,
        ))
    } else {
        None
    }
}

/// Wall-clock time the external wake timer should fire at, as `HH:MM`.
pub fn expected_wake_time(plan: &DailyPlan) -> String {
    let (at, _) = pre_wake_time(plan.start, plan.pre_wake_minutes);
    at.format("%H:%M").to_string()
}

/// Whether the externally registered wake timer mentions `expected` (HH:MM).
/// Read-only; `None` on platforms without a known wake scheduler.
pub fn check(
    runner: &dyn CommandRunner,
    task_name: &str,
    expected: &str,
) -> Option<WakeScheduleCheck> {
    let spec = wake_schedule_command(task_name)?;
    Some(check_with(runner, &spec, expected))
}

pub fn check_with(
    runner: &dyn CommandRunner,
    spec: &CommandSpec,
    expected: &str,
) -> WakeScheduleCheck {
    match runner.run(spec) {
        Ok(output) => WakeScheduleCheck {
            expected: expected.to_string(),
            found: output.stdout.contains(expected),
            exit_code: Some(output.exit_code),
            snippet: tail_with_ellipsis(output.combined(), 1200),
        },
        Err(err) => WakeScheduleCheck {
            expected: expected.to_string(),
            found: false,
            exit_code: None,
            snippet: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrimerError;
    use crate::primer::config::PrimerConfig;
    use crate::primer::runner::CommandOutput;

    struct SchedRunner(&'static str);

    impl CommandRunner for SchedRunner {
        fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput, PrimerError> {
            Ok(CommandOutput {
                exit_code: 0,
                stdout: self.0.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[test]
    fn finds_expected_wake_time() {
        let spec = CommandSpec::new("pmset", Vec::new(), 5);
        let runner =
            SchedRunner("Repeating power events:\n  wakepoweron at 5:58AM every day\n 05:58");
        let check = check_with(&runner, &spec, "05:58");
        assert!(check.found);
        assert_eq!(check.exit_code, Some(0));

        let missing = check_with(&SchedRunner("No scheduled events."), &spec, "05:58");
        assert!(!missing.found);
    }

    #[test]
    fn expected_wake_time_is_pre_wake_of_start() {
        let cfg = PrimerConfig {
            start_time: "00:01".to_string(),
            ..PrimerConfig::default()
        };
        assert_eq!(expected_wake_time(&cfg.plan().expect("plan")), "23:59");
        assert_eq!(
            expected_wake_time(&PrimerConfig::default().plan().expect("plan")),
            "05:58"
        );
    }
}
