use crate::error::PrimerError;
use crate::primer::config::PrimerConfig;
use crate::primer::runner::{CommandOutput, CommandRunner, CommandSpec, resolve_program};

pub fn kickoff_args(prompt: &str, model: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        prompt.to_string(),
        "--output-format".to_string(),
        "json".to_string(),
    ];
    if let Some(model) = model {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    args
}

pub fn kickoff_spec(cfg: &PrimerConfig) -> CommandSpec {
    let args = kickoff_args(cfg.kickoff_prompt.trim(), cfg.model_selector());
    let (program, args) = resolve_program(&cfg.commands.assistant_bin, &args);
    CommandSpec::new(program, args, cfg.commands.kickoff_timeout_secs)
}

#[derive(Debug, Clone)]
pub struct KickoffOutcome {
    pub command: String,
    pub output: CommandOutput,
}

/// Send the keep-alive prompt once. Success is a zero exit code; anything else
/// is a `CommandInvocation` error carrying the exit code and stderr tail.
pub fn send(runner: &dyn CommandRunner, cfg: &PrimerConfig) -> Result<KickoffOutcome, PrimerError> {
    let spec = kickoff_spec(cfg);
    let output = runner.run(&spec)?;
    if !output.success() {
        let stderr = crate::primer::util::tail_with_ellipsis(output.stderr.trim(), 300);
        return Err(PrimerError::CommandInvocation(format!(
            "`{}` exited with {}: {}",
            spec.program, output.exit_code, stderr
        )));
    }
    Ok(KickoffOutcome {
        command: spec.display(),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingRunner {
        exit_code: i32,
        seen: RefCell<Vec<CommandSpec>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PrimerError> {
            self.seen.borrow_mut().push(spec.clone());
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: "{\"result\":\"pong\"}".to_string(),
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "not logged in".to_string()
                },
            })
        }
    }

    fn config_with_bin(model: Option<&str>) -> PrimerConfig {
        let mut cfg = PrimerConfig {
            model: model.map(str::to_string),
            ..PrimerConfig::default()
        };
        cfg.commands.assistant_bin = "/opt/claude/bin/claude".to_string();
        cfg
    }

    #[test]
    fn builds_machine_readable_invocation() {
        assert_eq!(
            kickoff_args("ping", None),
            vec!["-p", "ping", "--output-format", "json"]
        );
        assert_eq!(
            kickoff_args("ping", Some("sonnet")),
            vec!["-p", "ping", "--output-format", "json", "--model", "sonnet"]
        );
    }

    #[test]
    fn sends_configured_prompt_and_model() {
        let runner = RecordingRunner {
            exit_code: 0,
            seen: RefCell::new(Vec::new()),
        };
        let outcome = send(&runner, &config_with_bin(Some("opus"))).expect("kickoff");
        let seen = runner.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].program, "/opt/claude/bin/claude");
        assert_eq!(seen[0].timeout_secs, 60);
        assert!(seen[0].args.ends_with(&["--model".to_string(), "opus".to_string()]));
        assert!(outcome.command.contains("-p ping"));
    }

    #[test]
    fn non_zero_exit_is_invocation_error() {
        let runner = RecordingRunner {
            exit_code: 1,
            seen: RefCell::new(Vec::new()),
        };
        let err = send(&runner, &config_with_bin(None)).expect_err("should fail");
        match err {
            PrimerError::CommandInvocation(msg) => assert!(msg.contains("not logged in")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
