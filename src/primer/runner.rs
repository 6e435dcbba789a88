use crate::error::PrimerError;
use crate::primer::util::run_command_with_optional_timeout;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            args,
            timeout_secs,
        }
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout when it carries anything, else stderr.
    pub fn combined(&self) -> &str {
        if self.stdout.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Synchronous command-execution port. Spawn failures and timeouts are errors;
/// a non-zero exit is reported through `CommandOutput::exit_code`.
pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PrimerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, PrimerError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        let output = run_command_with_optional_timeout(&mut cmd, Some(spec.timeout_secs))
            .map_err(|err| {
                PrimerError::CommandInvocation(format!("`{}`: {err:#}", spec.display()))
            })?;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn windows_npm_shim(bin: &str) -> Option<String> {
    if !cfg!(windows) {
        return None;
    }
    let shim = dirs::data_dir()?.join("npm").join(format!("{bin}.cmd"));
    shim.is_file().then(|| shim.display().to_string())
}

/// Resolve `bin` to something spawnable. Explicit paths are taken as-is; bare names
/// go through PATH, then platform fallbacks. Supervisors often start us with a
/// minimal PATH, so on unix an unresolved name is run through a login shell.
pub fn resolve_program(bin: &str, args: &[String]) -> (String, Vec<String>) {
    let bin = bin.trim();
    if Path::new(bin).components().count() > 1 {
        return (bin.to_string(), args.to_vec());
    }
    if let Ok(found) = which::which(bin) {
        return (found.to_string_lossy().to_string(), args.to_vec());
    }
    if let Some(shim) = windows_npm_shim(bin) {
        return (shim, args.to_vec());
    }
    if cfg!(unix) {
        let mut line = vec![bin.to_string()];
        line.extend(args.iter().map(|arg| shell_quote(arg)));
        return (
            "bash".to_string(),
            vec!["-lc".to_string(), line.join(" ")],
        );
    }
    (bin.to_string(), args.to_vec())
}

fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
