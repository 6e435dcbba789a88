use crate::error::PrimerError;
use std::process::{Child, Command, Stdio};

/// Keeps the host awake while the active window runs.
pub trait WakeLock {
    fn acquire(&mut self) -> Result<(), PrimerError>;
    fn release(&mut self) -> Result<(), PrimerError>;
    /// Whether the lock is still in force. An inhibitor that died counts as released.
    fn held(&mut self) -> bool;
}

/// Holds an inhibitor child process (`caffeinate` on macOS, `systemd-inhibit`
/// elsewhere on unix) or a `powercfg` request override on Windows.
#[derive(Debug, Default)]
pub struct ProcessWakeLock {
    child: Option<Child>,
    windows_override: bool,
}

fn inhibitor_command() -> Option<Command> {
    if cfg!(target_os = "macos") {
        let mut cmd = Command::new("caffeinate");
        cmd.arg("-dimsu");
        Some(cmd)
    } else if cfg!(unix) {
        let mut cmd = Command::new("systemd-inhibit");
        cmd.args([
            "--what=idle:sleep",
            "--who=quota-primer",
            "--why=keeping assistant session primed",
            "sleep",
            "infinity",
        ]);
        Some(cmd)
    } else {
        None
    }
}

fn powercfg_override(enable: bool) -> Result<(), PrimerError> {
    let exe = std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "primer.exe".to_string());
    let mut cmd = Command::new("powercfg");
    cmd.args(["/requestsoverride", "PROCESS", &exe]);
    if enable {
        cmd.arg("SYSTEM");
    }
    let output = crate::primer::util::run_command_with_optional_timeout(&mut cmd, Some(10))
        .map_err(|err| PrimerError::CommandInvocation(format!("powercfg: {err:#}")))?;
    if !output.status.success() {
        return Err(PrimerError::CommandInvocation(format!(
            "powercfg exited with {}",
            output.status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

impl ProcessWakeLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn child_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl WakeLock for ProcessWakeLock {
    fn acquire(&mut self) -> Result<(), PrimerError> {
        if cfg!(windows) {
            if !self.windows_override {
                powercfg_override(true)?;
                self.windows_override = true;
            }
            return Ok(());
        }
        if self.child_running() {
            return Ok(());
        }
        let Some(mut cmd) = inhibitor_command() else {
            return Err(PrimerError::CommandInvocation(
                "no wake-lock mechanism on this platform".to_string(),
            ));
        };
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| {
                PrimerError::CommandInvocation(format!("wake lock spawn failed: {err}"))
            })?;
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) -> Result<(), PrimerError> {
        if self.windows_override {
            self.windows_override = false;
            powercfg_override(false)?;
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if matches!(child.try_wait(), Ok(None)) {
            child.kill().map_err(|err| {
                PrimerError::CommandInvocation(format!("wake lock stop failed: {err}"))
            })?;
        }
        let _ = child.wait();
        Ok(())
    }

    fn held(&mut self) -> bool {
        if self.windows_override || self.child_running() {
            return true;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        false
    }
}

impl Drop for ProcessWakeLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releasing_an_unheld_lock_is_a_noop() {
        let mut lock = ProcessWakeLock::new();
        assert!(!lock.held());
        lock.release().expect("release");
        assert!(!lock.held());
    }

    #[test]
    #[cfg(unix)]
    fn exited_inhibitor_is_not_held() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        child.wait().expect("wait");
        let mut lock = ProcessWakeLock {
            child: Some(child),
            windows_override: false,
        };
        assert!(!lock.held());
        assert!(lock.child.is_none());
    }
}
