use anyhow::Result;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Keep the last `max_chars` characters of `input`, stripping control characters
/// and prefixing `…` when truncated.
pub fn tail_with_ellipsis(input: &str, max_chars: usize) -> String {
    let clean: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect();
    let count = clean.chars().count();
    if count > max_chars {
        let mut s = String::from("…");
        s.extend(clean.chars().skip(count - max_chars));
        s
    } else {
        clean
    }
}

pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // The fs2 lock is the real liveness signal on Windows.
        true
    } else {
        let mut cmd = Command::new("kill");
        cmd.arg("-0").arg(pid.to_string());
        let Ok(output) = run_command_with_optional_timeout(&mut cmd, Some(2)) else {
            return false;
        };
        output.status.success()
    }
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buf);
        }
        buf
    })
}

/// Run `cmd` with stdin closed. Output pipes are drained on background threads
/// so a chatty child cannot stall on a full pipe before the deadline.
pub fn run_command_with_optional_timeout(
    cmd: &mut Command,
    timeout_secs: Option<u64>,
) -> Result<Output> {
    cmd.stdin(Stdio::null());
    let Some(timeout_secs) = timeout_secs else {
        return Ok(cmd.output()?);
    };
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= Duration::from_secs(timeout_secs) {
            let _ = child.kill();
            let _ = child.wait();
            anyhow::bail!("command timed out after {}s", timeout_secs);
        }
        thread::sleep(POLL_INTERVAL);
    };
    Ok(Output {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}
