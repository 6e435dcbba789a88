use crate::primer::paths::PrimerPaths;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonLockPayload {
    pub pid: u32,
    #[serde(default)]
    pub started_at_epoch_secs: u64,
    #[serde(default)]
    pub build_uuid: String,
    #[serde(default)]
    pub primer_home: String,
}

impl DaemonLockPayload {
    pub fn current(paths: &PrimerPaths, started_at_epoch_secs: u64) -> Self {
        Self {
            pid: std::process::id(),
            started_at_epoch_secs,
            build_uuid: env!("BUILD_UUID").to_string(),
            primer_home: paths.primer_home.display().to_string(),
        }
    }
}

pub fn parse_daemon_lock_payload(raw: &str) -> Option<DaemonLockPayload> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(payload) = serde_json::from_str::<DaemonLockPayload>(trimmed) {
        return Some(payload);
    }
    // A bare PID line is still readable.
    let pid = trimmed.lines().next()?.trim().parse::<u32>().ok()?;
    Some(DaemonLockPayload {
        pid,
        started_at_epoch_secs: 0,
        build_uuid: String::new(),
        primer_home: String::new(),
    })
}

pub fn read_daemon_lock_payload(lock_path: &Path) -> Result<Option<DaemonLockPayload>> {
    if !lock_path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(lock_path)
        .with_context(|| format!("failed to read daemon lock {}", lock_path.display()))?;
    Ok(parse_daemon_lock_payload(&raw))
}

/// Take the exclusive single-instance lock and stamp it with `payload`.
/// The lock lives as long as the returned file handle.
pub fn acquire_daemon_lock(lock_path: &Path, payload: &DaemonLockPayload) -> Result<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("failed to open daemon lock {}", lock_path.display()))?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::WouldBlock => {
            anyhow::bail!(
                "primer daemon already running (lock: {})",
                lock_path.display()
            );
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to lock daemon file {}", lock_path.display()));
        }
    }

    lock_file
        .set_len(0)
        .with_context(|| format!("failed to truncate daemon lock {}", lock_path.display()))?;
    let body = serde_json::to_string(payload).context("failed to encode daemon lock payload")?;
    writeln!(&mut lock_file, "{body}")
        .with_context(|| format!("failed to write daemon lock {}", lock_path.display()))?;
    lock_file
        .flush()
        .with_context(|| format!("failed to flush daemon lock {}", lock_path.display()))?;
    Ok(lock_file)
}

/// Whether another handle currently holds the daemon lock.
pub fn daemon_lock_held(lock_path: &Path) -> Result<bool> {
    if !lock_path.exists() {
        return Ok(false);
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("failed to open daemon lock {}", lock_path.display()))?;
    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = FileExt::unlock(&file);
            Ok(false)
        }
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(true),
        Err(err) => Err(err)
            .with_context(|| format!("failed to probe daemon lock {}", lock_path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payload(pid: u32) -> DaemonLockPayload {
        DaemonLockPayload {
            pid,
            started_at_epoch_secs: 1_760_000_000,
            build_uuid: "abc".to_string(),
            primer_home: "/tmp/primer".to_string(),
        }
    }

    #[test]
    fn parses_json_payload() {
        let raw = r#"{"pid":42,"started_at_epoch_secs":1700000000,"build_uuid":"abc","primer_home":"/tmp/p"}"#;
        let parsed = parse_daemon_lock_payload(raw).expect("payload");
        assert_eq!(parsed.pid, 42);
        assert_eq!(parsed.build_uuid, "abc");
    }

    #[test]
    fn parses_bare_pid_payload() {
        let parsed = parse_daemon_lock_payload("4242\n").expect("payload");
        assert_eq!(parsed.pid, 4242);
        assert!(parsed.build_uuid.is_empty());
        assert!(parse_daemon_lock_payload("  ").is_none());
    }

    #[test]
    fn second_acquire_is_refused_while_first_is_held() {
        let tmp = tempdir().expect("tempdir");
        let lock_path = tmp.path().join("logs").join("primer-daemon.lock");
        let first = acquire_daemon_lock(&lock_path, &payload(7)).expect("first lock");
        let err = acquire_daemon_lock(&lock_path, &payload(8)).expect_err("second lock");
        assert!(err.to_string().contains("already running"));

        let stored = read_daemon_lock_payload(&lock_path).expect("read").expect("payload");
        assert_eq!(stored, payload(7));
        assert!(daemon_lock_held(&lock_path).expect("probe"));
        drop(first);
        assert!(!daemon_lock_held(&lock_path).expect("probe"));
        acquire_daemon_lock(&lock_path, &payload(9)).expect("lock after release");
    }
}
