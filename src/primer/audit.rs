use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const MAX_AUDIT_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Failed,
    Fallback,
    Exhausted,
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Fallback => "fallback",
            Self::Exhausted => "exhausted",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub ts: String,
    pub event: String,
    pub outcome: Outcome,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl AuditEvent {
    pub fn new<Tz>(at: &DateTime<Tz>, event: &str, outcome: Outcome) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            ts: at.to_rfc3339_opts(SecondsFormat::Secs, true),
            event: event.to_string(),
            outcome,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let line = format!("{}\n", serde_json::to_string(event)?);
        let _ = maybe_rotate_log(&self.path);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Append without failing the caller; a broken log must not stop the loop.
    pub fn record(&self, event: AuditEvent) {
        if let Err(err) = self.append(&event) {
            crate::primer::warn::emit(crate::primer::warn::WarnEvent {
                code: "LOG_WRITE_FAILED",
                stage: &event.event,
                action: "append-log",
                outcome: event.outcome.as_str(),
                retry: "next-event",
                reason: "log-append-failed",
                err: &format!("{err:#}"),
            });
        }
    }

    pub fn last_event(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(raw
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str(line).ok()))
    }
}

fn maybe_rotate_log(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(path)
        && meta.len() >= MAX_AUDIT_LOG_SIZE
    {
        let backup = format!("{}.1", path.display());
        let _ = fs::rename(path, backup);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn appends_one_json_line_per_event() {
        let tmp = tempdir().expect("tempdir");
        let log = AuditLog::new(tmp.path().join("logs").join("primer.log"));
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).single().expect("ts");

        log.append(&AuditEvent::new(&at, "kickoff", Outcome::Ok).field("rc", 0))
            .expect("append");
        log.append(&AuditEvent::new(&at, "monitor_parse", Outcome::Fallback))
            .expect("append");

        let raw = fs::read_to_string(log.path()).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["ts"], "2026-10-19T06:00:00Z");
        assert_eq!(first["event"], "kickoff");
        assert_eq!(first["outcome"], "ok");
        assert_eq!(first["rc"], 0);

        let last = log.last_event().expect("read").expect("event");
        assert_eq!(last["outcome"], "fallback");
    }

    #[test]
    fn rotates_oversized_log() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("primer.log");
        let file = fs::File::create(&path).expect("create");
        file.set_len(MAX_AUDIT_LOG_SIZE).expect("grow");

        let at = Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).single().expect("ts");
        AuditLog::new(&path)
            .append(&AuditEvent::new(&at, "kickoff", Outcome::Ok))
            .expect("append");

        assert!(tmp.path().join("primer.log.1").exists());
        assert_eq!(fs::read_to_string(&path).expect("read").lines().count(), 1);
    }
}
