use crate::error::PrimerError;
use crate::primer::paths::resolve_config_path;
use crate::primer::schedule::DailyPlan;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

pub const MAX_FALLBACK_RESET_HOURS: u64 = 24;
pub const MAX_RESET_BUFFER_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Send a kickoff straight away when started inside the active window.
    #[default]
    CatchUp,
    /// Skip the kickoff and wait for the next reported reset before re-priming.
    NextBoundary,
}

impl RestartPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "catch-up" | "catchup" => Some(Self::CatchUp),
            "next-boundary" => Some(Self::NextBoundary),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatchUp => "catch-up",
            Self::NextBoundary => "next-boundary",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub assistant_bin: String,
    pub monitor_bin: String,
    pub monitor_args: Vec<String>,
    pub kickoff_timeout_secs: u64,
    pub monitor_timeout_secs: u64,
    pub wake_task_name: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            assistant_bin: "claude".to_string(),
            monitor_bin: "claude-monitor".to_string(),
            monitor_args: vec!["--clear".to_string()],
            kickoff_timeout_secs: 60,
            monitor_timeout_secs: 20,
            wake_task_name: "ClaudeSchedulerWake".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub immediate_retries: u32,
    pub backoff_start_secs: u64,
    pub backoff_max_secs: u64,
    pub retry_budget: u32,
    pub reset_buffer_secs: u64,
    pub fallback_reset_hours: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            immediate_retries: 1,
            backoff_start_secs: 2,
            backoff_max_secs: 60,
            retry_budget: 6,
            reset_buffer_secs: 3,
            fallback_reset_hours: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    pub timezone: String,
    pub start_time: String,
    pub sleep_time: String,
    pub weekdays: String,
    pub kickoff_prompt: String,
    pub model: Option<String>,
    pub use_wake_lock: bool,
    pub force_sleep_at_quiet_hours: bool,
    pub pre_wake_minutes: u32,
    pub restart_policy: RestartPolicy,
    pub commands: CommandsConfig,
    pub retry: RetryConfig,
}

impl Default for PrimerConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/London".to_string(),
            start_time: "06:00".to_string(),
            sleep_time: "23:00".to_string(),
            weekdays: "MTWRFSU".to_string(),
            kickoff_prompt: "ping".to_string(),
            model: None,
            use_wake_lock: true,
            force_sleep_at_quiet_hours: false,
            pre_wake_minutes: 2,
            restart_policy: RestartPolicy::CatchUp,
            commands: CommandsConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl PrimerConfig {
    /// Model selector to pass through, if any. `default` defers to the CLI's own choice.
    pub fn model_selector(&self) -> Option<&str> {
        let model = self.model.as_deref()?.trim();
        if model.is_empty() || model.eq_ignore_ascii_case("default") {
            return None;
        }
        Some(model)
    }

    pub fn plan(&self) -> Result<DailyPlan, PrimerError> {
        DailyPlan::from_config(self)
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_opt_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

pub fn validate(cfg: &PrimerConfig) -> Result<(), PrimerError> {
    cfg.plan()?;
    if cfg.kickoff_prompt.trim().is_empty() {
        return Err(PrimerError::Config(
            "kickoff_prompt cannot be empty".to_string(),
        ));
    }
    if cfg.commands.assistant_bin.trim().is_empty() || cfg.commands.monitor_bin.trim().is_empty()
    {
        return Err(PrimerError::Config(
            "assistant_bin and monitor_bin cannot be empty".to_string(),
        ));
    }
    if cfg.commands.kickoff_timeout_secs == 0 || cfg.commands.monitor_timeout_secs == 0 {
        return Err(PrimerError::Config(
            "command timeouts must be >= 1 second".to_string(),
        ));
    }
    if cfg.retry.retry_budget == 0 {
        return Err(PrimerError::Config(
            "retry_budget must be >= 1".to_string(),
        ));
    }
    if cfg.retry.backoff_max_secs < cfg.retry.backoff_start_secs {
        return Err(PrimerError::Config(
            "require backoff_start_secs <= backoff_max_secs".to_string(),
        ));
    }
    if !(1..=MAX_FALLBACK_RESET_HOURS).contains(&cfg.retry.fallback_reset_hours) {
        return Err(PrimerError::Config(format!(
            "fallback_reset_hours must be between 1 and {MAX_FALLBACK_RESET_HOURS}"
        )));
    }
    if cfg.retry.reset_buffer_secs > MAX_RESET_BUFFER_SECS {
        return Err(PrimerError::Config(format!(
            "reset_buffer_secs must be <= {MAX_RESET_BUFFER_SECS}"
        )));
    }
    Ok(())
}

pub fn parse_config_str(raw: &str) -> Result<PrimerConfig, PrimerError> {
    toml::from_str::<PrimerConfig>(raw).map_err(|err| PrimerError::Config(err.to_string()))
}

fn read_file_config(path: &Path) -> Result<PrimerConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read primer config {}", path.display()))?;
    parse_config_str(&raw)
        .map_err(|err| anyhow!("failed to parse primer config {}: {err}", path.display()))
}

fn apply_env_overrides(cfg: &mut PrimerConfig) -> Result<()> {
    cfg.timezone = env_or_string("PRIMER_TIMEZONE", &cfg.timezone);
    cfg.start_time = env_or_string("PRIMER_START_TIME", &cfg.start_time);
    cfg.sleep_time = env_or_string("PRIMER_SLEEP_TIME", &cfg.sleep_time);
    cfg.weekdays = env_or_string("PRIMER_WEEKDAYS", &cfg.weekdays);
    cfg.kickoff_prompt = env_or_string("PRIMER_KICKOFF_PROMPT", &cfg.kickoff_prompt);
    cfg.model = env_opt_string("PRIMER_MODEL", cfg.model.take());
    cfg.use_wake_lock = env_or_bool("PRIMER_USE_WAKE_LOCK", cfg.use_wake_lock);
    cfg.force_sleep_at_quiet_hours =
        env_or_bool("PRIMER_FORCE_SLEEP", cfg.force_sleep_at_quiet_hours);
    cfg.pre_wake_minutes =
        env_or_u64("PRIMER_PRE_WAKE_MINUTES", u64::from(cfg.pre_wake_minutes)).min(720) as u32;
    if let Ok(raw) = env::var("PRIMER_RESTART_POLICY")
        && !raw.trim().is_empty()
    {
        cfg.restart_policy = RestartPolicy::parse(&raw).ok_or_else(|| {
            PrimerError::Config(format!(
                "invalid restart policy `{}`: use `catch-up` or `next-boundary`",
                raw.trim()
            ))
        })?;
    }
    cfg.commands.assistant_bin = env_or_string("PRIMER_ASSISTANT_BIN", &cfg.commands.assistant_bin);
    cfg.commands.monitor_bin = env_or_string("PRIMER_MONITOR_BIN", &cfg.commands.monitor_bin);
    Ok(())
}

pub fn load_config() -> Result<PrimerConfig> {
    let mut cfg = match resolve_config_path() {
        Some(path) if path.exists() => read_file_config(&path)?,
        _ => PrimerConfig::default(),
    };
    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        validate(&PrimerConfig::default()).expect("defaults valid");
    }

    #[test]
    fn file_fields_overlay_defaults() {
        let cfg = parse_config_str(
            r#"
timezone = "America/New_York"
weekdays = "WEEKDAYS"
model = "sonnet"

[retry]
retry_budget = 3
"#,
        )
        .expect("parse");
        assert_eq!(cfg.timezone, "America/New_York");
        assert_eq!(cfg.start_time, "06:00");
        assert_eq!(cfg.retry.retry_budget, 3);
        assert_eq!(cfg.retry.backoff_max_secs, 60);
        assert_eq!(cfg.commands.monitor_args, vec!["--clear".to_string()]);
        validate(&cfg).expect("valid");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = parse_config_str("start_time = [").expect_err("should fail");
        assert!(matches!(err, PrimerError::Config(_)));
    }

    #[test]
    fn restart_policy_accepts_kebab_case() {
        let cfg = parse_config_str("restart_policy = \"next-boundary\"").expect("parse");
        assert_eq!(cfg.restart_policy, RestartPolicy::NextBoundary);
        assert_eq!(RestartPolicy::parse("catch_up"), Some(RestartPolicy::CatchUp));
        assert_eq!(RestartPolicy::parse("later"), None);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let cfg = PrimerConfig {
            timezone: "Mars/Olympus".to_string(),
            ..PrimerConfig::default()
        };
        assert!(matches!(validate(&cfg), Err(PrimerError::Config(_))));
    }

    #[test]
    fn rejects_bad_times_and_weekdays() {
        for (start, sleep, weekdays) in [
            ("6am", "23:00", "MTWRF"),
            ("06:00", "24:00", "MTWRF"),
            ("23:00", "06:00", "MTWRF"),
            ("06:00", "23:00", "MTXRF"),
            ("06:00", "23:00", ""),
        ] {
            let cfg = PrimerConfig {
                start_time: start.to_string(),
                sleep_time: sleep.to_string(),
                weekdays: weekdays.to_string(),
                ..PrimerConfig::default()
            };
            assert!(
                matches!(validate(&cfg), Err(PrimerError::Config(_))),
                "expected config error for {start} {sleep} {weekdays}"
            );
        }
    }

    #[test]
    fn rejects_inverted_backoff_window() {
        let mut cfg = PrimerConfig::default();
        cfg.retry.backoff_start_secs = 120;
        cfg.retry.backoff_max_secs = 60;
        assert!(matches!(validate(&cfg), Err(PrimerError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_fallback_and_buffer() {
        for hours in [0, MAX_FALLBACK_RESET_HOURS + 1, u64::MAX] {
            let mut cfg = PrimerConfig::default();
            cfg.retry.fallback_reset_hours = hours;
            assert!(
                matches!(validate(&cfg), Err(PrimerError::Config(_))),
                "fallback_reset_hours={hours} should be rejected"
            );
        }
        let mut cfg = PrimerConfig::default();
        cfg.retry.fallback_reset_hours = MAX_FALLBACK_RESET_HOURS;
        cfg.retry.reset_buffer_secs = MAX_RESET_BUFFER_SECS;
        validate(&cfg).expect("upper bounds are valid");
        cfg.retry.reset_buffer_secs = u64::MAX;
        assert!(matches!(validate(&cfg), Err(PrimerError::Config(_))));
    }

    #[test]
    fn default_model_is_not_passed_through() {
        let mut cfg = PrimerConfig::default();
        assert_eq!(cfg.model_selector(), None);
        cfg.model = Some("Default".to_string());
        assert_eq!(cfg.model_selector(), None);
        cfg.model = Some(" opus ".to_string());
        assert_eq!(cfg.model_selector(), Some("opus"));
    }
}
