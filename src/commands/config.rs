use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::primer::config::load_config;
use crate::primer::paths::resolve_paths;

const ENV_OVERRIDES: [&str; 12] = [
    "PRIMER_TIMEZONE",
    "PRIMER_START_TIME",
    "PRIMER_SLEEP_TIME",
    "PRIMER_WEEKDAYS",
    "PRIMER_KICKOFF_PROMPT",
    "PRIMER_MODEL",
    "PRIMER_USE_WAKE_LOCK",
    "PRIMER_FORCE_SLEEP",
    "PRIMER_PRE_WAKE_MINUTES",
    "PRIMER_RESTART_POLICY",
    "PRIMER_ASSISTANT_BIN",
    "PRIMER_MONITOR_BIN",
];

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("config");

    let file_state = if paths.config_file.exists() {
        "loaded"
    } else {
        "missing (defaults)"
    };
    report.detail(format!(
        "source.file={} {file_state}",
        paths.config_file.display()
    ));
    let overrides: Vec<&str> = ENV_OVERRIDES
        .iter()
        .copied()
        .filter(|key| env::var(key).is_ok_and(|v| !v.trim().is_empty()))
        .collect();
    report.detail(format!("source.env={}", overrides.join(",")));

    report.detail(format!("timezone={}", cfg.timezone));
    report.detail(format!("start_time={}", cfg.start_time));
    report.detail(format!("sleep_time={}", cfg.sleep_time));
    report.detail(format!("weekdays={}", cfg.plan()?.weekdays.codes()));
    report.detail(format!("kickoff_prompt={}", cfg.kickoff_prompt));
    report.detail(format!(
        "model={}",
        cfg.model_selector().unwrap_or("default")
    ));
    report.detail(format!("use_wake_lock={}", cfg.use_wake_lock));
    report.detail(format!(
        "force_sleep_at_quiet_hours={}",
        cfg.force_sleep_at_quiet_hours
    ));
    report.detail(format!("pre_wake_minutes={}", cfg.pre_wake_minutes));
    report.detail(format!("restart_policy={}", cfg.restart_policy.as_str()));
    report.detail(format!("commands.assistant_bin={}", cfg.commands.assistant_bin));
    report.detail(format!("commands.monitor_bin={}", cfg.commands.monitor_bin));
    report.detail(format!(
        "commands.monitor_args={}",
        cfg.commands.monitor_args.join(" ")
    ));
    report.detail(format!(
        "commands.kickoff_timeout_secs={}",
        cfg.commands.kickoff_timeout_secs
    ));
    report.detail(format!(
        "commands.monitor_timeout_secs={}",
        cfg.commands.monitor_timeout_secs
    ));
    report.detail(format!(
        "commands.wake_task_name={}",
        cfg.commands.wake_task_name
    ));
    report.detail(format!(
        "retry.immediate_retries={}",
        cfg.retry.immediate_retries
    ));
    report.detail(format!(
        "retry.backoff_secs={}..{}",
        cfg.retry.backoff_start_secs, cfg.retry.backoff_max_secs
    ));
    report.detail(format!("retry.retry_budget={}", cfg.retry.retry_budget));
    report.detail(format!(
        "retry.reset_buffer_secs={}",
        cfg.retry.reset_buffer_secs
    ));
    report.detail(format!(
        "retry.fallback_reset_hours={}",
        cfg.retry.fallback_reset_hours
    ));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    Ok(report)
}
