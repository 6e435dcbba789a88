use crate::error::PrimerError;
use crate::primer::audit::{AuditEvent, AuditLog, Outcome};
use crate::primer::clock::Clock;
use crate::primer::config::{
    MAX_FALLBACK_RESET_HOURS, MAX_RESET_BUFFER_SECS, PrimerConfig, RestartPolicy, RetryConfig,
};
use crate::primer::kickoff;
use crate::primer::monitor::{self, ResetExtractor};
use crate::primer::quiet_hours;
use crate::primer::runner::CommandRunner;
use crate::primer::schedule::{DailyPlan, DaySchedule};
use crate::primer::sleep::SleepController;
use crate::primer::util::tail_with_ellipsis;
use crate::primer::wake_lock::WakeLock;
use crate::primer::warn::{self, WarnEvent};
use chrono::{DateTime, Duration as ChronoDuration};
use chrono_tz::Tz;
use std::time::Duration;

const IDLE_RECHECK: Duration = Duration::from_secs(24 * 60 * 60);
const STDOUT_TAIL_CHARS: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveTask {
    Kickoff,
    QueryReset,
}

impl ActiveTask {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Kickoff => "kickoff",
            Self::QueryReset => "monitor_parse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForStart,
    Active(ActiveTask),
    Retrying(ActiveTask),
    Resting,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForStart => "waiting_for_start",
            Self::Active(_) => "active",
            Self::Retrying(_) => "retrying",
            Self::Resting => "resting",
        }
    }
}

/// The loop's only mutable state. Lives for one process; a restart re-derives
/// everything from the wall clock.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleState {
    pub phase: Phase,
    pub last_kickoff_at: Option<DateTime<Tz>>,
    pub next_reset_at: Option<DateTime<Tz>>,
    pub retry_count: u32,
    pub last_error: Option<PrimerError>,
    pub window_ends_at: Option<DateTime<Tz>>,
}

impl CycleState {
    fn waiting() -> Self {
        Self {
            phase: Phase::WaitingForStart,
            last_kickoff_at: None,
            next_reset_at: None,
            retry_count: 0,
            last_error: None,
            window_ends_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub immediate_retries: u32,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
    pub budget: u32,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            immediate_retries: cfg.immediate_retries,
            backoff_start: Duration::from_secs(cfg.backoff_start_secs),
            backoff_max: Duration::from_secs(cfg.backoff_max_secs),
            budget: cfg.retry_budget,
        }
    }

    /// Delay before retry `attempt` (1-based), or `None` once the budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.budget {
            return None;
        }
        if attempt <= self.immediate_retries {
            return Some(Duration::ZERO);
        }
        let exponent = (attempt - self.immediate_retries - 1).min(20);
        let delay = self.backoff_start.saturating_mul(1u32 << exponent);
        Some(delay.min(self.backoff_max))
    }
}

pub struct Daemon<'a> {
    cfg: &'a PrimerConfig,
    plan: DailyPlan,
    policy: RetryPolicy,
    runner: &'a dyn CommandRunner,
    extractor: &'a dyn ResetExtractor,
    clock: &'a dyn Clock,
    wake_lock: &'a mut dyn WakeLock,
    log: &'a AuditLog,
}

impl<'a> Daemon<'a> {
    pub fn new(
        cfg: &'a PrimerConfig,
        runner: &'a dyn CommandRunner,
        extractor: &'a dyn ResetExtractor,
        clock: &'a dyn Clock,
        wake_lock: &'a mut dyn WakeLock,
        log: &'a AuditLog,
    ) -> Result<Self, PrimerError> {
        Ok(Self {
            plan: cfg.plan()?,
            policy: RetryPolicy::from_config(&cfg.retry),
            cfg,
            runner,
            extractor,
            clock,
            wake_lock,
            log,
        })
    }

    fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.plan.tz)
    }

    fn sleeper(&self) -> SleepController<'a> {
        SleepController::new(self.clock)
    }

    /// Derive the initial state from the wall clock. Inside today's window the
    /// restart policy decides whether to kick off right away.
    pub fn start(&mut self) -> CycleState {
        let now = self.now();
        let mut state = CycleState::waiting();
        let mut event = AuditEvent::new(&now, "daemon_started", Outcome::Ok)
            .field("timezone", self.plan.tz.name())
            .field("start_time", self.plan.start.format("%H:%M").to_string())
            .field("sleep_time", self.plan.sleep.format("%H:%M").to_string())
            .field("weekdays", self.plan.weekdays.codes())
            .field("restart_policy", self.cfg.restart_policy.as_str())
            .field("pid", std::process::id());

        if let Some(window) = self.plan.window_containing(&now) {
            let task = match self.cfg.restart_policy {
                RestartPolicy::CatchUp => ActiveTask::Kickoff,
                RestartPolicy::NextBoundary => ActiveTask::QueryReset,
            };
            self.enter_active(&mut state, &window, task, &now);
            event = event.field("resume", task.as_str());
        }
        self.log.record(event.field("phase", state.phase.as_str()));
        state
    }

    /// Run forever. Termination is external.
    pub fn run(mut self) -> ! {
        let mut state = self.start();
        loop {
            self.step(&mut state);
        }
    }

    /// One loop iteration: at most one blocking wait.
    pub fn step(&mut self, state: &mut CycleState) {
        match state.phase {
            Phase::WaitingForStart => self.step_waiting(state),
            Phase::Active(task) => self.step_active(state, task),
            Phase::Retrying(task) => self.step_retrying(state, task),
            Phase::Resting => self.step_resting(state),
        }
    }

    fn enter_active(
        &mut self,
        state: &mut CycleState,
        window: &DaySchedule,
        task: ActiveTask,
        now: &DateTime<Tz>,
    ) {
        state.phase = Phase::Active(task);
        state.window_ends_at = Some(window.sleep_at);
        state.retry_count = 0;
        state.last_error = None;
        if self.cfg.use_wake_lock {
            self.acquire_wake_lock(now);
        }
    }

    fn acquire_wake_lock(&mut self, now: &DateTime<Tz>) {
        if self.wake_lock.held() {
            return;
        }
        match self.wake_lock.acquire() {
            Ok(()) => self
                .log
                .record(AuditEvent::new(now, "wake_lock", Outcome::Ok).field("action", "acquire")),
            Err(err) => {
                warn::emit(WarnEvent {
                    code: err.code(),
                    stage: "waiting-for-start",
                    action: "acquire-wake-lock",
                    outcome: "failed",
                    retry: "next-step",
                    reason: "wake-lock-unavailable",
                    err: &err.to_string(),
                });
                self.log.record(
                    AuditEvent::new(now, "wake_lock", Outcome::Failed)
                        .field("action", "acquire")
                        .field("error", err.to_string()),
                );
            }
        }
    }

    fn release_wake_lock(&mut self, now: &DateTime<Tz>) {
        if !self.wake_lock.held() {
            return;
        }
        let (outcome, error) = match self.wake_lock.release() {
            Ok(()) => (Outcome::Ok, None),
            Err(err) => (Outcome::Failed, Some(err.to_string())),
        };
        let mut event = AuditEvent::new(now, "wake_lock", outcome).field("action", "release");
        if let Some(error) = error {
            event = event.field("error", error);
        }
        self.log.record(event);
    }

    fn step_waiting(&mut self, state: &mut CycleState) {
        let now = self.now();
        if let Some(window) = self.plan.window_containing(&now) {
            self.enter_active(state, &window, ActiveTask::Kickoff, &now);
            return;
        }

        let Some(next) = self.plan.next_start_after(&now) else {
            self.log.record(
                AuditEvent::new(&now, "waiting_for_start", Outcome::Skipped)
                    .field("reason", "no-active-days"),
            );
            self.sleeper().sleep_for(IDLE_RECHECK);
            return;
        };

        if self.cfg.use_wake_lock && !self.wake_lock.held() {
            if now < next.pre_wake_at {
                self.log.record(
                    AuditEvent::new(&now, "waiting_for_start", Outcome::Ok)
                        .field("until", next.pre_wake_at.to_rfc3339())
                        .field("stage", "pre-wake"),
                );
                self.sleeper().sleep_until(&next.pre_wake_at);
                return;
            }
            self.acquire_wake_lock(&now);
        }

        self.log.record(
            AuditEvent::new(&now, "waiting_for_start", Outcome::Ok)
                .field("until", next.start_at.to_rfc3339())
                .field("stage", "start"),
        );
        self.sleeper().sleep_until(&next.start_at);
    }

    fn window_closed(&self, state: &CycleState, now: &DateTime<Tz>) -> bool {
        match state.window_ends_at {
            Some(ends) => *now >= ends,
            None => true,
        }
    }

    fn step_active(&mut self, state: &mut CycleState, task: ActiveTask) {
        let now = self.now();
        if self.window_closed(state, &now) {
            self.enter_resting(state, &now);
            return;
        }
        if self.cfg.use_wake_lock {
            self.acquire_wake_lock(&now);
        }
        match task {
            ActiveTask::Kickoff => self.run_kickoff(state, &now),
            ActiveTask::QueryReset => self.run_reset_query(state, &now),
        }
    }

    fn step_retrying(&mut self, state: &mut CycleState, task: ActiveTask) {
        let now = self.now();
        if self.window_closed(state, &now) {
            self.enter_resting(state, &now);
            return;
        }
        let delay = self.policy.delay_for(state.retry_count).unwrap_or_default();
        self.sleeper().sleep_for(delay);
        state.phase = Phase::Active(task);
    }

    fn step_resting(&mut self, state: &mut CycleState) {
        let now = self.now();
        let Some(next) = self.plan.next_start_after(&now) else {
            self.sleeper().sleep_for(IDLE_RECHECK);
            state.phase = Phase::WaitingForStart;
            return;
        };
        let target = if self.cfg.use_wake_lock && next.pre_wake_at > now {
            next.pre_wake_at
        } else {
            next.start_at
        };
        self.log.record(
            AuditEvent::new(&now, "waiting_for_start", Outcome::Ok)
                .field("until", target.to_rfc3339())
                .field("stage", "resting"),
        );
        self.sleeper().sleep_until(&target);
        state.phase = Phase::WaitingForStart;
    }

    fn enter_resting(&mut self, state: &mut CycleState, now: &DateTime<Tz>) {
        state.phase = Phase::Resting;
        state.window_ends_at = None;
        state.retry_count = 0;
        self.release_wake_lock(now);
        quiet_hours::enter(
            self.runner,
            self.log,
            self.cfg.force_sleep_at_quiet_hours,
            now,
        );
    }

    fn run_kickoff(&mut self, state: &mut CycleState, now: &DateTime<Tz>) {
        match kickoff::send(self.runner, self.cfg) {
            Ok(outcome) => {
                state.last_kickoff_at = Some(*now);
                state.retry_count = 0;
                state.last_error = None;
                state.phase = Phase::Active(ActiveTask::QueryReset);
                self.log.record(
                    AuditEvent::new(now, "kickoff", Outcome::Ok)
                        .field("rc", outcome.output.exit_code)
                        .field("cmd", outcome.command)
                        .field(
                            "stdout",
                            tail_with_ellipsis(&outcome.output.stdout, STDOUT_TAIL_CHARS),
                        ),
                );
            }
            Err(err) => {
                self.log.record(
                    AuditEvent::new(now, "kickoff", Outcome::Failed)
                        .field("error", err.to_string()),
                );
                if !self.schedule_retry(state, ActiveTask::Kickoff, err, now) {
                    // Out of budget: move on to the reset query so the loop keeps cycling.
                    state.retry_count = 0;
                    state.phase = Phase::Active(ActiveTask::QueryReset);
                }
            }
        }
    }

    fn run_reset_query(&mut self, state: &mut CycleState, now: &DateTime<Tz>) {
        let probe = monitor::probe(self.runner, self.extractor, &self.cfg.commands, now);
        if let Some(reset_at) = probe.result.reset_at {
            self.log.record(
                AuditEvent::new(now, "monitor_parse", Outcome::Ok)
                    .field("reset_at", reset_at.to_rfc3339())
                    .field(
                        "pattern",
                        probe.result.pattern.map(|p| p.as_str()).unwrap_or("custom"),
                    )
                    .field("rc", probe.exit_code),
            );
            state.last_error = None;
            self.sleep_until_reset(state, reset_at, now, Outcome::Ok);
            return;
        }

        let err = probe.error.unwrap_or_else(|| {
            PrimerError::Parse("no reset timestamp in monitor output".to_string())
        });
        self.log.record(
            AuditEvent::new(now, "monitor_parse", Outcome::Failed)
                .field("rc", probe.exit_code)
                .field("error", err.to_string())
                .field("snippet", probe.snippet),
        );
        if self.schedule_retry(state, ActiveTask::QueryReset, err, now) {
            return;
        }

        let fallback_hours = self
            .cfg
            .retry
            .fallback_reset_hours
            .clamp(1, MAX_FALLBACK_RESET_HOURS);
        let fallback = *now + ChronoDuration::hours(i64::try_from(fallback_hours).unwrap_or(1));
        self.log.record(
            AuditEvent::new(now, "monitor_parse", Outcome::Fallback)
                .field("reset_at", fallback.to_rfc3339())
                .field("fallback_hours", fallback_hours),
        );
        self.sleep_until_reset(state, fallback, now, Outcome::Fallback);
    }

    /// Record a failure and pick the retry delay. Returns false once the budget is spent.
    fn schedule_retry(
        &mut self,
        state: &mut CycleState,
        task: ActiveTask,
        err: PrimerError,
        now: &DateTime<Tz>,
    ) -> bool {
        state.retry_count = state.retry_count.saturating_add(1);
        let attempt = state.retry_count;
        let delay = self.policy.delay_for(attempt);
        let retry_note = match delay {
            Some(delay) => format!("retry-in-{}s", delay.as_secs()),
            None => "budget-exhausted".to_string(),
        };
        warn::emit(WarnEvent {
            code: err.code(),
            stage: "active",
            action: task.as_str(),
            outcome: if delay.is_some() { "failed" } else { "exhausted" },
            retry: &retry_note,
            reason: &format!("attempt-{attempt}"),
            err: &err.to_string(),
        });

        let mut event = AuditEvent::new(
            now,
            "retry",
            if delay.is_some() {
                Outcome::Failed
            } else {
                Outcome::Exhausted
            },
        )
        .field("task", task.as_str())
        .field("attempt", attempt)
        .field("budget", self.policy.budget)
        .field("error", err.to_string());
        if let Some(delay) = delay {
            event = event.field("delay_secs", delay.as_secs());
        }
        self.log.record(event);
        state.last_error = Some(err);

        match delay {
            Some(_) => {
                state.phase = Phase::Retrying(task);
                true
            }
            None => false,
        }
    }

    /// Sleep until `reset_at` plus the buffer, capped at the window end, then re-prime.
    fn sleep_until_reset(
        &mut self,
        state: &mut CycleState,
        reset_at: DateTime<Tz>,
        now: &DateTime<Tz>,
        outcome: Outcome,
    ) {
        let reset_at = match state.last_kickoff_at {
            Some(kicked) if reset_at < kicked => kicked,
            _ => reset_at,
        };
        state.next_reset_at = Some(reset_at);
        state.retry_count = 0;

        let buffer_secs = self.cfg.retry.reset_buffer_secs.min(MAX_RESET_BUFFER_SECS);
        let buffered = reset_at + ChronoDuration::seconds(i64::try_from(buffer_secs).unwrap_or(0));
        let (wake_at, capped) = match state.window_ends_at {
            Some(ends) if ends < buffered => (ends, true),
            _ => (buffered, false),
        };
        self.log.record(
            AuditEvent::new(now, "sleep_until_reset", outcome)
                .field("reset", reset_at.to_rfc3339())
                .field("buffered", buffered.to_rfc3339())
                .field("wake_at", wake_at.to_rfc3339())
                .field("capped_at_quiet_hours", capped),
        );

        let wait = self.sleeper().sleep_until(&wake_at);
        if let Some(overdue) = wait.overdue_by {
            let err = PrimerError::Scheduling(format!(
                "wake target {} already passed by {}s; clamped to zero",
                wake_at.to_rfc3339(),
                overdue.as_secs()
            ));
            warn::emit(WarnEvent {
                code: err.code(),
                stage: "active",
                action: "sleep-until-reset",
                outcome: "clamped",
                retry: "immediate",
                reason: "negative-sleep",
                err: &err.to_string(),
            });
        }
        state.phase = Phase::Active(ActiveTask::Kickoff);
    }
}
