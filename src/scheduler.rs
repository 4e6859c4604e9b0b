//! Acquisition scheduler.
//!
//! One control loop drives every session variant:
//!
//! ```text
//! Idle -> WaitingForWindow -> Logging -> (Rotating -> Logging)* -> Finished
//!                                  \-> Logging forever (continuous)
//! ```
//!
//! - **Bounded** sessions (a calibration window is configured) wait for the
//!   start, log into a single file while `now <= stop`, then publish that file
//!   once with [`SyncPolicy::UploadOnce`].
//! - **Continuous** sessions log from the moment they start, rotate to a new
//!   daily file whenever the date of a reading changes, and upsert the active
//!   file after every row.
//!
//! Each tick is strictly sequential: read, transform, append, sync, sleep. A
//! read failure skips the tick; a sync failure is logged; a storage fault ends
//! the session with an error. A shutdown signal interrupts any wait and leaves
//! the active file as it was after the last complete row.

use crate::calibration::{SessionPlan, Window};
use crate::clock::Clock;
use crate::error::{AppResult, LoggerError, SyncFault};
use crate::reading::{Reading, DATE_FORMAT, TIME_FORMAT};
use crate::remote::{RemoteNaming, RemoteStore, RemoteSync, SyncPolicy};
use crate::store::{LocalStore, Period, PERIOD_KEY_FORMAT};
use crate::transport::RegisterReader;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Granularity of the pre-start wait.
pub const WAIT_STEP: Duration = Duration::from_secs(1);

/// Bounded sessions run inside a window; continuous ones run until shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Log only inside `window`, then publish once
    Bounded {
        /// Logging window
        window: Window,
    },
    /// Log until shutdown, publishing after every row
    Continuous,
}

impl SessionMode {
    /// Mode implied by the plan.
    pub fn of(plan: &SessionPlan) -> Self {
        match plan.window {
            Some(window) => SessionMode::Bounded { window },
            None => SessionMode::Continuous,
        }
    }

    /// Publishing policy that goes with the mode.
    pub fn sync_policy(&self) -> SyncPolicy {
        match self {
            SessionMode::Bounded { .. } => SyncPolicy::UploadOnce,
            SessionMode::Continuous => SyncPolicy::Upsert,
        }
    }
}

/// Where the scheduler is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started
    Idle,
    /// Before the window opens
    WaitingForWindow,
    /// Taking readings
    Logging,
    /// Switching to the next day's file
    Rotating,
    /// Session over
    Finished,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Bounded session passed its stop time
    Finished,
    /// Shutdown was requested
    Interrupted,
}

/// Summary of a completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// How the session ended
    pub outcome: SessionOutcome,
    /// Rows appended to local files
    pub rows_written: u64,
    /// Ticks skipped because the sensor read failed
    pub reads_failed: u64,
    /// Publish attempts that failed
    pub sync_failures: u64,
    /// Every file that received rows, in the order they were first used.
    pub files: Vec<PathBuf>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            outcome: SessionOutcome::Interrupted,
            rows_written: 0,
            reads_failed: 0,
            sync_failures: 0,
            files: Vec::new(),
        }
    }

    fn note_file(&mut self, path: &Path) {
        if !self.files.iter().any(|f| f == path) {
            self.files.push(path.to_path_buf());
        }
    }
}

fn stamp(at: NaiveDateTime) -> String {
    format!("{} {}", at.format(DATE_FORMAT), at.format(TIME_FORMAT))
}

/// Runs one logging session from a validated [`SessionPlan`].
pub struct Scheduler {
    plan: SessionPlan,
    mode: SessionMode,
    reader: Arc<dyn RegisterReader>,
    store: LocalStore,
    sync: RemoteSync,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
    state: SchedulerState,
    current_period: Option<Period>,
}

impl Scheduler {
    /// Scheduler for one session of `plan`.
    pub fn new(
        plan: SessionPlan,
        reader: Arc<dyn RegisterReader>,
        store: LocalStore,
        remote: Arc<dyn RemoteStore>,
        naming: RemoteNaming,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mode = SessionMode::of(&plan);
        Self {
            plan,
            mode,
            reader,
            store,
            sync: RemoteSync::new(remote, mode.sync_policy(), naming),
            clock,
            shutdown,
            state: SchedulerState::Idle,
            current_period: None,
        }
    }

    /// Session mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Period of the file being written, once logging has begun.
    pub fn current_period(&self) -> Option<&Period> {
        self.current_period.as_ref()
    }

    /// Publishing policy for this session.
    pub fn sync_policy(&self) -> SyncPolicy {
        self.sync.policy()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for `duration` unless shutdown arrives first. Returns true on shutdown.
    async fn pause(&mut self, duration: Duration) -> bool {
        if self.shutdown_requested() {
            return true;
        }
        let signalled = tokio::select! {
            _ = self.clock.sleep(duration) => return false,
            changed = self.shutdown.changed() => changed.is_ok(),
        };
        if signalled {
            return self.shutdown_requested();
        }
        // Sender gone: nobody can request shutdown any more.
        self.clock.sleep(duration).await;
        false
    }

    /// Period a reading captured at `at` belongs to.
    ///
    /// Bounded sessions stay on the period chosen when logging began.
    fn period_for(&self, at: NaiveDateTime, session_start: NaiveDateTime) -> Period {
        match (&self.mode, &self.plan.start_date_key) {
            (SessionMode::Bounded { .. }, Some(file_key)) => Period::new(
                session_start.format(PERIOD_KEY_FORMAT).to_string(),
                file_key.clone(),
            ),
            _ => Period::daily(at.date()),
        }
    }

    /// Block until the window opens. Returns true if interrupted.
    async fn wait_for_window(&mut self) -> bool {
        let SessionMode::Bounded { window } = self.mode else {
            return false;
        };
        if self.clock.now() >= window.start {
            return false;
        }
        self.state = SchedulerState::WaitingForWindow;
        tracing::info!(
            now = %stamp(self.clock.now()),
            start = %stamp(window.start),
            "Waiting for logging window"
        );
        while self.clock.now() < window.start {
            let remaining = (window.start - self.clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if self.pause(remaining.min(WAIT_STEP)).await {
                return true;
            }
        }
        false
    }

    fn past_stop(&self, now: NaiveDateTime) -> bool {
        matches!(self.mode, SessionMode::Bounded { window } if now > window.stop)
    }

    /// Run the session to completion or interruption.
    pub async fn run(&mut self) -> AppResult<SessionReport> {
        let mut report = SessionReport::new();

        if self.wait_for_window().await {
            tracing::info!("Shutdown requested before logging started");
            return Ok(report);
        }

        self.sync.store().authenticate().await.map_err(|e| {
            tracing::error!(error = %e, "Remote store authentication failed, aborting session");
            LoggerError::Sync(e)
        })?;

        let session_start = self.clock.now();
        let first = self.period_for(session_start, session_start);
        self.store.ensure_directory(&first)?;
        self.current_period = Some(first);
        self.state = SchedulerState::Logging;
        tracing::info!(
            mode = ?self.mode,
            interval_secs = self.plan.log_interval.as_secs(),
            "Starting data logging"
        );

        loop {
            if self.shutdown_requested() {
                tracing::info!(rows = report.rows_written, "Logging interrupted");
                return Ok(report);
            }
            let now = self.clock.now();
            if self.past_stop(now) {
                break;
            }

            self.tick(now, session_start, &mut report).await?;

            if self.pause(self.plan.log_interval).await {
                tracing::info!(rows = report.rows_written, "Logging interrupted");
                return Ok(report);
            }
        }

        self.state = SchedulerState::Finished;
        report.outcome = SessionOutcome::Finished;
        self.publish_final(&mut report).await;
        tracing::info!(
            rows = report.rows_written,
            skipped = report.reads_failed,
            "Data logging completed"
        );
        Ok(report)
    }

    async fn tick(
        &mut self,
        now: NaiveDateTime,
        session_start: NaiveDateTime,
        report: &mut SessionReport,
    ) -> AppResult<()> {
        let raw = match self.reader.read().await {
            Ok(raw) => raw,
            Err(e) => {
                report.reads_failed += 1;
                tracing::warn!(
                    at = %stamp(now),
                    error = %e,
                    "Skipping logging due to sensor read failure"
                );
                return Ok(());
            }
        };

        let period = self.period_for(now, session_start);
        if self.current_period.as_ref() != Some(&period) {
            self.rotate(period.clone())?;
        }

        let reading = Reading::new(now, self.plan.transform.apply(&raw));
        let path = self.store.append(&period, &reading)?;
        report.rows_written += 1;
        report.note_file(&path);
        tracing::info!(at = %stamp(now), values = ?reading.values(), "Data logged");

        if self.sync.policy() == SyncPolicy::Upsert {
            if let Err(e) = self.sync.publish(&path, &self.plan.folder_id).await {
                report.sync_failures += 1;
                log_sync_failure(now, &e);
            }
        }
        Ok(())
    }

    fn rotate(&mut self, period: Period) -> AppResult<()> {
        self.state = SchedulerState::Rotating;
        self.store.ensure_directory(&period)?;
        tracing::info!(
            from = %self.current_period.as_ref().map(ToString::to_string).unwrap_or_default(),
            to = %period,
            "Date changed, rotating log file"
        );
        self.current_period = Some(period);
        self.state = SchedulerState::Logging;
        Ok(())
    }

    async fn publish_final(&mut self, report: &mut SessionReport) {
        let Some(period) = self.current_period.as_ref() else {
            return;
        };
        let path = self.store.file_path(period);
        if !path.exists() {
            tracing::warn!(path = %path.display(), "No rows were logged, nothing to upload");
            return;
        }
        if let Err(e) = self.sync.publish(&path, &self.plan.folder_id).await {
            report.sync_failures += 1;
            log_sync_failure(self.clock.now(), &e);
        }
    }
}

fn log_sync_failure(at: NaiveDateTime, err: &SyncFault) {
    tracing::error!(at = %stamp(at), error = %err, "Error uploading to remote store");
}
