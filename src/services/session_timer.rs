//! Countdown and auto-save loop that drives an open attempt from the client side.
//!
//! One task per attempt. The countdown is anchored to the last
//! server-reported remaining time rather than to a count of local ticks, so
//! a suspended runtime catches up on the next tick instead of drifting.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::attempt::{AnswerSlot, Attempt};
use crate::services::session_service::{AnswerSnapshot, SessionService};

#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    /// Countdown resolution.
    pub tick: Duration,
    pub heartbeat_every: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            heartbeat_every: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for TimerSettings {
    fn from(config: &Config) -> Self {
        Self {
            heartbeat_every: Duration::from_secs(config.heartbeat_interval_seconds.max(1)),
            ..Self::default()
        }
    }
}

/// How the timer loop ended.
#[derive(Debug)]
pub enum TimerExit {
    /// Time ran out and the attempt was sealed by the timer.
    AutoSubmitted(Attempt),
    /// The attempt was sealed elsewhere (manual submit, another client, the sweeper).
    Completed,
    Cancelled,
    /// The attempt can no longer be driven (unknown id, ownership lost).
    Failed(Error),
}

#[derive(Debug)]
struct LocalState {
    answers: Vec<AnswerSlot>,
    flagged: std::collections::BTreeSet<usize>,
    base_time_spent: i64,
    started: Instant,
    anchor: Instant,
    anchor_remaining: i64,
}

impl LocalState {
    fn remaining(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.anchor).as_secs() as i64;
        (self.anchor_remaining - elapsed).max(0)
    }

    fn reconcile(&mut self, server_remaining: i64, now: Instant) {
        self.anchor = now;
        self.anchor_remaining = server_remaining.max(0);
    }

    fn snapshot(&self, now: Instant) -> AnswerSnapshot {
        AnswerSnapshot {
            answers: self.answers.clone(),
            flagged: self.flagged.clone(),
            time_spent_seconds: self.base_time_spent
                + now.saturating_duration_since(self.started).as_secs() as i64,
        }
    }
}

type SharedState = Arc<Mutex<LocalState>>;

/// Held across every server write so a heartbeat snapshot is never taken
/// while an answer or flag write is still in flight.
type WriteGate = Arc<AsyncMutex<()>>;

fn lock(state: &SharedState) -> MutexGuard<'_, LocalState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SessionTimer;

impl SessionTimer {
    /// Start driving `attempt`, which the server reports as having
    /// `remaining_seconds` left.
    pub fn spawn(
        service: SessionService,
        attempt: &Attempt,
        remaining_seconds: i64,
        settings: TimerSettings,
    ) -> TimerHandle {
        let now = Instant::now();
        let state = Arc::new(Mutex::new(LocalState {
            answers: attempt.answers.clone(),
            flagged: attempt.flagged.clone(),
            base_time_spent: attempt.time_spent_seconds,
            started: now,
            anchor: now,
            anchor_remaining: remaining_seconds.max(0),
        }));
        let cancel = CancellationToken::new();
        let resume = Arc::new(Notify::new());
        let writes = WriteGate::default();

        let task = TimerTask {
            service: service.clone(),
            user_id: attempt.user_id.clone(),
            attempt_id: attempt.id,
            state: state.clone(),
            writes: writes.clone(),
            cancel: cancel.clone(),
            resume: resume.clone(),
            settings,
        };
        let join = tokio::spawn(task.run());
        tracing::debug!(attempt_id = %attempt.id, remaining_seconds, "Session timer started");

        TimerHandle {
            service,
            user_id: attempt.user_id.clone(),
            attempt_id: attempt.id,
            total_questions: attempt.total_questions(),
            state,
            writes,
            cancel,
            resume,
            join: Some(join),
        }
    }
}

struct TimerTask {
    service: SessionService,
    user_id: String,
    attempt_id: Uuid,
    state: SharedState,
    writes: WriteGate,
    cancel: CancellationToken,
    resume: Arc<Notify>,
    settings: TimerSettings,
}

impl TimerTask {
    async fn run(self) -> TimerExit {
        let start = Instant::now();
        let mut countdown = interval_at(start + self.settings.tick, self.settings.tick);
        countdown.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut heartbeat = interval_at(
            start + self.settings.heartbeat_every,
            self.settings.heartbeat_every,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut expired = lock(&self.state).remaining(start) == 0;
        loop {
            if expired {
                if let Some(exit) = self.expire().await {
                    return exit;
                }
                expired = lock(&self.state).remaining(Instant::now()) == 0;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(attempt_id = %self.attempt_id, "Session timer cancelled");
                    return TimerExit::Cancelled;
                }
                _ = self.resume.notified() => {
                    if let Some(exit) = self.reconcile().await {
                        return exit;
                    }
                    expired = lock(&self.state).remaining(Instant::now()) == 0;
                }
                now = countdown.tick() => {
                    expired = lock(&self.state).remaining(now) == 0;
                }
                _ = heartbeat.tick(), if !expired => {
                    if let Some(exit) = self.flush().await {
                        return exit;
                    }
                }
            }
        }
    }

    /// Best-effort snapshot write. Failures wait for the next interval.
    async fn flush(&self) -> Option<TimerExit> {
        let _gate = self.writes.lock().await;
        let now = Instant::now();
        let snapshot = lock(&self.state).snapshot(now);
        match self
            .service
            .heartbeat(&self.user_id, self.attempt_id, snapshot)
            .await
        {
            Ok(ack) if ack.is_completed => Some(TimerExit::Completed),
            Ok(ack) => {
                if !ack.accepted {
                    tracing::debug!(attempt_id = %self.attempt_id, "Heartbeat not applied by the server");
                }
                lock(&self.state).reconcile(ack.remaining_seconds, now);
                None
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt_id = %self.attempt_id, "Heartbeat failed, retrying next interval: {}", e);
                None
            }
            Err(e) => Some(TimerExit::Failed(e)),
        }
    }

    /// Re-read the authoritative remaining time after a suspension.
    async fn reconcile(&self) -> Option<TimerExit> {
        match self
            .service
            .session_status(&self.user_id, self.attempt_id)
            .await
        {
            Ok(status) if status.is_completed => Some(TimerExit::Completed),
            Ok(status) => {
                lock(&self.state).reconcile(status.remaining_seconds, Instant::now());
                None
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt_id = %self.attempt_id, "Resume reconciliation failed: {}", e);
                None
            }
            Err(e) => Some(TimerExit::Failed(e)),
        }
    }

    /// Save what we have, then seal. A failed seal is retried on the next
    /// tick. If the server still reports time left, keep counting instead.
    async fn expire(&self) -> Option<TimerExit> {
        if let Some(exit) = self.flush().await {
            return Some(exit);
        }
        let remaining = lock(&self.state).remaining(Instant::now());
        if remaining > 0 {
            tracing::info!(
                attempt_id = %self.attempt_id,
                remaining_seconds = remaining,
                "Server reports time left, countdown continues"
            );
            return None;
        }
        match self
            .service
            .force_submit(&self.user_id, self.attempt_id)
            .await
        {
            Ok(attempt) => {
                tracing::info!(attempt_id = %self.attempt_id, "Time is up, attempt auto-submitted");
                Some(TimerExit::AutoSubmitted(attempt))
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt_id = %self.attempt_id, "Auto-submit failed, retrying: {}", e);
                None
            }
            Err(e) => Some(TimerExit::Failed(e)),
        }
    }
}

/// Owner's end of a running timer. Dropping it stops the loop.
pub struct TimerHandle {
    service: SessionService,
    user_id: String,
    attempt_id: Uuid,
    total_questions: usize,
    state: SharedState,
    writes: WriteGate,
    cancel: CancellationToken,
    resume: Arc<Notify>,
    join: Option<JoinHandle<TimerExit>>,
}

impl TimerHandle {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn remaining_seconds(&self) -> i64 {
        lock(&self.state).remaining(Instant::now())
    }

    pub fn snapshot(&self) -> AnswerSnapshot {
        lock(&self.state).snapshot(Instant::now())
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    fn check_index(&self, question_index: usize) -> Result<()> {
        if question_index >= self.total_questions {
            return Err(Error::InvalidIndex(format!(
                "Question index {} is outside 0..{}",
                question_index, self.total_questions
            )));
        }
        Ok(())
    }

    /// Record an answer on the server and locally. A transient store failure
    /// keeps the local change; the next heartbeat carries it.
    pub async fn record_answer(&self, question_index: usize, option_index: AnswerSlot) -> Result<()> {
        self.check_index(question_index)?;
        let _gate = self.writes.lock().await;
        match self
            .service
            .record_answer(&self.user_id, self.attempt_id, question_index, option_index)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt_id = %self.attempt_id, "Answer kept locally: {}", e);
            }
            Err(e) => return Err(e),
        }
        lock(&self.state).answers[question_index] = option_index;
        Ok(())
    }

    pub async fn toggle_flag(&self, question_index: usize) -> Result<()> {
        self.check_index(question_index)?;
        let _gate = self.writes.lock().await;
        let flagged = match self
            .service
            .toggle_flag(&self.user_id, self.attempt_id, question_index)
            .await
        {
            Ok(attempt) => Some(attempt.flagged),
            Err(e) if e.is_transient() => {
                tracing::warn!(attempt_id = %self.attempt_id, "Flag kept locally: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        let mut state = lock(&self.state);
        match flagged {
            Some(server) => state.flagged = server,
            None => {
                if !state.flagged.remove(&question_index) {
                    state.flagged.insert(question_index);
                }
            }
        }
        Ok(())
    }

    /// Ask the loop to reconcile with the server, e.g. when the hosting view
    /// becomes visible again.
    pub fn resume(&self) {
        self.resume.notify_one();
    }

    /// Submit the local snapshot, then stop the loop. On failure the loop
    /// keeps running so the caller can retry or let the timer expire.
    pub async fn submit(&mut self) -> Result<Attempt> {
        let attempt = {
            let _gate = self.writes.lock().await;
            let snapshot = self.snapshot();
            self.service
                .submit(&self.user_id, self.attempt_id, snapshot)
                .await?
        };
        self.shutdown().await;
        Ok(attempt)
    }

    /// Stop the loop and wait for it. Returns `None` if it was already joined.
    pub async fn shutdown(&mut self) -> Option<TimerExit> {
        self.cancel.cancel();
        let join = self.join.take()?;
        Some(join.await.unwrap_or_else(|e| {
            TimerExit::Failed(Error::Internal(format!("Session timer task failed: {}", e)))
        }))
    }

    /// Wait for the loop to end on its own.
    pub async fn wait(mut self) -> TimerExit {
        match self.join.take() {
            Some(join) => join.await.unwrap_or_else(|e| {
                TimerExit::Failed(Error::Internal(format!("Session timer task failed: {}", e)))
            }),
            None => TimerExit::Cancelled,
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
