//! Countdown that forces submission when the deadline passes.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::flow::{FlowMode, SubmitOutcome};
use crate::session::FormSession;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct TimerConfig {
    pub duration: Duration,
    /// Defaults to the clock's current instant when the controller is built.
    pub started_at: Option<DateTime<Utc>>,
    pub clock: Arc<dyn Clock>,
}

impl TimerConfig {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            started_at: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Remaining whole seconds until a fixed deadline, never increasing.
#[derive(Debug, Clone)]
pub struct Countdown {
    deadline: DateTime<Utc>,
    last: Option<u64>,
}

impl Countdown {
    pub fn new(started_at: DateTime<Utc>, duration: Duration) -> Self {
        let deadline = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| started_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            deadline,
            last: None,
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining_seconds(&mut self, now: DateTime<Utc>) -> u64 {
        let millis = (self.deadline - now).num_milliseconds().max(0);
        let seconds = u64::try_from(millis / 1000).unwrap_or(0);
        let remaining = self.last.map_or(seconds, |last| last.min(seconds));
        self.last = Some(remaining);
        remaining
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Counting down while the form is being filled.
    Running(u64),
    /// Counting down while the answers are being reviewed.
    Waiting(u64),
    /// The deadline passed on this tick.
    Expired(SubmitOutcome),
    /// Nothing left to do: submitted, in correction, or already expired.
    Finished,
}

impl TickOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TickOutcome::Expired(_) | TickOutcome::Finished)
    }
}

pub struct TimerController {
    session: FormSession,
    countdown: Countdown,
    clock: Arc<dyn Clock>,
    fired: bool,
}

impl TimerController {
    pub fn new(session: FormSession, config: TimerConfig) -> Self {
        let started_at = config.started_at.unwrap_or_else(|| config.clock.now());
        Self {
            session,
            countdown: Countdown::new(started_at, config.duration),
            clock: config.clock,
            fired: false,
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.countdown.deadline()
    }

    pub fn remaining_seconds(&mut self) -> u64 {
        self.countdown.remaining_seconds(self.clock.now())
    }

    /// One step of the countdown. Forces submission at most once.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.fired {
            return TickOutcome::Finished;
        }
        let remaining = self.remaining_seconds();
        self.session.publish_remaining(remaining);

        let status = self.session.status();
        if status.submitted || status.mode == FlowMode::Correction {
            return TickOutcome::Finished;
        }
        if remaining > 0 {
            return match status.mode {
                FlowMode::Filling => TickOutcome::Running(remaining),
                _ => TickOutcome::Waiting(remaining),
            };
        }

        self.fired = true;
        tracing::info!(deadline = %self.countdown.deadline(), "countdown expired");
        TickOutcome::Expired(self.session.expire().await)
    }

    /// Ticks once per second on the runtime until the countdown is done.
    ///
    /// The first tick runs immediately, so a deadline that already passed
    /// submits without waiting.
    pub fn spawn(mut self) -> TimerHandle {
        let task = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = self.tick().await;
                if outcome.is_terminal() {
                    tracing::debug!(?outcome, "countdown stopped");
                    break;
                }
            }
        });
        TimerHandle { task: Some(task) }
    }
}

/// Owns the spawned countdown; dropping it stops the countdown.
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the countdown to finish on its own.
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answers::AnswersMap;
    use crate::flow::{EngineConfig, FlowEngine};
    use crate::spec::form::FormDefinition;
    use crate::submit::{FnSubmitter, SubmitFuture, Submitter};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wall clock driven by tokio's (pausable) time.
    struct RuntimeClock {
        origin: DateTime<Utc>,
        base: tokio::time::Instant,
    }

    impl RuntimeClock {
        fn new() -> Self {
            Self {
                origin: instant("2026-01-01T10:00:00Z"),
                base: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for RuntimeClock {
        fn now(&self) -> DateTime<Utc> {
            self.origin + TimeDelta::from_std(self.base.elapsed()).unwrap()
        }
    }

    fn instant(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    fn counting_session() -> (FormSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let submitter: Arc<dyn Submitter> =
            Arc::new(FnSubmitter::new(move |_answers: AnswersMap| -> SubmitFuture {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }));
        let definition = FormDefinition::from_value(json!({
            "settings": { "id": "timed" },
            "slides": [{ "elements": [{ "type": "text", "name": "a" }] }, { "elements": [] }]
        }))
        .unwrap();
        let engine = FlowEngine::new(definition, EngineConfig::default());
        (FormSession::new(engine, submitter), calls)
    }

    #[test]
    fn remaining_is_floored_and_never_increases() {
        let start = instant("2026-01-01T10:00:00Z");
        let mut countdown = Countdown::new(start, Duration::from_secs(10));
        assert_eq!(countdown.remaining_seconds(start), 10);
        assert_eq!(countdown.remaining_seconds(start + TimeDelta::milliseconds(1500)), 8);
        // a clock stepping backwards does not raise the value
        assert_eq!(countdown.remaining_seconds(start), 8);
        assert_eq!(countdown.remaining_seconds(start + TimeDelta::seconds(60)), 0);
    }

    #[tokio::test]
    async fn expired_deadline_submits_exactly_once() {
        let (session, calls) = counting_session();
        let now = instant("2026-01-01T10:00:00Z");
        let config = TimerConfig::new(Duration::from_secs(30))
            .started_at(now - TimeDelta::minutes(5))
            .with_clock(Arc::new(ManualClock::new(now)));
        let mut timer = TimerController::new(session.clone(), config);

        assert_eq!(timer.tick().await, TickOutcome::Expired(SubmitOutcome::Submitted));
        assert_eq!(timer.tick().await, TickOutcome::Finished);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.status().locked);
    }

    #[tokio::test]
    async fn countdown_runs_until_deadline() {
        let (session, calls) = counting_session();
        let clock = Arc::new(ManualClock::new(instant("2026-01-01T10:00:00Z")));
        let config = TimerConfig::new(Duration::from_secs(3)).with_clock(clock.clone());
        let mut timer = TimerController::new(session.clone(), config);

        assert_eq!(timer.tick().await, TickOutcome::Running(3));
        clock.advance(TimeDelta::seconds(2));
        assert_eq!(timer.tick().await, TickOutcome::Running(1));
        assert_eq!(session.status().remaining_seconds, Some(1));
        clock.advance(TimeDelta::seconds(1));
        assert!(matches!(timer.tick().await, TickOutcome::Expired(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expiry_during_review_locks_without_submitting() {
        let (session, calls) = counting_session();
        let clock = Arc::new(ManualClock::new(instant("2026-01-01T10:00:00Z")));
        let config = TimerConfig::new(Duration::from_secs(5)).with_clock(clock.clone());
        let mut timer = TimerController::new(session.clone(), config);

        session.with_engine(|engine| engine.advance()).await;
        session.with_engine(|engine| engine.advance()).await;
        assert_eq!(timer.tick().await, TickOutcome::Waiting(5));

        clock.advance(TimeDelta::seconds(10));
        assert!(matches!(
            timer.tick().await,
            TickOutcome::Expired(SubmitOutcome::Skipped(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(session.status().locked);
        assert!(!session.with_engine(|engine| engine.edit()).await);
    }

    #[tokio::test]
    async fn manual_submission_stops_the_countdown() {
        let (session, calls) = counting_session();
        let clock = Arc::new(ManualClock::new(instant("2026-01-01T10:00:00Z")));
        let config = TimerConfig::new(Duration::from_secs(5)).with_clock(clock.clone());
        let mut timer = TimerController::new(session.clone(), config);

        session.submit().await;
        clock.advance(TimeDelta::seconds(10));
        assert_eq!(timer.tick().await, TickOutcome::Finished);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_timer_submits_at_the_deadline() {
        let (session, calls) = counting_session();
        let mut updates = session.subscribe();
        let config =
            TimerConfig::new(Duration::from_secs(2)).with_clock(Arc::new(RuntimeClock::new()));
        let handle = TimerController::new(session.clone(), config).spawn();

        handle.finished().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(updates.borrow_and_update().submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_countdown() {
        let (session, calls) = counting_session();
        let config =
            TimerConfig::new(Duration::from_secs(2)).with_clock(Arc::new(RuntimeClock::new()));
        let handle = TimerController::new(session, config).spawn();
        drop(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
