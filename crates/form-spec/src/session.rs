use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::answers::AnswersMap;
use crate::flow::{FlowEngine, FlowMode, SkipReason, SubmitOutcome};
use crate::submit::Submitter;

/// Snapshot broadcast to observers whenever the engine or the countdown changes.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub mode: FlowMode,
    pub current_slide_index: usize,
    pub is_submitting: bool,
    pub submitted: bool,
    pub locked: bool,
    pub remaining_seconds: Option<u64>,
    pub last_error: Option<String>,
}

impl SessionStatus {
    fn from_engine(engine: &FlowEngine) -> Self {
        let state = engine.state();
        Self {
            mode: state.mode,
            current_slide_index: state.current_slide_index,
            is_submitting: state.is_submitting,
            submitted: state.submitted,
            locked: state.locked,
            remaining_seconds: None,
            last_error: None,
        }
    }

    fn sync(&mut self, engine: &FlowEngine) {
        let state = engine.state();
        self.mode = state.mode;
        self.current_slide_index = state.current_slide_index;
        self.is_submitting = state.is_submitting;
        self.submitted = state.submitted;
        self.locked = state.locked;
    }
}

struct SessionInner {
    engine: Mutex<FlowEngine>,
    submitter: Arc<dyn Submitter>,
    status: watch::Sender<SessionStatus>,
}

/// One engine shared between the host and the countdown.
///
/// The engine lock is never held while the submitter is awaited, so the
/// countdown keeps observing state during a slow submission.
#[derive(Clone)]
pub struct FormSession {
    inner: Arc<SessionInner>,
}

impl FormSession {
    pub fn new(engine: FlowEngine, submitter: Arc<dyn Submitter>) -> Self {
        let (status, _) = watch::channel(SessionStatus::from_engine(&engine));
        Self {
            inner: Arc::new(SessionInner {
                engine: Mutex::new(engine),
                submitter,
                status,
            }),
        }
    }

    /// Runs `f` against the engine and publishes the resulting state.
    pub async fn with_engine<R>(&self, f: impl FnOnce(&mut FlowEngine) -> R) -> R {
        let mut engine = self.inner.engine.lock().await;
        let result = f(&mut engine);
        self.publish(&engine, None);
        result
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let started = {
            let mut engine = self.inner.engine.lock().await;
            let started = engine.begin_submit();
            self.publish(&engine, None);
            started
        };
        self.complete(started).await
    }

    /// Locks inputs and, while still filling, forces a submission.
    pub async fn expire(&self) -> SubmitOutcome {
        let started = {
            let mut engine = self.inner.engine.lock().await;
            engine.lock_inputs();
            let started = engine.begin_forced_submit();
            self.publish(&engine, None);
            started
        };
        self.complete(started).await
    }

    async fn complete(&self, started: Result<AnswersMap, SkipReason>) -> SubmitOutcome {
        let answers = match started {
            Ok(answers) => answers,
            Err(reason) => return SubmitOutcome::Skipped(reason),
        };
        let result = self.inner.submitter.submit(&answers).await;
        let mut engine = self.inner.engine.lock().await;
        let outcome = engine.finish_submit(result);
        let error = match &outcome {
            SubmitOutcome::Failed(error) => Some(error.to_string()),
            _ => None,
        };
        self.publish(&engine, error);
        outcome
    }

    pub fn publish_remaining(&self, seconds: u64) {
        self.inner.status.send_if_modified(|status| {
            let changed = status.remaining_seconds != Some(seconds);
            status.remaining_seconds = Some(seconds);
            changed
        });
    }

    fn publish(&self, engine: &FlowEngine, error: Option<String>) {
        self.inner.status.send_modify(|status| {
            status.sync(engine);
            status.last_error = error;
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::EngineConfig;
    use crate::spec::form::FormDefinition;
    use crate::submit::{FnSubmitter, NoopSubmitter, SubmitError, SubmitFuture};
    use serde_json::json;

    fn session(submitter: Arc<dyn Submitter>) -> FormSession {
        let definition = FormDefinition::from_value(json!({
            "settings": { "id": "session" },
            "slides": [{ "elements": [{ "type": "text", "name": "a" }] }],
            "endSlide": { "elements": [] }
        }))
        .unwrap();
        FormSession::new(FlowEngine::new(definition, EngineConfig::default()), submitter)
    }

    #[tokio::test]
    async fn status_follows_engine_changes() {
        let session = session(Arc::new(NoopSubmitter));
        let mut updates = session.subscribe();

        session.with_engine(|engine| engine.advance()).await;
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().mode, FlowMode::Previewing);

        assert_eq!(session.submit().await, SubmitOutcome::Submitted);
        let status = session.status();
        assert!(status.submitted);
        assert_eq!(status.current_slide_index, 1);
    }

    #[tokio::test]
    async fn expiry_locks_and_submits_once() {
        let session = session(Arc::new(NoopSubmitter));
        assert_eq!(session.expire().await, SubmitOutcome::Submitted);
        assert!(session.status().locked);
        assert_eq!(
            session.expire().await,
            SubmitOutcome::Skipped(SkipReason::AlreadySubmitted)
        );
    }

    #[tokio::test]
    async fn failures_are_published() {
        let failing = FnSubmitter::new(|_answers: AnswersMap| -> SubmitFuture {
            Box::pin(async { Err(SubmitError::Rejected("closed".into())) })
        });
        let session = session(Arc::new(failing));
        session.with_engine(|engine| engine.advance()).await;

        assert!(matches!(session.submit().await, SubmitOutcome::Failed(_)));
        let status = session.status();
        assert!(!status.is_submitting);
        assert_eq!(status.mode, FlowMode::Previewing);
        assert_eq!(status.last_error.as_deref(), Some("submission rejected: closed"));
    }

    #[tokio::test]
    async fn remaining_seconds_only_notify_on_change() {
        let session = session(Arc::new(NoopSubmitter));
        let mut updates = session.subscribe();
        session.publish_remaining(30);
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();
        session.publish_remaining(30);
        assert!(!updates.has_changed().unwrap());
    }
}
