use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;

use form_spec::{
    AnswersMap, EngineConfig, FlowEngine, FlowMode, FnSubmitter, FormDefinition, FormSession,
    ManualClock, SubmitFuture, Submitter, TickOutcome, TimerConfig, TimerController,
};

fn demo_session() -> (FormSession, Arc<AtomicUsize>) {
    let definition =
        FormDefinition::from_json(include_str!("../tests/fixtures/demo_form.json")).expect("deserialize");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let submitter: Arc<dyn Submitter> =
        Arc::new(FnSubmitter::new(move |answers: AnswersMap| -> SubmitFuture {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                assert!(answers.contains_key("player"));
                Ok(())
            })
        }));
    let engine = FlowEngine::new(definition, EngineConfig::default().with_show_correction(true));
    (FormSession::new(engine, submitter), calls)
}

#[tokio::test]
async fn resumed_session_past_its_deadline_submits_once() {
    let (session, calls) = demo_session();
    session
        .with_engine(|engine| engine.record_answer("player", json!("Ada")))
        .await
        .unwrap();

    let now = Utc::now();
    let config = TimerConfig::new(Duration::from_secs(60))
        .started_at(now - TimeDelta::minutes(10))
        .with_clock(Arc::new(ManualClock::new(now)));
    let mut timer = TimerController::new(session.clone(), config);

    assert!(matches!(timer.tick().await, TickOutcome::Expired(_)));
    for _ in 0..3 {
        assert_eq!(timer.tick().await, TickOutcome::Finished);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let status = session.status();
    assert_eq!(status.remaining_seconds, Some(0));
    assert!(status.locked);
    assert!(status.submitted);
    assert_eq!(status.mode, FlowMode::Correction);
}

#[tokio::test]
async fn locked_inputs_reject_late_answers() {
    let (session, _calls) = demo_session();
    session
        .with_engine(|engine| engine.record_answer("player", json!("Ada")))
        .await
        .unwrap();

    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));
    let mut timer = TimerController::new(
        session.clone(),
        TimerConfig::new(Duration::from_secs(5)).with_clock(clock.clone()),
    );
    assert_eq!(timer.tick().await, TickOutcome::Running(5));

    clock.advance(TimeDelta::seconds(5));
    timer.tick().await;
    let late = session
        .with_engine(|engine| engine.record_answer("email", json!("ada@example.org")))
        .await;
    assert!(late.is_err());
}
