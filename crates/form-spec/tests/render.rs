use serde_json::json;

use form_spec::{
    EngineConfig, FieldRegistry, FlowEngine, FormDefinition,
    render::{
        RenderStatus, build_slide_payload, render_correction_text, render_json_ui,
        render_preview_text, render_text,
    },
};

fn fixture(name: &str) -> &'static str {
    match name {
        "demo_form" => include_str!("../tests/fixtures/demo_form.json"),
        "branching_form" => include_str!("../tests/fixtures/branching_form.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn engine(name: &str) -> FlowEngine {
    let definition: FormDefinition = serde_json::from_str(fixture(name)).expect("deserialize");
    FlowEngine::new(definition, EngineConfig::default().with_show_correction(true))
}

#[test]
fn render_text_shows_the_start_slide() {
    let engine = engine("demo_form");
    let payload = build_slide_payload(&engine, &FieldRegistry::default(), Some(120));

    assert_eq!(payload.status, RenderStatus::Filling);
    assert_eq!(payload.slide_kind, "start");

    let text = render_text(&payload);
    assert!(text.contains("Form: demo-quiz [filling] slide 1/7"));
    assert!(text.contains("Time left: 02:00"));
    assert!(text.contains("# Geography quiz"));
}

#[test]
fn render_json_ui_exposes_structure() {
    let mut engine = engine("branching_form");
    engine.advance();
    let payload = build_slide_payload(&engine, &FieldRegistry::default(), None);

    let ui = render_json_ui(&payload);
    assert_eq!(ui["form_id"], "branching");
    assert_eq!(ui["slide"]["kind"], "body");
    assert_eq!(ui["progress"]["total"], 5);
    assert!(ui["remaining_seconds"].is_null());
    let fields = ui["fields"].as_array().expect("fields array");
    assert_eq!(fields[0]["name"], "x");
    assert_eq!(fields[0]["options"], json!(["1", "2"]));
    assert_eq!(fields[0]["error"], "This field is required.");
    assert_eq!(ui["navigation"]["can_advance"], true);
    assert_eq!(ui["navigation"]["can_retreat"], false);
}

#[test]
fn hidden_elements_are_not_rendered() {
    let mut engine = engine("demo_form");
    engine.advance();
    engine.record_answer("player", json!("Ada")).unwrap();
    engine.advance();
    engine.record_answer("capital", json!("Paris")).unwrap();
    engine.advance();
    engine.advance();
    assert_eq!(engine.current_slide_index(), 5);

    let registry = FieldRegistry::default();
    let names = |engine: &FlowEngine| {
        build_slide_payload(engine, &registry, None)
            .fields
            .into_iter()
            .filter_map(|field| field.name)
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&engine), ["fun"]);

    engine.record_answer("fun", json!(2)).unwrap();
    assert_eq!(names(&engine), ["fun", "feedback"]);
}

fn payload_status(engine: &FlowEngine) -> RenderStatus {
    build_slide_payload(engine, &FieldRegistry::default(), None).status
}

#[tokio::test]
async fn preview_and_correction_texts() {
    let mut engine = engine("branching_form");
    engine.record_answer("x", json!("1")).unwrap();
    engine.record_answer("b", json!("left")).unwrap();
    engine.advance();
    engine.advance();
    engine.advance();
    assert_eq!(payload_status(&engine), RenderStatus::Previewing);

    let registry = FieldRegistry::default();
    let preview = render_preview_text(&engine, &registry);
    assert!(preview.starts_with("Review your answers:"));
    assert!(preview.contains("Pick a path: 1"));
    assert!(preview.contains("Path one: left"));
    assert!(preview.contains("Path two: (no answer)"));

    engine.submit(&form_spec::NoopSubmitter).await;
    let payload = build_slide_payload(&engine, &registry, None);
    assert_eq!(payload.status, RenderStatus::Submitted);
    assert_eq!(payload.slide_kind, "end");
    assert!(render_text(&payload).contains("Done"));

    let report = engine.score();
    assert_eq!(render_correction_text(&report), "Score: 0 / 0");
}
