use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use form_spec::{
    Advance, BuiltinMessages, DefinitionError, EngineConfig, Expr, FieldRegistry, FlowEngine,
    FlowMode, FormDefinition, SlidePayload, answers_from_value, answers_schema,
    build_slide_payload, definition_schema, is_correct, lint, render_json_ui as form_render_json_ui,
    render_preview_text, render_text as form_render_text, validate, validate_slide as slide_errors,
};

const DEFAULT_FORM: &str = include_str!("../../form-spec/tests/fixtures/demo_form.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to load form: {0}")]
    Definition(#[from] DefinitionError),
    #[error("form '{0}' is not available")]
    FormUnavailable(String),
    #[error("failed to parse answers/{0}")]
    AnswersParse(#[source] serde_json::Error),
    #[error("slide {0} does not exist")]
    SlideUnavailable(usize),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    form_json: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    show_correction: Option<bool>,
}

/// Host-held flow position. Every call replays it against a fresh engine.
#[derive(Debug, Deserialize, Default)]
struct FlowSnapshot {
    #[serde(default)]
    answers: Value,
    #[serde(default)]
    current_slide_index: usize,
    #[serde(default)]
    mode: Option<FlowMode>,
}

fn parse_config(config_json: &str) -> Result<ComponentConfig, ComponentError> {
    if config_json.trim().is_empty() {
        Ok(ComponentConfig::default())
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)
    }
}

fn engine_config(config: &ComponentConfig) -> EngineConfig {
    let mut engine_config =
        EngineConfig::default().with_show_correction(config.show_correction.unwrap_or(false));
    if let Some(language) = &config.language {
        engine_config = engine_config.with_language(language.clone());
    }
    engine_config
}

fn ensure_form(
    form_id: &str,
    config: &ComponentConfig,
) -> Result<FormDefinition, ComponentError> {
    let form_json = config.form_json.as_deref().unwrap_or(DEFAULT_FORM);
    let definition = FormDefinition::from_json(form_json)?;
    if definition.id() != form_id {
        Err(ComponentError::FormUnavailable(form_id.to_string()))
    } else {
        Ok(definition)
    }
}

fn parse_answers(answers_json: &str) -> Value {
    serde_json::from_str(answers_json).unwrap_or_else(|_| json!({}))
}

fn parse_snapshot(state_json: &str) -> FlowSnapshot {
    serde_json::from_str(state_json).unwrap_or_default()
}

fn replay(form_id: &str, config_json: &str, state_json: &str) -> Result<FlowEngine, ComponentError> {
    let config = parse_config(config_json)?;
    let definition = ensure_form(form_id, &config)?;
    let snapshot = parse_snapshot(state_json);
    tracing::debug!(
        form_id,
        slide = snapshot.current_slide_index,
        "replaying flow snapshot"
    );
    Ok(FlowEngine::new(definition, engine_config(&config))
        .with_answers(answers_from_value(snapshot.answers))
        .resume_at(
            snapshot.current_slide_index,
            snapshot.mode.unwrap_or(FlowMode::Filling),
        ))
}

fn snapshot_value(engine: &FlowEngine) -> Value {
    json!({
        "current_slide_index": engine.current_slide_index(),
        "mode": engine.mode().as_str(),
        "answers": engine.answers(),
        "errors": engine.errors(),
    })
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

pub fn describe(form_id: &str, config_json: &str) -> String {
    respond(
        parse_config(config_json)
            .and_then(|config| ensure_form(form_id, &config))
            .and_then(|definition| {
                serde_json::to_value(definition).map_err(ComponentError::JsonEncode)
            }),
    )
}

pub fn get_answer_schema(form_id: &str, config_json: &str) -> String {
    respond(
        parse_config(config_json)
            .and_then(|config| ensure_form(form_id, &config))
            .map(|definition| answers_schema(&definition)),
    )
}

pub fn get_definition_schema() -> String {
    respond(Ok(definition_schema()))
}

pub fn lint_form(form_id: &str, config_json: &str) -> String {
    respond(
        parse_config(config_json)
            .and_then(|config| ensure_form(form_id, &config))
            .and_then(|definition| {
                serde_json::to_value(lint(&definition)).map_err(ComponentError::JsonEncode)
            }),
    )
}

pub fn validate_answers(form_id: &str, config_json: &str, answers_json: &str) -> String {
    let validation = parse_config(config_json).and_then(|config| {
        let definition = ensure_form(form_id, &config)?;
        let answers = serde_json::from_str(answers_json).map_err(ComponentError::AnswersParse)?;
        let language = config.language.as_deref().unwrap_or("en");
        let result = validate(
            &definition,
            &answers_from_value(answers),
            &BuiltinMessages::new(),
            language,
        );
        serde_json::to_value(result).map_err(ComponentError::JsonEncode)
    });
    respond(validation)
}

pub fn validate_slide(
    form_id: &str,
    config_json: &str,
    slide_index: usize,
    answers_json: &str,
) -> String {
    respond(parse_config(config_json).and_then(|config| {
        let definition = ensure_form(form_id, &config)?;
        let slide_ref = definition
            .traversal()
            .get(slide_index)
            .copied()
            .ok_or(ComponentError::SlideUnavailable(slide_index))?;
        let slide = definition
            .slide(slide_ref)
            .ok_or(ComponentError::SlideUnavailable(slide_index))?;
        let answers = answers_from_value(parse_answers(answers_json));
        let language = config.language.as_deref().unwrap_or("en");
        let errors = slide_errors(slide, &answers, &BuiltinMessages::new(), language);
        Ok(json!({ "valid": errors.is_empty(), "errors": errors }))
    }))
}

/// Applies an advance request to the snapshot and returns the new one.
pub fn next_slide(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(replay(form_id, config_json, state_json).map(|mut engine| {
        let outcome = match engine.advance() {
            Advance::Blocked => "blocked",
            Advance::Moved { .. } => "moved",
            Advance::Preview => "preview",
            Advance::Exhausted => "exhausted",
            Advance::Ignored => "ignored",
        };
        let mut value = snapshot_value(&engine);
        value["outcome"] = json!(outcome);
        value
    }))
}

pub fn previous_slide(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(replay(form_id, config_json, state_json).map(|mut engine| {
        let moved = engine.retreat();
        let mut value = snapshot_value(&engine);
        value["outcome"] = json!(if moved { "moved" } else { "ignored" });
        value
    }))
}

pub fn score(form_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(parse_config(config_json).and_then(|config| {
        let definition = ensure_form(form_id, &config)?;
        let answers = answers_from_value(parse_answers(answers_json));
        let report = form_spec::score(definition.elements(), &answers);
        let percentage = report.percentage();
        let mut value = serde_json::to_value(report).map_err(ComponentError::JsonEncode)?;
        value["percentage"] = json!(percentage);
        Ok(value)
    }))
}

pub fn check_answer(user_answer_json: &str, correct_answer_json: &str) -> String {
    let user_answer: Option<Value> = serde_json::from_str(user_answer_json).ok();
    let correct_answer: Option<Value> = serde_json::from_str(correct_answer_json).ok();
    json!({ "correct": is_correct(user_answer.as_ref(), correct_answer.as_ref()) }).to_string()
}

/// Evaluates a condition the way the engine does. Parse failures are reported
/// alongside the `false` result instead of as an error body.
pub fn evaluate_condition(expression: &str, answers_json: &str) -> String {
    let answers = answers_from_value(parse_answers(answers_json));
    let result = form_spec::evaluate_condition(Some(expression), &answers);
    let (identifiers, diagnostic) = if expression.trim().is_empty() {
        (Vec::new(), None)
    } else {
        match Expr::parse(expression) {
            Ok(expr) => (
                expr.identifiers()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
                None,
            ),
            Err(error) => (Vec::new(), Some(error.to_string())),
        }
    };
    json!({
        "result": result,
        "identifiers": identifiers,
        "diagnostic": diagnostic,
    })
    .to_string()
}

fn render_payload(
    form_id: &str,
    config_json: &str,
    state_json: &str,
) -> Result<(FlowEngine, SlidePayload), ComponentError> {
    let engine = replay(form_id, config_json, state_json)?;
    let payload = build_slide_payload(&engine, &FieldRegistry::default(), None);
    Ok((engine, payload))
}

pub fn render_text(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond_string(
        render_payload(form_id, config_json, state_json).map(|(engine, payload)| {
            if engine.mode() == FlowMode::Previewing {
                render_preview_text(&engine, &FieldRegistry::default())
            } else {
                form_render_text(&payload)
            }
        }),
    )
}

pub fn render_json_ui(form_id: &str, config_json: &str, state_json: &str) -> String {
    respond(
        render_payload(form_id, config_json, state_json)
            .map(|(_, payload)| form_render_json_ui(&payload)),
    )
}
