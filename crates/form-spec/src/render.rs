use serde_json::{Map, Value, json};

use crate::{
    coerce::{is_blank, to_display_string},
    flow::{FlowEngine, FlowMode, Progress},
    messages::{TextDirection, text_direction},
    registry::FieldRegistry,
    scoring::ScoreReport,
    spec::form::SlideRef,
};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// A slide is being filled.
    Filling,
    /// All answers are shown for review.
    Previewing,
    /// Graded results are shown.
    Correction,
    /// The form was submitted and nothing is left to do.
    Submitted,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Filling => "filling",
            RenderStatus::Previewing => "previewing",
            RenderStatus::Correction => "correction",
            RenderStatus::Submitted => "submitted",
        }
    }

    fn of(engine: &FlowEngine) -> Self {
        match engine.mode() {
            FlowMode::Correction => RenderStatus::Correction,
            _ if engine.is_submitted() => RenderStatus::Submitted,
            FlowMode::Previewing => RenderStatus::Previewing,
            FlowMode::Filling => RenderStatus::Filling,
        }
    }
}

/// Describes a single visible element of the current slide.
#[derive(Debug, Clone)]
pub struct RenderField {
    pub name: Option<String>,
    pub kind: String,
    pub question: Option<String>,
    pub description: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub current_value: Option<Value>,
    pub error: Option<String>,
    pub hint: Option<String>,
    pub options: Vec<String>,
    /// The registry's text rendering of the element.
    pub text: String,
}

/// Presentation-agnostic snapshot of the engine.
#[derive(Debug, Clone)]
pub struct SlidePayload {
    pub form_id: String,
    pub status: RenderStatus,
    pub language: String,
    pub direction: TextDirection,
    pub slide_index: usize,
    pub slide_kind: &'static str,
    pub progress: Progress,
    pub remaining_seconds: Option<u64>,
    pub fields: Vec<RenderField>,
    pub can_retreat: bool,
    pub can_advance: bool,
    pub can_edit: bool,
    pub can_submit: bool,
}

/// Build the renderer payload from the engine's current slide.
pub fn build_slide_payload(
    engine: &FlowEngine,
    registry: &FieldRegistry,
    remaining_seconds: Option<u64>,
) -> SlidePayload {
    let answers = engine.answers();
    let fields = engine
        .visible_elements()
        .into_iter()
        .map(|element| {
            let current_value = element
                .name
                .as_deref()
                .and_then(|name| answers.get(name))
                .cloned();
            let widget = registry.resolve(&element.kind);
            RenderField {
                name: element.name.clone(),
                kind: element.kind.label().to_string(),
                question: element.question.clone(),
                description: element.description.clone(),
                required: element.required,
                disabled: engine.is_disabled(element),
                error: element
                    .name
                    .as_deref()
                    .and_then(|name| engine.errors().get(name))
                    .cloned(),
                hint: widget.hint(element),
                options: element.option_values(),
                text: widget.render(element, current_value.as_ref()),
                current_value,
            }
        })
        .collect();

    let slide_kind = match engine.current_slide_ref() {
        Some(SlideRef::Start) => "start",
        Some(SlideRef::Body(_)) => "body",
        Some(SlideRef::End) => "end",
        None => "none",
    };
    let state = engine.state();

    SlidePayload {
        form_id: engine.definition().id().to_string(),
        status: RenderStatus::of(engine),
        language: engine.language().to_string(),
        direction: text_direction(engine.language()),
        slide_index: state.current_slide_index,
        slide_kind,
        progress: engine.progress(),
        remaining_seconds,
        fields,
        can_retreat: engine.can_retreat(),
        can_advance: engine.can_advance(),
        can_edit: state.mode == FlowMode::Previewing
            && !state.locked
            && !state.submitted
            && !state.is_submitting,
        can_submit: state.mode == FlowMode::Previewing && !state.submitted && !state.is_submitting,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &SlidePayload) -> Value {
    let fields = payload
        .fields
        .iter()
        .map(|field| {
            let mut map = Map::new();
            map.insert(
                "name".into(),
                field.name.clone().map(Value::String).unwrap_or(Value::Null),
            );
            map.insert("type".into(), Value::String(field.kind.clone()));
            if let Some(question) = &field.question {
                map.insert("question".into(), Value::String(question.clone()));
            }
            if let Some(description) = &field.description {
                map.insert("description".into(), Value::String(description.clone()));
            }
            map.insert("required".into(), Value::Bool(field.required));
            map.insert("disabled".into(), Value::Bool(field.disabled));
            if let Some(current_value) = &field.current_value {
                map.insert("current_value".into(), current_value.clone());
            }
            if let Some(error) = &field.error {
                map.insert("error".into(), Value::String(error.clone()));
            }
            if let Some(hint) = &field.hint {
                map.insert("hint".into(), Value::String(hint.clone()));
            }
            if !field.options.is_empty() {
                map.insert(
                    "options".into(),
                    Value::Array(field.options.iter().cloned().map(Value::String).collect()),
                );
            }
            map.insert("text".into(), Value::String(field.text.clone()));
            Value::Object(map)
        })
        .collect::<Vec<_>>();

    json!({
        "form_id": payload.form_id,
        "status": payload.status.as_str(),
        "language": payload.language,
        "direction": payload.direction.as_str(),
        "slide": {
            "index": payload.slide_index,
            "kind": payload.slide_kind,
        },
        "progress": {
            "position": payload.progress.position,
            "total": payload.progress.total,
            "percent": payload.progress.percent,
        },
        "remaining_seconds": payload.remaining_seconds,
        "fields": fields,
        "navigation": {
            "can_retreat": payload.can_retreat,
            "can_advance": payload.can_advance,
            "can_edit": payload.can_edit,
            "can_submit": payload.can_submit,
        },
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &SlidePayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Form: {} [{}] slide {}/{}",
        payload.form_id,
        payload.status.as_str(),
        payload.progress.position,
        payload.progress.total
    ));
    if let Some(remaining) = payload.remaining_seconds {
        lines.push(format!("Time left: {}", format_remaining(remaining)));
    }

    for field in &payload.fields {
        let mut entry = field.text.clone();
        if field.name.is_some() {
            if field.required {
                entry.push_str(" [required]");
            }
            if field.disabled {
                entry.push_str(" [locked]");
            }
        }
        lines.push(entry);
        if let Some(description) = &field.description {
            lines.push(format!("  {}", description));
        }
        if let Some(error) = &field.error {
            lines.push(format!("  ! {}", error));
        }
    }

    lines.join("\n")
}

/// `mm:ss`, or `h:mm:ss` past an hour.
pub fn format_remaining(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Read-only review of every visible interactive answer.
pub fn render_preview_text(engine: &FlowEngine, registry: &FieldRegistry) -> String {
    let mut lines = vec!["Review your answers:".to_string()];
    let entries = engine.preview();
    if entries.is_empty() {
        lines.push("  (nothing to review)".to_string());
    }
    for entry in entries {
        lines.push(format!(
            "  {}",
            registry.render(entry.element, entry.value)
        ));
    }
    lines.join("\n")
}

pub fn render_correction_text(report: &ScoreReport) -> String {
    let mut lines = Vec::new();
    let percent = report
        .percentage()
        .map(|percent| format!(" ({percent:.0}%)"))
        .unwrap_or_default();
    lines.push(format!(
        "Score: {} / {}{}",
        format_points(report.total),
        format_points(report.max),
        percent
    ));
    for item in &report.items {
        let mark = if item.correct { "✔" } else { "✘" };
        let label = item.question.as_deref().unwrap_or(&item.name);
        lines.push(format!(
            "{mark} {label} ({}/{})",
            format_points(item.awarded),
            format_points(item.possible)
        ));
        if !item.correct {
            let given = if is_blank(item.user_answer.as_ref()) {
                "(no answer)".to_string()
            } else {
                item.user_answer
                    .as_ref()
                    .map(to_display_string)
                    .unwrap_or_default()
            };
            lines.push(format!("    your answer: {given}"));
            lines.push(format!(
                "    correct answer: {}",
                to_display_string(&item.correct_answer)
            ));
            if let Some(reason) = &item.reason {
                lines.push(format!("    {reason}"));
            }
        }
    }
    lines.join("\n")
}

fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{points:.0}")
    } else {
        format!("{points:.2}")
    }
}
