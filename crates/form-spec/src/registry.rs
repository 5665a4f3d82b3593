//! Element-type to widget dispatch for text hosts.
//!
//! Every known kind resolves through its [`ValueContract`]; hosts may register
//! a widget for a specific type label (including labels the engine does not
//! know), and anything left over falls back to a placeholder.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::coerce::{is_blank, to_display_string};
use crate::spec::element::{Element, ElementKind, ValueContract};

/// Text rendering and input parsing for one family of elements.
pub trait FieldWidget: Send + Sync {
    /// One-line rendering of the element and its current value.
    fn render(&self, element: &Element, value: Option<&Value>) -> String;

    /// Extra guidance shown next to an input prompt.
    fn hint(&self, _element: &Element) -> Option<String> {
        None
    }

    /// Converts a line of user input into an answer value.
    fn parse_input(&self, _element: &Element, raw: &str) -> Value {
        Value::String(raw.to_string())
    }
}

fn title(element: &Element) -> String {
    element
        .question
        .clone()
        .or_else(|| element.name.clone())
        .unwrap_or_else(|| element.kind.to_string())
}

fn current(value: Option<&Value>) -> String {
    if is_blank(value) {
        return "(no answer)".to_string();
    }
    value.map(to_display_string).unwrap_or_default()
}

pub struct DisplayWidget;

impl FieldWidget for DisplayWidget {
    fn render(&self, element: &Element, _value: Option<&Value>) -> String {
        let text = element
            .text
            .clone()
            .or_else(|| element.content.clone())
            .unwrap_or_default();
        match &element.kind {
            ElementKind::Heading(level) => {
                format!("{} {}", "#".repeat(usize::from(*level)), text)
            }
            ElementKind::Blockquote => format!("> {text}"),
            ElementKind::HorizontalRule => "----".to_string(),
            ElementKind::Image => format!(
                "[image: {}]",
                element
                    .alt
                    .as_deref()
                    .or(element.src.as_deref())
                    .unwrap_or_default()
            ),
            ElementKind::UnorderedList | ElementKind::OrderedList => {
                let ordered = element.kind == ElementKind::OrderedList;
                element
                    .items
                    .iter()
                    .flatten()
                    .enumerate()
                    .map(|(index, item)| {
                        if ordered {
                            format!("{}. {item}", index + 1)
                        } else {
                            format!("* {item}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            ElementKind::Code => format!("```\n{text}\n```"),
            _ => text,
        }
    }
}

pub struct TextWidget;

impl FieldWidget for TextWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        let shown = if element.kind == ElementKind::Password && !is_blank(value) {
            "********".to_string()
        } else {
            current(value)
        };
        format!("{}: {}", title(element), shown)
    }

    fn hint(&self, element: &Element) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(placeholder) = &element.placeholder {
            parts.push(placeholder.clone());
        }
        match element.kind {
            ElementKind::Date => parts.push("YYYY-MM-DD".into()),
            ElementKind::Time => parts.push("HH:MM".into()),
            ElementKind::DateTime => parts.push("YYYY-MM-DDTHH:MM".into()),
            ElementKind::Number => {
                if let (Some(min), Some(max)) = (&element.min, &element.max) {
                    parts.push(format!("{}..{}", to_display_string(min), to_display_string(max)));
                }
            }
            _ => {}
        }
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

pub struct ChoiceWidget;

impl FieldWidget for ChoiceWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        format!("{}: {}", title(element), current(value))
    }

    fn hint(&self, element: &Element) -> Option<String> {
        let options = element.option_values();
        if options.is_empty() {
            return None;
        }
        let joined = options.join(" | ");
        Some(if element.multiple {
            format!("{joined} (comma separated)")
        } else {
            joined
        })
    }

    fn parse_input(&self, element: &Element, raw: &str) -> Value {
        if !element.multiple {
            return Value::String(raw.trim().to_string());
        }
        Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )
    }
}

pub struct ScaleWidget;

impl FieldWidget for ScaleWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        match (element.kind.clone(), value.and_then(Value::as_i64)) {
            (ElementKind::Rating, Some(stars)) => {
                let (_, high) = element.scale_range().unwrap_or((1, 5));
                let filled = stars.clamp(0, high) as usize;
                let empty = (high as usize).saturating_sub(filled);
                format!("{}: {}{}", title(element), "★".repeat(filled), "☆".repeat(empty))
            }
            _ => format!("{}: {}", title(element), current(value)),
        }
    }

    fn hint(&self, element: &Element) -> Option<String> {
        element
            .scale_range()
            .map(|(low, high)| format!("{low}..{high}"))
    }

    fn parse_input(&self, _element: &Element, raw: &str) -> Value {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

pub struct SwitchWidget;

impl FieldWidget for SwitchWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        let on = value.and_then(Value::as_bool).unwrap_or(false);
        format!("{}: [{}]", title(element), if on { "x" } else { " " })
    }

    fn hint(&self, _element: &Element) -> Option<String> {
        Some("y/n".into())
    }

    fn parse_input(&self, _element: &Element, raw: &str) -> Value {
        let raw = raw.trim().to_ascii_lowercase();
        Value::Bool(matches!(raw.as_str(), "y" | "yes" | "true" | "1" | "on"))
    }
}

pub struct FileWidget;

impl FieldWidget for FileWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        let shown = match value {
            Some(Value::Object(handle)) => handle
                .get("name")
                .map(to_display_string)
                .unwrap_or_else(|| current(value)),
            other => current(other),
        };
        format!("{}: {}", title(element), shown)
    }

    fn hint(&self, element: &Element) -> Option<String> {
        element
            .accept
            .as_ref()
            .map(|accept| format!("accepts {}", accept.join(", ")))
    }

    /// Accepts a JSON file handle or a bare file name.
    fn parse_input(&self, _element: &Element, raw: &str) -> Value {
        let raw = raw.trim();
        if raw.is_empty() {
            return Value::Null;
        }
        if let Ok(handle @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
            return handle;
        }
        json!({ "name": raw, "size": 0, "type": mime_for(raw) })
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Placeholder for element types nothing is registered for.
pub struct FallbackWidget;

impl FieldWidget for FallbackWidget {
    fn render(&self, element: &Element, value: Option<&Value>) -> String {
        format!(
            "{}: {} (unsupported field type `{}`)",
            title(element),
            current(value),
            element.kind
        )
    }
}

/// Resolves the widget for an element kind.
#[derive(Clone)]
pub struct FieldRegistry {
    overrides: HashMap<String, Arc<dyn FieldWidget>>,
    display: Arc<dyn FieldWidget>,
    text: Arc<dyn FieldWidget>,
    choice: Arc<dyn FieldWidget>,
    scale: Arc<dyn FieldWidget>,
    switch: Arc<dyn FieldWidget>,
    file: Arc<dyn FieldWidget>,
    fallback: Arc<dyn FieldWidget>,
}

impl FieldRegistry {
    /// Widgets for every known kind.
    pub fn with_defaults() -> Self {
        Self {
            overrides: HashMap::new(),
            display: Arc::new(DisplayWidget),
            text: Arc::new(TextWidget),
            choice: Arc::new(ChoiceWidget),
            scale: Arc::new(ScaleWidget),
            switch: Arc::new(SwitchWidget),
            file: Arc::new(FileWidget),
            fallback: Arc::new(FallbackWidget),
        }
    }

    /// Registers a widget for a type label, replacing the built-in one.
    pub fn register(&mut self, label: impl Into<String>, widget: Arc<dyn FieldWidget>) {
        self.overrides.insert(label.into(), widget);
    }

    pub fn is_registered(&self, kind: &ElementKind) -> bool {
        self.overrides.contains_key(kind.label()) || !kind.is_unknown()
    }

    pub fn resolve(&self, kind: &ElementKind) -> &dyn FieldWidget {
        if let Some(widget) = self.overrides.get(kind.label()) {
            return widget.as_ref();
        }
        let widget = match kind.value_contract() {
            ValueContract::Display => &self.display,
            ValueContract::Text
            | ValueContract::Email
            | ValueContract::Url
            | ValueContract::Number
            | ValueContract::Temporal => &self.text,
            ValueContract::Options => &self.choice,
            ValueContract::Scale => &self.scale,
            ValueContract::Boolean => &self.switch,
            ValueContract::File => &self.file,
            ValueContract::Opaque => &self.fallback,
        };
        widget.as_ref()
    }

    pub fn render(&self, element: &Element, value: Option<&Value>) -> String {
        self.resolve(&element.kind).render(element, value)
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
