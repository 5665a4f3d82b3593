use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::coerce::{is_blank, to_display_string, to_number};

/// Declared element type. Unknown labels are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Heading(u8),
    Paragraph,
    Image,
    HorizontalRule,
    Blockquote,
    UnorderedList,
    OrderedList,
    Code,
    Text,
    TextArea,
    Email,
    Url,
    Tel,
    Password,
    Number,
    Date,
    Time,
    DateTime,
    Select,
    Choice,
    PictureChoice,
    Rating,
    OpinionScale,
    File,
    Switch,
    Unknown(String),
}

/// The kind of value an element produces, as far as validation and grading care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueContract {
    /// Pure display block, never answered.
    Display,
    Text,
    Email,
    Url,
    Number,
    Temporal,
    Options,
    Scale,
    Boolean,
    File,
    /// Unrecognised type: traversed and required-checked only.
    Opaque,
}

impl ElementKind {
    pub fn from_label(label: &str) -> Self {
        match label {
            "h1" => ElementKind::Heading(1),
            "h2" => ElementKind::Heading(2),
            "h3" => ElementKind::Heading(3),
            "h4" => ElementKind::Heading(4),
            "h5" => ElementKind::Heading(5),
            "h6" => ElementKind::Heading(6),
            "p" => ElementKind::Paragraph,
            "img" => ElementKind::Image,
            "hr" => ElementKind::HorizontalRule,
            "blockquote" => ElementKind::Blockquote,
            "ul" => ElementKind::UnorderedList,
            "ol" => ElementKind::OrderedList,
            "code" => ElementKind::Code,
            "text" => ElementKind::Text,
            "textarea" => ElementKind::TextArea,
            "email" => ElementKind::Email,
            "url" => ElementKind::Url,
            "tel" => ElementKind::Tel,
            "password" => ElementKind::Password,
            "number" => ElementKind::Number,
            "date" => ElementKind::Date,
            "time" => ElementKind::Time,
            "datetime" => ElementKind::DateTime,
            "select" => ElementKind::Select,
            "choice" => ElementKind::Choice,
            "pictureChoice" => ElementKind::PictureChoice,
            "rating" => ElementKind::Rating,
            "opinionScale" => ElementKind::OpinionScale,
            "file" => ElementKind::File,
            "switch" => ElementKind::Switch,
            other => ElementKind::Unknown(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ElementKind::Heading(level) => match level {
                1 => "h1",
                2 => "h2",
                3 => "h3",
                4 => "h4",
                5 => "h5",
                _ => "h6",
            },
            ElementKind::Paragraph => "p",
            ElementKind::Image => "img",
            ElementKind::HorizontalRule => "hr",
            ElementKind::Blockquote => "blockquote",
            ElementKind::UnorderedList => "ul",
            ElementKind::OrderedList => "ol",
            ElementKind::Code => "code",
            ElementKind::Text => "text",
            ElementKind::TextArea => "textarea",
            ElementKind::Email => "email",
            ElementKind::Url => "url",
            ElementKind::Tel => "tel",
            ElementKind::Password => "password",
            ElementKind::Number => "number",
            ElementKind::Date => "date",
            ElementKind::Time => "time",
            ElementKind::DateTime => "datetime",
            ElementKind::Select => "select",
            ElementKind::Choice => "choice",
            ElementKind::PictureChoice => "pictureChoice",
            ElementKind::Rating => "rating",
            ElementKind::OpinionScale => "opinionScale",
            ElementKind::File => "file",
            ElementKind::Switch => "switch",
            ElementKind::Unknown(label) => label,
        }
    }

    pub fn value_contract(&self) -> ValueContract {
        match self {
            ElementKind::Heading(_)
            | ElementKind::Paragraph
            | ElementKind::Image
            | ElementKind::HorizontalRule
            | ElementKind::Blockquote
            | ElementKind::UnorderedList
            | ElementKind::OrderedList
            | ElementKind::Code => ValueContract::Display,
            ElementKind::Text
            | ElementKind::TextArea
            | ElementKind::Tel
            | ElementKind::Password => ValueContract::Text,
            ElementKind::Email => ValueContract::Email,
            ElementKind::Url => ValueContract::Url,
            ElementKind::Number => ValueContract::Number,
            ElementKind::Date | ElementKind::Time | ElementKind::DateTime => {
                ValueContract::Temporal
            }
            ElementKind::Select | ElementKind::Choice | ElementKind::PictureChoice => {
                ValueContract::Options
            }
            ElementKind::Rating | ElementKind::OpinionScale => ValueContract::Scale,
            ElementKind::Switch => ValueContract::Boolean,
            ElementKind::File => ValueContract::File,
            ElementKind::Unknown(_) => ValueContract::Opaque,
        }
    }

    pub fn is_display(&self) -> bool {
        matches!(self.value_contract(), ValueContract::Display)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ElementKind::Unknown(_))
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for ElementKind {
    fn from(label: String) -> Self {
        ElementKind::from_label(&label)
    }
}

impl From<ElementKind> for String {
    fn from(kind: ElementKind) -> Self {
        kind.label().to_string()
    }
}

impl Serialize for ElementKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for ElementKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(ElementKind::from(label))
    }
}

/// A condition either as a bare expression or wrapped as `{ "condition": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Condition {
    Expression(String),
    Wrapped { condition: String },
}

impl Condition {
    pub fn expression(&self) -> &str {
        match self {
            Condition::Expression(expression) => expression,
            Condition::Wrapped { condition } => condition,
        }
    }
}

/// One option of a `choice`/`pictureChoice` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ChoiceOption {
    Plain(String),
    Labeled {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
}

impl ChoiceOption {
    pub fn value(&self) -> &str {
        match self {
            ChoiceOption::Plain(value) => value,
            ChoiceOption::Labeled { label, value, .. } => value
                .as_deref()
                .filter(|value| !value.is_empty())
                .unwrap_or(label),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ChoiceOption::Plain(value) => value,
            ChoiceOption::Labeled { label, .. } => label,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

// Numeric hints accept numbers or numeric strings; anything else reads as undeclared.
fn loose_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|value| !is_blank(Some(value)))
        .and_then(|value| to_number(&value))
        .filter(|number| number.is_finite()))
}

fn loose_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    loose_number(deserializer)
}

fn loose_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(loose_number(deserializer)?.map(|number| number.trunc() as i64))
}

fn loose_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    Ok(loose_number(deserializer)?
        .filter(|number| *number >= 0.0)
        .map(|number| number.trunc() as usize))
}

/// One form field or display block within a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub kind: ElementKind,
    /// Present on answerable elements only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_condition: Option<Condition>,
    /// Initial value hint for widgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    // Exam mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_f64")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    // Text-like inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_usize")]
    pub maxlength: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    // Numeric bounds may be declared as numbers or numeric strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,

    // Options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<ChoiceOption>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multiple: bool,

    // Scales
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_i64")]
    pub out_of: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_i64")]
    pub start_at: Option<i64>,

    // Files
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "loose_f64")]
    pub size_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub image_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    // Display blocks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    /// Bare element of the given kind, mostly useful for building definitions in code.
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            name: None,
            question: None,
            description: None,
            required: false,
            disabled: false,
            display_condition: None,
            value: None,
            answer: None,
            score: None,
            reason: None,
            placeholder: None,
            maxlength: None,
            pattern: None,
            min: None,
            max: None,
            options: None,
            choices: None,
            multiple: false,
            out_of: None,
            start_at: None,
            size_limit: None,
            image_only: false,
            accept: None,
            text: None,
            src: None,
            alt: None,
            items: None,
            content: None,
            extra: Map::new(),
        }
    }

    pub fn input(kind: ElementKind, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(kind)
        }
    }

    pub fn display_condition(&self) -> Option<&str> {
        self.display_condition
            .as_ref()
            .map(Condition::expression)
            .filter(|expression| !expression.trim().is_empty())
    }

    /// Both a declared answer and a point value.
    pub fn is_graded(&self) -> bool {
        self.answer.is_some() && self.score.is_some()
    }

    /// Allowed option values for select/choice elements, empty when none are declared.
    pub fn option_values(&self) -> Vec<String> {
        if let Some(choices) = &self.choices {
            return choices
                .iter()
                .map(|choice| choice.value().to_string())
                .collect();
        }
        match &self.options {
            Some(Value::Array(options)) => options
                .iter()
                .filter_map(|option| match option {
                    Value::String(value) => Some(value.clone()),
                    Value::Object(map) => map
                        .get("value")
                        .filter(|value| !value.is_null() && value.as_str() != Some(""))
                        .or_else(|| map.get("label"))
                        .map(to_display_string),
                    _ => None,
                })
                .collect(),
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Inclusive range accepted by rating and opinion-scale elements.
    pub fn scale_range(&self) -> Option<(i64, i64)> {
        match self.kind {
            ElementKind::Rating => {
                let out_of = self.out_of.filter(|value| *value != 0).unwrap_or(5);
                Some((1, out_of.clamp(1, 10)))
            }
            ElementKind::OpinionScale => {
                let start = if self.start_at == Some(0) { 0 } else { 1 };
                let out_of = self.out_of.filter(|value| *value != 0).unwrap_or(10);
                Some((start, out_of))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_and_unknown_kinds_round_trip_labels() {
        for label in ["h3", "pictureChoice", "opinionScale", "datetime", "switch"] {
            assert_eq!(ElementKind::from_label(label).label(), label);
        }
        let custom = ElementKind::from_label("signature");
        assert_eq!(custom, ElementKind::Unknown("signature".into()));
        assert_eq!(custom.value_contract(), ValueContract::Opaque);
    }

    #[test]
    fn display_condition_accepts_both_shapes() {
        let wrapped: Element = serde_json::from_value(json!({
            "type": "text",
            "name": "a",
            "displayCondition": { "condition": "x == 1" }
        }))
        .expect("wrapped");
        let bare: Element = serde_json::from_value(json!({
            "type": "text",
            "name": "a",
            "displayCondition": "x == 1"
        }))
        .expect("bare");
        assert_eq!(wrapped.display_condition(), Some("x == 1"));
        assert_eq!(bare.display_condition(), Some("x == 1"));
    }

    #[test]
    fn option_values_cover_every_declaration_style() {
        let choice: Element = serde_json::from_value(json!({
            "type": "choice",
            "name": "c",
            "choices": ["red", { "label": "Blue", "value": "blue" }, { "label": "Green" }]
        }))
        .expect("choice");
        assert_eq!(choice.option_values(), vec!["red", "blue", "Green"]);

        let select: Element = serde_json::from_value(json!({
            "type": "select",
            "name": "s",
            "options": { "fr": "France", "ma": "Morocco" }
        }))
        .expect("select");
        assert_eq!(select.option_values(), vec!["fr", "ma"]);
    }

    #[test]
    fn scale_ranges_follow_widget_defaults() {
        let rating = Element::input(ElementKind::Rating, "r");
        assert_eq!(rating.scale_range(), Some((1, 5)));
        let mut scale = Element::input(ElementKind::OpinionScale, "o");
        scale.start_at = Some(0);
        scale.out_of = Some(5);
        assert_eq!(scale.scale_range(), Some((0, 5)));
    }

    #[test]
    fn numeric_hints_tolerate_strings_and_floats() {
        let rating: Element = serde_json::from_value(json!({
            "type": "rating", "name": "r", "outOf": 5.0, "score": "2.5"
        }))
        .expect("rating");
        assert_eq!(rating.out_of, Some(5));
        assert_eq!(rating.score, Some(2.5));

        let text: Element = serde_json::from_value(json!({
            "type": "text", "name": "t", "maxlength": "20", "sizeLimit": "", "startAt": "soon"
        }))
        .expect("text");
        assert_eq!(text.maxlength, Some(20));
        assert_eq!(text.size_limit, None);
        assert_eq!(text.start_at, None);
    }
}
