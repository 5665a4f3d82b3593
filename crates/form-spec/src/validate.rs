use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use globset::{Glob, GlobSetBuilder};
use regex::Regex;
use serde_json::{Value, json};
use url::Url;

use crate::answers::{AnswersMap, ErrorsMap, ValidationError, ValidationResult};
use crate::coerce::{is_blank, is_truthy, to_display_string, to_number};
use crate::messages::{MessageKey, MessageSource};
use crate::spec::element::{Element, ValueContract};
use crate::spec::form::{FormDefinition, SlideRef};
use crate::spec::slide::Slide;
use crate::visibility::visible_elements;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

const DEFAULT_SIZE_LIMIT_MB: f64 = 10.0;

/// The first rule an element's value failed.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub key: MessageKey,
    pub params: Value,
}

impl FieldError {
    fn new(key: MessageKey) -> Self {
        Self {
            key,
            params: Value::Null,
        }
    }

    fn with(key: MessageKey, params: Value) -> Self {
        Self { key, params }
    }

    pub fn code(&self) -> &'static str {
        self.key.code()
    }

    pub fn message(&self, messages: &dyn MessageSource, language: &str) -> String {
        messages.message(language, self.key, &self.params)
    }
}

/// Validates the visible named elements of one slide.
///
/// Hidden elements are skipped; unknown kinds only get the required check.
/// The returned map replaces any previous error set.
pub fn validate_slide(
    slide: &Slide,
    answers: &AnswersMap,
    messages: &dyn MessageSource,
    language: &str,
) -> ErrorsMap {
    let mut errors = ErrorsMap::new();
    for element in visible_elements(slide, answers) {
        let Some(name) = element.name.as_deref() else {
            continue;
        };
        if let Some(error) = validate_element(element, answers.get(name)) {
            errors.insert(name.to_string(), error.message(messages, language));
        }
    }
    errors
}

/// Applies the element's rules in order; first failure wins.
pub fn validate_element(element: &Element, value: Option<&Value>) -> Option<FieldError> {
    let contract = element.kind.value_contract();
    if contract == ValueContract::Display {
        return None;
    }

    if element.required && is_blank(value) {
        return Some(FieldError::new(MessageKey::RequiredField));
    }
    if contract == ValueContract::Opaque {
        tracing::debug!(kind = %element.kind, "no value checks for unknown element type");
        return None;
    }

    let value = value.filter(|value| is_truthy(value))?;

    let type_error = match contract {
        ValueContract::Email => check_email(value),
        ValueContract::Url => check_url(value),
        ValueContract::Number => check_number(element, value),
        _ => None,
    };
    if type_error.is_some() {
        return type_error;
    }

    check_pattern(element, value)
        .or_else(|| check_max_length(element, contract, value))
        .or_else(|| match contract {
            ValueContract::File => check_file(element, value),
            ValueContract::Options => check_options(element, value),
            ValueContract::Scale => check_scale(element, value),
            _ => None,
        })
}

/// Validates every interactive slide at once.
///
/// Required fields that are empty land in `missing_required`, every other
/// failure in `errors`. Answer keys that no element declares are reported in
/// `unknown_fields` but do not make the result invalid, since conditions may
/// read pre-seeded values.
pub fn validate(
    definition: &FormDefinition,
    answers: &AnswersMap,
    messages: &dyn MessageSource,
    language: &str,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut missing_required = Vec::new();

    for (slide_index, slide_ref) in definition.traversal().into_iter().enumerate() {
        if slide_ref == SlideRef::End {
            continue;
        }
        let Some(slide) = definition.slide(slide_ref) else {
            continue;
        };
        for element in visible_elements(slide, answers) {
            let Some(name) = element.name.as_deref() else {
                continue;
            };
            match validate_element(element, answers.get(name)) {
                Some(error) if error.key == MessageKey::RequiredField => {
                    missing_required.push(name.to_string());
                }
                Some(error) => errors.push(ValidationError {
                    name: name.to_string(),
                    slide_index,
                    message: error.message(messages, language),
                    code: error.code().to_string(),
                }),
                None => {}
            }
        }
    }

    let declared: BTreeSet<&str> = definition
        .named_elements()
        .filter_map(|element| element.name.as_deref())
        .collect();
    let unknown_fields = answers
        .keys()
        .filter(|key| !declared.contains(key.as_str()))
        .cloned()
        .collect();

    ValidationResult {
        valid: errors.is_empty() && missing_required.is_empty(),
        errors,
        missing_required,
        unknown_fields,
    }
}

pub fn is_valid_email(text: &str) -> bool {
    EMAIL.is_match(text)
}

/// Absolute URL check using WHATWG parsing rules.
pub fn is_valid_url(text: &str) -> bool {
    Url::parse(text.trim()).is_ok()
}

fn check_email(value: &Value) -> Option<FieldError> {
    (!is_valid_email(&to_display_string(value))).then(|| FieldError::new(MessageKey::InvalidEmail))
}

fn check_url(value: &Value) -> Option<FieldError> {
    (!is_valid_url(&to_display_string(value))).then(|| FieldError::new(MessageKey::InvalidUrl))
}

fn check_number(element: &Element, value: &Value) -> Option<FieldError> {
    let Some(number) = to_number(value).filter(|number| !number.is_nan()) else {
        return Some(FieldError::new(MessageKey::InvalidNumber));
    };
    if let Some(bound) = &element.min
        && let Some(min) = bound_value(bound)
        && number < min
    {
        return Some(FieldError::with(
            MessageKey::MinValue,
            json!({ "min": to_display_string(bound) }),
        ));
    }
    if let Some(bound) = &element.max
        && let Some(max) = bound_value(bound)
        && number > max
    {
        return Some(FieldError::with(
            MessageKey::MaxValue,
            json!({ "max": to_display_string(bound) }),
        ));
    }
    None
}

/// Blank bounds are treated as undeclared.
fn bound_value(bound: &Value) -> Option<f64> {
    if is_blank(Some(bound)) {
        return None;
    }
    to_number(bound).filter(|number| !number.is_nan())
}

fn check_pattern(element: &Element, value: &Value) -> Option<FieldError> {
    let pattern = element.pattern.as_deref().filter(|pattern| !pattern.is_empty())?;
    match Regex::new(pattern) {
        Ok(regex) => (!regex.is_match(&to_display_string(value)))
            .then(|| FieldError::new(MessageKey::PatternMismatch)),
        Err(error) => {
            tracing::warn!(pattern, %error, "ignoring invalid validation pattern");
            None
        }
    }
}

fn check_max_length(element: &Element, contract: ValueContract, value: &Value) -> Option<FieldError> {
    let limit = element.maxlength?;
    if !matches!(
        contract,
        ValueContract::Text | ValueContract::Email | ValueContract::Url
    ) {
        return None;
    }
    (to_display_string(value).chars().count() > limit)
        .then(|| FieldError::with(MessageKey::MaxLength, json!({ "maxlength": limit })))
}

fn check_file(element: &Element, value: &Value) -> Option<FieldError> {
    let files: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let size_limit = element
        .size_limit
        .filter(|limit| *limit > 0.0)
        .unwrap_or(DEFAULT_SIZE_LIMIT_MB);
    let accept = element
        .accept
        .as_deref()
        .filter(|patterns| !patterns.is_empty())
        .and_then(build_accept_set);

    for file in files {
        let Some(handle) = file.as_object() else {
            continue;
        };
        let size = handle.get("size").and_then(Value::as_f64).unwrap_or(0.0);
        if size > size_limit * 1024.0 * 1024.0 {
            return Some(FieldError::with(
                MessageKey::FileTooLarge,
                json!({ "size": size_limit }),
            ));
        }
        let mime = handle.get("type").and_then(Value::as_str).unwrap_or_default();
        if element.image_only && !mime.starts_with("image/") {
            return Some(FieldError::new(MessageKey::InvalidFileType));
        }
        if let Some(accept) = &accept {
            let file_name = handle.get("name").and_then(Value::as_str).unwrap_or_default();
            if !accept.is_match(file_name) && !accept.is_match(mime) {
                return Some(FieldError::new(MessageKey::InvalidFileType));
            }
        }
    }
    None
}

fn build_accept_set(patterns: &[String]) -> Option<globset::GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // `.pdf` style entries behave like `*.pdf`.
        let pattern = if pattern.starts_with('.') {
            format!("*{pattern}")
        } else {
            pattern.clone()
        };
        match Glob::new(&pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(error) => tracing::warn!(%pattern, %error, "ignoring invalid accept pattern"),
        }
    }
    match builder.build() {
        Ok(set) if !set.is_empty() => Some(set),
        Ok(_) => None,
        Err(error) => {
            tracing::warn!(%error, "ignoring accept list");
            None
        }
    }
}

fn check_options(element: &Element, value: &Value) -> Option<FieldError> {
    let allowed: HashSet<String> = element.option_values().into_iter().collect();
    if allowed.is_empty() {
        return None;
    }
    let outside = match value {
        Value::Array(items) => items
            .iter()
            .any(|item| !allowed.contains(&to_display_string(item))),
        other => !allowed.contains(&to_display_string(other)),
    };
    outside.then(|| FieldError::new(MessageKey::InvalidChoice))
}

fn check_scale(element: &Element, value: &Value) -> Option<FieldError> {
    let (low, high) = element.scale_range()?;
    let in_range = to_number(value)
        .filter(|number| number.fract() == 0.0)
        .is_some_and(|number| number >= low as f64 && number <= high as f64);
    (!in_range).then(|| FieldError::new(MessageKey::InvalidChoice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::BuiltinMessages;
    use crate::spec::element::ElementKind;
    use serde_json::json;

    fn element(value: Value) -> Element {
        serde_json::from_value(value).unwrap()
    }

    fn code(element: &Element, value: Value) -> Option<&'static str> {
        validate_element(element, Some(&value)).map(|error| error.code())
    }

    #[test]
    fn required_rejects_every_blank_shape() {
        let field = element(json!({ "type": "text", "name": "a", "required": true }));
        assert_eq!(
            validate_element(&field, None).map(|error| error.key),
            Some(MessageKey::RequiredField)
        );
        for blank in [Value::Null, json!(""), json!([])] {
            assert_eq!(code(&field, blank), Some("required"));
        }
        assert_eq!(code(&field, json!(" ")), None);
    }

    #[test]
    fn email_and_url_formats() {
        let email = Element::input(ElementKind::Email, "mail");
        assert_eq!(code(&email, json!("ada@example.org")), None);
        assert_eq!(code(&email, json!("ada@example")), Some("invalid_email"));

        let url = Element::input(ElementKind::Url, "site");
        assert_eq!(code(&url, json!("https://example.org/path?q=1")), None);
        assert_eq!(code(&url, json!("mailto:ada@example.org")), None);
        assert_eq!(code(&url, json!("example.org")), Some("invalid_url"));
        assert_eq!(code(&url, json!("https://")), Some("invalid_url"));
    }

    #[test]
    fn url_rejects_bad_ports_and_hosts() {
        let url = Element::input(ElementKind::Url, "site");
        for bad in [
            "https://example.com:99999/",
            "http://exa<mple.com/",
            "http://[not-ipv6]/",
            "https://exa%mple.com",
        ] {
            assert_eq!(code(&url, json!(bad)), Some("invalid_url"), "{bad}");
        }
        assert_eq!(code(&url, json!(" https://example.com:8080/a ")), None);
    }

    #[test]
    fn number_bounds_only_apply_once_value_parses() {
        let field = element(json!({ "type": "number", "name": "age", "min": 18, "max": "99" }));
        assert_eq!(code(&field, json!("abc")), Some("invalid_number"));
        assert_eq!(code(&field, json!("17")), Some("min"));
        assert_eq!(code(&field, json!(100)), Some("max"));
        assert_eq!(code(&field, json!(" 42 ")), None);
    }

    #[test]
    fn falsy_values_skip_type_checks() {
        let field = Element::input(ElementKind::Email, "mail");
        assert_eq!(code(&field, json!("")), None);
        let number = element(json!({ "type": "number", "name": "n", "min": 5 }));
        assert_eq!(code(&number, json!(0)), None);
    }

    #[test]
    fn pattern_is_unanchored_and_invalid_patterns_are_skipped() {
        let field = element(json!({ "type": "text", "name": "code", "pattern": "[0-9]{3}" }));
        assert_eq!(code(&field, json!("ab123")), None);
        assert_eq!(code(&field, json!("ab12")), Some("pattern_mismatch"));

        let broken = element(json!({ "type": "text", "name": "code", "pattern": "([" }));
        assert_eq!(code(&broken, json!("anything")), None);
    }

    #[test]
    fn first_failing_rule_wins() {
        let field = element(json!({
            "type": "email", "name": "mail", "pattern": "^x", "maxlength": 3
        }));
        assert_eq!(code(&field, json!("not-an-email")), Some("invalid_email"));
        assert_eq!(code(&field, json!("a@b.co")), Some("pattern_mismatch"));
        assert_eq!(code(&field, json!("x@b.co")), Some("max_length"));
    }

    #[test]
    fn file_rules() {
        let field = element(json!({
            "type": "file", "name": "cv", "sizeLimit": 1, "accept": [".pdf", "image/*"]
        }));
        let ok = json!({ "name": "cv.pdf", "size": 1024, "type": "application/pdf" });
        let big = json!({ "name": "cv.pdf", "size": 2 * 1024 * 1024, "type": "application/pdf" });
        let wrong = json!({ "name": "cv.docx", "size": 10, "type": "application/msword" });
        let photo = json!({ "name": "me", "size": 10, "type": "image/png" });
        assert_eq!(code(&field, ok), None);
        assert_eq!(code(&field, big), Some("file_too_large"));
        assert_eq!(code(&field, wrong), Some("invalid_file_type"));
        assert_eq!(code(&field, photo), None);

        let images = element(json!({ "type": "file", "name": "pic", "imageOnly": true }));
        let pdf = json!({ "name": "a.pdf", "size": 1, "type": "application/pdf" });
        assert_eq!(code(&images, pdf), Some("invalid_file_type"));
    }

    #[test]
    fn choices_and_scales() {
        let select = element(json!({
            "type": "select", "name": "color", "multiple": true,
            "options": ["red", { "label": "Green", "value": "green" }]
        }));
        assert_eq!(code(&select, json!(["red", "green"])), None);
        assert_eq!(code(&select, json!(["red", "blue"])), Some("invalid_choice"));

        let rating = element(json!({ "type": "rating", "name": "stars", "outOf": 3 }));
        assert_eq!(code(&rating, json!(3)), None);
        assert_eq!(code(&rating, json!(4)), Some("invalid_choice"));
    }

    #[test]
    fn unknown_kinds_only_get_the_required_check() {
        let field = element(json!({ "type": "signature", "name": "sig", "required": true }));
        assert_eq!(code(&field, json!("")), Some("required"));
        assert_eq!(code(&field, json!({ "strokes": [] })), None);

        let optional = element(json!({ "type": "signature", "name": "sig" }));
        assert_eq!(validate_element(&optional, None), None);
    }

    #[test]
    fn slide_validation_exempts_hidden_elements() {
        let slide: Slide = serde_json::from_value(json!({
            "elements": [
                { "type": "text", "name": "a", "required": true },
                { "type": "text", "name": "b", "required": true, "displayCondition": "a == 'yes'" }
            ]
        }))
        .unwrap();
        let messages = BuiltinMessages::new();

        let errors = validate_slide(&slide, &AnswersMap::new(), &messages, "en");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("a").map(String::as_str), Some("This field is required."));

        let answers = serde_json::from_value(json!({ "a": "yes" })).unwrap();
        let errors = validate_slide(&slide, &answers, &messages, "fr");
        assert_eq!(errors.get("b").map(String::as_str), Some("Ce champ est obligatoire."));
    }
}
