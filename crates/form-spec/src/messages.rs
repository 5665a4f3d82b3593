//! Validation message lookup.
//!
//! Messages are resolved through a [`MessageSource`] handed to the engine at
//! construction. [`BuiltinMessages`] ships English, French and Arabic tables
//! rendered through handlebars so parameters like `{{min}}` interpolate.

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    RequiredField,
    InvalidEmail,
    InvalidUrl,
    InvalidNumber,
    MinValue,
    MaxValue,
    PatternMismatch,
    MaxLength,
    FileTooLarge,
    InvalidFileType,
    InvalidChoice,
}

impl MessageKey {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            MessageKey::RequiredField => "required",
            MessageKey::InvalidEmail => "invalid_email",
            MessageKey::InvalidUrl => "invalid_url",
            MessageKey::InvalidNumber => "invalid_number",
            MessageKey::MinValue => "min",
            MessageKey::MaxValue => "max",
            MessageKey::PatternMismatch => "pattern_mismatch",
            MessageKey::MaxLength => "max_length",
            MessageKey::FileTooLarge => "file_too_large",
            MessageKey::InvalidFileType => "invalid_file_type",
            MessageKey::InvalidChoice => "invalid_choice",
        }
    }
}

/// Resolves a message for a language tag.
pub trait MessageSource: Send + Sync {
    fn message(&self, language: &str, key: MessageKey, params: &Value) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDirection {
    Ltr,
    Rtl,
}

impl TextDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextDirection::Ltr => "ltr",
            TextDirection::Rtl => "rtl",
        }
    }
}

/// `fr-CA` and `fr_CA` both resolve to `fr`.
pub fn base_language(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn text_direction(language: &str) -> TextDirection {
    match base_language(language).as_str() {
        "ar" | "he" | "fa" | "ur" => TextDirection::Rtl,
        _ => TextDirection::Ltr,
    }
}

type Table = &'static [(MessageKey, &'static str)];

const EN: Table = &[
    (MessageKey::RequiredField, "This field is required."),
    (MessageKey::InvalidEmail, "Please enter a valid email address."),
    (MessageKey::InvalidUrl, "Please enter a valid URL."),
    (MessageKey::InvalidNumber, "Please enter a valid number."),
    (MessageKey::MinValue, "Value must be at least {{min}}."),
    (MessageKey::MaxValue, "Value must be no more than {{max}}."),
    (
        MessageKey::PatternMismatch,
        "The input does not match the required pattern.",
    ),
    (
        MessageKey::MaxLength,
        "Please use no more than {{maxlength}} characters.",
    ),
    (
        MessageKey::FileTooLarge,
        "File is too large. Max size is {{size}}MB.",
    ),
    (MessageKey::InvalidFileType, "This file type is not allowed."),
    (MessageKey::InvalidChoice, "Please choose one of the available options."),
];

const FR: Table = &[
    (MessageKey::RequiredField, "Ce champ est obligatoire."),
    (
        MessageKey::InvalidEmail,
        "Veuillez saisir une adresse e-mail valide.",
    ),
    (MessageKey::InvalidUrl, "Veuillez saisir une URL valide."),
    (MessageKey::InvalidNumber, "Veuillez saisir un nombre valide."),
    (MessageKey::MinValue, "La valeur doit être au moins de {{min}}."),
    (MessageKey::MaxValue, "La valeur ne doit pas dépasser {{max}}."),
    (
        MessageKey::PatternMismatch,
        "L'entrée ne correspond pas au format requis.",
    ),
    (
        MessageKey::MaxLength,
        "Veuillez utiliser au plus {{maxlength}} caractères.",
    ),
    (
        MessageKey::FileTooLarge,
        "Le fichier est trop volumineux. La taille maximale est de {{size}}MB.",
    ),
    (
        MessageKey::InvalidFileType,
        "Ce type de fichier n'est pas autorisé.",
    ),
    (
        MessageKey::InvalidChoice,
        "Veuillez choisir l'une des options proposées.",
    ),
];

const AR: Table = &[
    (MessageKey::RequiredField, "هذا الحقل مطلوب."),
    (
        MessageKey::InvalidEmail,
        "الرجاء إدخال عنوان بريد إلكتروني صالح.",
    ),
    (MessageKey::InvalidUrl, "الرجاء إدخال عنوان URL صالح."),
    (MessageKey::InvalidNumber, "الرجاء إدخال رقم صالح."),
    (MessageKey::MinValue, "يجب أن تكون القيمة {{min}} على الأقل."),
    (MessageKey::MaxValue, "يجب ألا تزيد القيمة عن {{max}}."),
    (
        MessageKey::PatternMismatch,
        "لا يتطابق الإدخال مع النمط المطلوب.",
    ),
    (
        MessageKey::MaxLength,
        "يرجى استخدام {{maxlength}} حرفًا كحد أقصى.",
    ),
    (
        MessageKey::FileTooLarge,
        "الملف كبير جدًا. الحجم الأقصى هو {{size}} ميجابايت.",
    ),
    (MessageKey::InvalidFileType, "نوع الملف هذا غير مسموح به."),
    (MessageKey::InvalidChoice, "يرجى اختيار أحد الخيارات المتاحة."),
];

/// Built-in en/fr/ar message tables; unknown languages fall back to English.
pub struct BuiltinMessages {
    registry: Handlebars<'static>,
}

impl BuiltinMessages {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry }
    }

    pub fn languages() -> &'static [&'static str] {
        &["en", "fr", "ar"]
    }

    fn table(language: &str) -> Table {
        match base_language(language).as_str() {
            "fr" => FR,
            "ar" => AR,
            _ => EN,
        }
    }

    fn template(language: &str, key: MessageKey) -> &'static str {
        Self::table(language)
            .iter()
            .chain(EN.iter())
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, text)| *text)
            .unwrap_or_default()
    }
}

impl Default for BuiltinMessages {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSource for BuiltinMessages {
    fn message(&self, language: &str, key: MessageKey, params: &Value) -> String {
        let template = Self::template(language, key);
        match self.registry.render_template(template, params) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(key = key.code(), %error, "message template failed to render");
                template.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_interpolate() {
        let messages = BuiltinMessages::new();
        assert_eq!(
            messages.message("en", MessageKey::MinValue, &json!({ "min": 3 })),
            "Value must be at least 3."
        );
        assert_eq!(
            messages.message("fr-CA", MessageKey::MaxValue, &json!({ "max": "10" })),
            "La valeur ne doit pas dépasser 10."
        );
    }

    #[test]
    fn unknown_language_falls_back_to_english() {
        let messages = BuiltinMessages::new();
        assert_eq!(
            messages.message("de", MessageKey::RequiredField, &Value::Null),
            "This field is required."
        );
    }

    #[test]
    fn interpolated_values_are_not_html_escaped() {
        let messages = BuiltinMessages::new();
        let text = messages.message("en", MessageKey::MinValue, &json!({ "min": "<1>" }));
        assert_eq!(text, "Value must be at least <1>.");
    }

    #[test]
    fn arabic_is_right_to_left() {
        assert_eq!(text_direction("ar"), TextDirection::Rtl);
        assert_eq!(text_direction("en-GB"), TextDirection::Ltr);
    }
}
