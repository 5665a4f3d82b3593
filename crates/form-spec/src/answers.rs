use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scoring::ScoreSummary;

/// Current answers keyed by element name. Absent keys are unanswered.
pub type AnswersMap = Map<String, Value>;

/// One user-visible message per element name.
pub type ErrorsMap = BTreeMap<String, String>;

/// Answers exported once a form has been submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSet {
    pub form_id: String,
    pub answers: AnswersMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreSummary>,
    pub submitted_at: DateTime<Utc>,
}

impl AnswerSet {
    pub fn new(form_id: impl Into<String>, answers: AnswersMap) -> Self {
        Self {
            form_id: form_id.into(),
            answers,
            score: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: ScoreSummary) -> Self {
        self.score = Some(score);
        self
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A single failed rule, as reported by whole-form validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub name: String,
    pub slide_index: usize,
    pub message: String,
    pub code: String,
}

/// Outcome of validating every interactive slide at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub missing_required: Vec<String>,
    pub unknown_fields: Vec<String>,
}

/// Lifts a JSON object into an answers map; anything else is treated as no answers.
pub fn answers_from_value(value: Value) -> AnswersMap {
    match value {
        Value::Object(map) => map,
        _ => AnswersMap::new(),
    }
}
