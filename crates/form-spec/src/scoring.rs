use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::answers::AnswersMap;
use crate::equality::is_correct;
use crate::spec::element::Element;

/// Grading outcome for one graded element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub awarded: f64,
    pub possible: f64,
    pub correct: bool,
    /// Explanation, only carried when the answer is wrong.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<Value>,
    pub correct_answer: Value,
}

/// Aggregate totals without the per-item breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total: f64,
    pub max: f64,
    pub items: Vec<ScoredItem>,
}

impl ScoreReport {
    pub fn summary(&self) -> ScoreSummary {
        ScoreSummary {
            total: self.total,
            max: self.max,
        }
    }

    /// Total as a percentage of the maximum, `None` when nothing is graded.
    pub fn percentage(&self) -> Option<f64> {
        (self.max > 0.0).then(|| self.total / self.max * 100.0)
    }

    pub fn correct_count(&self) -> usize {
        self.items.iter().filter(|item| item.correct).count()
    }
}

/// Grades every named element carrying both `answer` and `score`.
///
/// Display conditions are not consulted: an element hidden while filling is
/// still graded against whatever answer was recorded for it.
pub fn score<'a>(
    elements: impl IntoIterator<Item = &'a Element>,
    answers: &AnswersMap,
) -> ScoreReport {
    let mut report = ScoreReport::default();

    for element in elements {
        let (Some(name), Some(expected), Some(points)) =
            (&element.name, &element.answer, element.score)
        else {
            continue;
        };

        let user_answer = answers.get(name);
        let correct = is_correct(user_answer, Some(expected));
        let awarded = if correct { points } else { 0.0 };

        report.total += awarded;
        report.max += points;
        report.items.push(ScoredItem {
            name: name.clone(),
            question: element.question.clone(),
            awarded,
            possible: points,
            correct,
            reason: if correct { None } else { element.reason.clone() },
            user_answer: user_answer.cloned(),
            correct_answer: expected.clone(),
        });
    }

    report
}
