//! Slide flow state machine.
//!
//! [`FlowEngine`] owns the answers, the per-field errors and the position
//! inside the traversal list `[start?, ...slides, end?]`. Navigation follows
//! three modes: `Filling` edits one slide at a time, `Previewing` is a
//! read-only review of every answer, and `Correction` shows graded results
//! after an auto-solvable form is submitted.
//!
//! Submission is split into [`FlowEngine::begin_submit`] and
//! [`FlowEngine::finish_submit`] so a host sharing the engine behind a lock
//! can await the submitter without holding it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::answers::{AnswersMap, ErrorsMap};
use crate::messages::{BuiltinMessages, MessageSource};
use crate::scoring::{ScoreReport, score};
use crate::spec::element::Element;
use crate::spec::form::{FormDefinition, SlideRef};
use crate::spec::slide::Slide;
use crate::submit::{SubmitError, Submitter};
use crate::validate::validate_slide;
use crate::visibility::{is_reachable, is_visible};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    Filling,
    Previewing,
    Correction,
}

impl FlowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowMode::Filling => "filling",
            FlowMode::Previewing => "previewing",
            FlowMode::Correction => "correction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub current_slide_index: usize,
    pub mode: FlowMode,
    /// Held while the submitter is being awaited.
    pub is_submitting: bool,
    pub submitted: bool,
    /// Set once the countdown reaches zero; inputs stop accepting values.
    pub locked: bool,
}

/// Construction-time settings for an engine.
#[derive(Clone)]
pub struct EngineConfig {
    pub language: String,
    /// Show graded results after submitting an auto-solvable form.
    pub show_correction: bool,
    pub messages: Arc<dyn MessageSource>,
}

impl EngineConfig {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_show_correction(mut self, show_correction: bool) -> Self {
        self.show_correction = show_correction;
        self
    }

    pub fn with_messages(mut self, messages: Arc<dyn MessageSource>) -> Self {
        self.messages = messages;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            show_correction: false,
            messages: Arc::new(BuiltinMessages::new()),
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("language", &self.language)
            .field("show_correction", &self.show_correction)
            .finish_non_exhaustive()
    }
}

/// Operations the state machine refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("inputs are locked")]
    InputLocked,
    #[error("form has already been submitted")]
    AlreadySubmitted,
    #[error("answers can only change while filling (current mode: {0})")]
    NotFilling(&'static str),
}

/// Result of an advance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Validation failed; the errors are available from [`FlowEngine::errors`].
    Blocked,
    Moved { from: usize, to: usize },
    /// The last interactive slide was completed, or every slide ahead is skipped.
    Preview,
    /// The traversal has no interactive slide at all.
    Exhausted,
    /// Navigation is not possible in the current state.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    AlreadySubmitted,
    NotFilling,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted,
    Failed(SubmitError),
    Skipped(SkipReason),
}

/// Progress through the traversal list, one-based for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub position: usize,
    pub total: usize,
    pub percent: f64,
}

/// One interactive element listed in the review pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEntry<'a> {
    pub slide_index: usize,
    pub element: &'a Element,
    pub value: Option<&'a Value>,
}

pub struct FlowEngine {
    definition: Arc<FormDefinition>,
    traversal: Vec<SlideRef>,
    config: EngineConfig,
    answers: AnswersMap,
    errors: ErrorsMap,
    state: FlowState,
}

impl FlowEngine {
    pub fn new(definition: impl Into<Arc<FormDefinition>>, config: EngineConfig) -> Self {
        let definition = definition.into();
        let traversal = definition.traversal();
        Self {
            definition,
            traversal,
            config,
            answers: AnswersMap::new(),
            errors: ErrorsMap::new(),
            state: FlowState {
                current_slide_index: 0,
                mode: FlowMode::Filling,
                is_submitting: false,
                submitted: false,
                locked: false,
            },
        }
    }

    /// Starts with pre-seeded answers.
    pub fn with_answers(mut self, answers: AnswersMap) -> Self {
        self.answers = answers;
        self
    }

    /// Restores a position saved by the host, clamped to the traversal list.
    ///
    /// Restoring into `Correction` also marks the form as submitted.
    pub fn resume_at(mut self, index: usize, mode: FlowMode) -> Self {
        self.state.current_slide_index = index.min(self.traversal.len().saturating_sub(1));
        self.state.mode = mode;
        self.state.submitted = mode == FlowMode::Correction;
        self
    }

    pub fn definition(&self) -> &FormDefinition {
        &self.definition
    }

    pub fn shared_definition(&self) -> Arc<FormDefinition> {
        Arc::clone(&self.definition)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn mode(&self) -> FlowMode {
        self.state.mode
    }

    pub fn current_slide_index(&self) -> usize {
        self.state.current_slide_index
    }

    pub fn is_submitting(&self) -> bool {
        self.state.is_submitting
    }

    pub fn is_submitted(&self) -> bool {
        self.state.submitted
    }

    pub fn is_locked(&self) -> bool {
        self.state.locked
    }

    pub fn answers(&self) -> &AnswersMap {
        &self.answers
    }

    pub fn errors(&self) -> &ErrorsMap {
        &self.errors
    }

    pub fn traversal(&self) -> &[SlideRef] {
        &self.traversal
    }

    pub fn slide_count(&self) -> usize {
        self.traversal.len()
    }

    pub fn slide_at(&self, index: usize) -> Option<&Slide> {
        let slide_ref = *self.traversal.get(index)?;
        self.definition.slide(slide_ref)
    }

    pub fn current_slide_ref(&self) -> Option<SlideRef> {
        self.traversal.get(self.state.current_slide_index).copied()
    }

    pub fn current_slide(&self) -> Option<&Slide> {
        self.slide_at(self.state.current_slide_index)
    }

    pub fn is_on_end_slide(&self) -> bool {
        self.current_slide_ref() == Some(SlideRef::End)
    }

    /// The end slide, when present, is never interactive.
    pub fn last_interactive_index(&self) -> Option<usize> {
        let trailing = usize::from(self.definition.end_slide.is_some());
        self.traversal.len().checked_sub(trailing + 1)
    }

    fn accepts_navigation(&self) -> bool {
        self.state.mode == FlowMode::Filling
            && !self.state.locked
            && !self.state.is_submitting
            && !self.state.submitted
            && !self.is_on_end_slide()
    }

    pub fn can_advance(&self) -> bool {
        self.accepts_navigation() && self.last_interactive_index().is_some()
    }

    pub fn can_retreat(&self) -> bool {
        self.accepts_navigation() && self.state.current_slide_index > 0
    }

    /// Whether an element should be rendered as non-interactive.
    pub fn is_disabled(&self, element: &Element) -> bool {
        element.disabled
            || self.state.locked
            || self.state.submitted
            || self.state.mode != FlowMode::Filling
    }

    /// Upserts an answer and clears that field's error.
    pub fn record_answer(&mut self, name: impl Into<String>, value: Value) -> Result<(), FlowError> {
        if self.state.locked {
            return Err(FlowError::InputLocked);
        }
        if self.state.submitted {
            return Err(FlowError::AlreadySubmitted);
        }
        if self.state.mode != FlowMode::Filling {
            return Err(FlowError::NotFilling(self.state.mode.as_str()));
        }
        let name = name.into();
        self.errors.remove(&name);
        self.answers.insert(name, value);
        Ok(())
    }

    /// Recomputes the error set of the current slide, replacing the previous one.
    pub fn validate_current_slide(&mut self) -> &ErrorsMap {
        self.errors = match self.current_slide_ref() {
            Some(SlideRef::End) | None => ErrorsMap::new(),
            Some(slide_ref) => match self.definition.slide(slide_ref) {
                Some(slide) => validate_slide(
                    slide,
                    &self.answers,
                    self.config.messages.as_ref(),
                    &self.config.language,
                ),
                None => ErrorsMap::new(),
            },
        };
        &self.errors
    }

    pub fn advance(&mut self) -> Advance {
        if !self.accepts_navigation() {
            return Advance::Ignored;
        }
        if !self.validate_current_slide().is_empty() {
            tracing::debug!(
                slide = self.state.current_slide_index,
                errors = self.errors.len(),
                "advance blocked by validation"
            );
            return Advance::Blocked;
        }
        let Some(last) = self.last_interactive_index() else {
            return Advance::Exhausted;
        };

        let from = self.state.current_slide_index;
        if from >= last {
            self.state.mode = FlowMode::Previewing;
            return Advance::Preview;
        }

        for to in from + 1..=last {
            let Some(slide) = self.slide_at(to) else {
                continue;
            };
            if is_reachable(slide, &self.answers) {
                self.state.current_slide_index = to;
                return Advance::Moved { from, to };
            }
            tracing::debug!(slide = to, "skipping slide whose jump condition is false");
        }

        tracing::debug!(slide = from, "no reachable slide ahead; entering review");
        self.state.mode = FlowMode::Previewing;
        Advance::Preview
    }

    /// Steps back exactly one slide without re-checking jump conditions.
    pub fn retreat(&mut self) -> bool {
        if !self.can_retreat() {
            return false;
        }
        self.state.current_slide_index -= 1;
        self.errors.clear();
        true
    }

    /// Leaves the review and returns to the last interactive slide.
    pub fn edit(&mut self) -> bool {
        if self.state.mode != FlowMode::Previewing
            || self.state.locked
            || self.state.is_submitting
            || self.state.submitted
        {
            return false;
        }
        let Some(last) = self.last_interactive_index() else {
            return false;
        };
        self.state.mode = FlowMode::Filling;
        self.state.current_slide_index = last;
        self.errors.clear();
        true
    }

    /// Disables every input. Used when the countdown reaches zero.
    pub fn lock_inputs(&mut self) {
        self.state.locked = true;
    }

    /// Takes the submitting latch and snapshots the answers for the submitter.
    pub fn begin_submit(&mut self) -> Result<AnswersMap, SkipReason> {
        if self.state.is_submitting {
            return Err(SkipReason::InFlight);
        }
        if self.state.submitted {
            return Err(SkipReason::AlreadySubmitted);
        }
        self.state.is_submitting = true;
        Ok(self.answers.clone())
    }

    /// Submission forced by the countdown, only taken while still filling.
    pub fn begin_forced_submit(&mut self) -> Result<AnswersMap, SkipReason> {
        if self.state.mode != FlowMode::Filling {
            return Err(SkipReason::NotFilling);
        }
        self.begin_submit()
    }

    /// Releases the latch and applies the post-submission transition.
    pub fn finish_submit(&mut self, result: Result<(), SubmitError>) -> SubmitOutcome {
        self.state.is_submitting = false;
        if let Err(error) = result {
            tracing::warn!(form = self.definition.id(), %error, "submission failed");
            return SubmitOutcome::Failed(error);
        }

        self.state.submitted = true;
        self.errors.clear();
        if self.definition.settings.is_auto_solvable && self.config.show_correction {
            self.state.mode = FlowMode::Correction;
        } else if self.definition.end_slide.is_some() {
            self.state.mode = FlowMode::Filling;
            self.state.current_slide_index = self.traversal.len() - 1;
        }
        tracing::debug!(form = self.definition.id(), mode = self.state.mode.as_str(), "form submitted");
        SubmitOutcome::Submitted
    }

    pub async fn submit(&mut self, submitter: &dyn Submitter) -> SubmitOutcome {
        let answers = match self.begin_submit() {
            Ok(answers) => answers,
            Err(reason) => return SubmitOutcome::Skipped(reason),
        };
        let result = submitter.submit(&answers).await;
        self.finish_submit(result)
    }

    /// Visible elements of the current slide.
    pub fn visible_elements(&self) -> Vec<&Element> {
        self.current_slide()
            .map(|slide| {
                slide
                    .elements
                    .iter()
                    .filter(|element| is_visible(element, &self.answers))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read-only listing of the visible interactive elements of every body slide.
    pub fn preview(&self) -> Vec<PreviewEntry<'_>> {
        let mut entries = Vec::new();
        for (slide_index, slide_ref) in self.traversal.iter().enumerate() {
            if !matches!(slide_ref, SlideRef::Body(_)) {
                continue;
            }
            let Some(slide) = self.definition.slide(*slide_ref) else {
                continue;
            };
            for element in slide.named_elements() {
                if element.kind.is_display() || !is_visible(element, &self.answers) {
                    continue;
                }
                let value = element
                    .name
                    .as_deref()
                    .and_then(|name| self.answers.get(name));
                entries.push(PreviewEntry {
                    slide_index,
                    element,
                    value,
                });
            }
        }
        entries
    }

    pub fn score(&self) -> ScoreReport {
        score(self.definition.elements(), &self.answers)
    }

    pub fn progress(&self) -> Progress {
        let total = self.traversal.len();
        let position = if total == 0 {
            0
        } else {
            self.state.current_slide_index + 1
        };
        let percent = if total == 0 {
            0.0
        } else {
            (position as f64 / total as f64 * 100.0).round()
        };
        Progress {
            position,
            total,
            percent,
        }
    }
}

impl fmt::Debug for FlowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEngine")
            .field("form", &self.definition.id())
            .field("state", &self.state)
            .field("answers", &self.answers.len())
            .field("errors", &self.errors)
            .finish()
    }
}
