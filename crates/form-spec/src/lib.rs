#![allow(missing_docs)]

pub mod answers;
pub mod answers_schema;
pub mod coerce;
pub mod equality;
pub mod expr;
pub mod flow;
pub mod lint;
pub mod messages;
pub mod registry;
pub mod render;
pub mod scoring;
pub mod session;
pub mod spec;
pub mod submit;
pub mod timer;
pub mod validate;
pub mod visibility;

pub use answers::{
    AnswerSet, AnswersMap, ErrorsMap, ValidationError, ValidationResult, answers_from_value,
};
pub use answers_schema::{definition_schema, generate as answers_schema};
pub use equality::is_correct;
pub use expr::{CompareOp, EvalError, Expr, ExprError, evaluate_condition};
pub use flow::{
    Advance, EngineConfig, FlowEngine, FlowError, FlowMode, FlowState, PreviewEntry, Progress,
    SkipReason, SubmitOutcome,
};
pub use lint::{LintIssue, Severity, lint};
pub use messages::{
    BuiltinMessages, MessageKey, MessageSource, TextDirection, base_language, text_direction,
};
pub use registry::{FieldRegistry, FieldWidget};
pub use render::{
    RenderField, RenderStatus, SlidePayload, build_slide_payload, format_remaining,
    render_correction_text, render_json_ui, render_preview_text, render_text,
};
pub use scoring::{ScoreReport, ScoreSummary, ScoredItem, score};
pub use session::{FormSession, SessionStatus};
pub use spec::{
    ChoiceOption, Condition, DefinitionError, Element, ElementKind, FormDefinition, FormSettings,
    Slide, SlideOptions, SlideRef, ValueContract,
};
pub use submit::{FnSubmitter, NoopSubmitter, SubmitError, SubmitFuture, Submitter};
pub use timer::{
    Clock, Countdown, ManualClock, SystemClock, TickOutcome, TimerConfig, TimerController,
    TimerHandle,
};
pub use validate::{FieldError, validate, validate_element, validate_slide};
pub use visibility::{VisibilityMap, is_reachable, is_visible, resolve_visibility, visible_elements};
