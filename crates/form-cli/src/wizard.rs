use std::fmt::Write;

use clap::ValueEnum;
use form_spec::{AnswerSet, Element, ErrorsMap, SlidePayload, render_json_ui, render_text};
use serde_json::Value;

/// Controls which bits of state the runner prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: slides and prompts only.
    Clean,
    /// Verbose output: status, visible fields, choices, CBOR export.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RenderMode {
    Text,
    Json,
}

/// Prints slides, prompts and outcomes for the interactive runner.
pub struct SlidePresenter {
    verbosity: Verbosity,
    mode: RenderMode,
    show_answers_json: bool,
}

impl SlidePresenter {
    pub fn new(verbosity: Verbosity, mode: RenderMode, show_answers_json: bool) -> Self {
        Self {
            verbosity,
            mode,
            show_answers_json,
        }
    }

    pub fn show_slide(&self, payload: &SlidePayload) {
        match self.mode {
            RenderMode::Text => println!("{}", render_text(payload)),
            RenderMode::Json => {
                let ui = render_json_ui(payload);
                match serde_json::to_string_pretty(&ui) {
                    Ok(pretty) => println!("{}", pretty),
                    Err(err) => eprintln!("Failed to encode slide: {}", err),
                }
            }
        }
        if self.verbosity.is_verbose() {
            println!(
                "Status: {} ({}/{}, {}%)",
                payload.status.as_str(),
                payload.progress.position,
                payload.progress.total,
                payload.progress.percent
            );
            self.print_visible_fields(payload);
        }
    }

    fn print_visible_fields(&self, payload: &SlidePayload) {
        println!("Visible fields:");
        for field in payload.fields.iter().filter(|field| field.name.is_some()) {
            let mut entry = format!(
                " - {} ({})",
                field.name.as_deref().unwrap_or_default(),
                field.kind
            );
            if field.required {
                entry.push_str(" [required]");
            }
            if field.disabled {
                entry.push_str(" [locked]");
            }
            println!("{}", entry);
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = prompt.title.clone();
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push_str(&format!(" ({})", hint));
        }
        if let Some(current) = &prompt.current {
            line.push_str(&format!(" [{}]", current));
        }
        println!("{}", line);
        if self.verbosity.is_verbose() && !prompt.options.is_empty() {
            println!("Choices: {}", prompt.options.join(", "));
        }
    }

    pub fn show_errors(&self, errors: &ErrorsMap) {
        eprintln!("Please fix the following:");
        for (name, message) in errors {
            eprintln!("  {}: {}", name, message);
        }
    }

    pub fn show_preview(&self, text: &str, locked: bool) {
        println!("{}", text);
        if locked {
            println!("Choose: [s]ubmit, [q]uit");
        } else {
            println!("Choose: [s]ubmit, [e]dit, [q]uit");
        }
    }

    pub fn show_unknown_choice(&self, raw: &str) {
        eprintln!("Unknown choice '{}'.", raw);
    }

    pub fn show_edit_refused(&self) {
        eprintln!("Answers are locked and can no longer be edited.");
    }

    pub fn show_input_locked(&self) {
        eprintln!("Inputs are locked; the answer was not recorded.");
    }

    pub fn show_expired(&self) {
        println!("Time is up.");
    }

    pub fn show_waiting(&self) {
        eprintln!("Input closed; waiting for the countdown.");
    }

    pub fn show_submit_failure(&self, message: &str) {
        eprintln!("Submission failed: {}", message);
        println!("Press enter to retry or type :quit to stop.");
    }

    pub fn show_correction(&self, text: &str) {
        println!("{}", text);
    }

    pub fn show_completion(&self, answer_set: &AnswerSet) {
        println!("Done ✅");
        if self.verbosity.is_verbose() {
            match answer_set.to_cbor() {
                Ok(bytes) => println!("Answers (CBOR hex): {}", encode_hex(&bytes)),
                Err(err) => eprintln!("Failed to serialize answers to CBOR: {}", err),
            }
        }
        if self.show_answers_json {
            match answer_set.to_json_pretty() {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize answers to JSON: {}", err),
            }
        }
    }
}

/// Context used to format a single field prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub name: String,
    pub title: String,
    pub required: bool,
    pub hint: Option<String>,
    pub options: Vec<String>,
    pub current: Option<String>,
}

impl PromptContext {
    /// `None` for elements that carry no answer.
    pub fn new(element: &Element, hint: Option<String>, current: Option<&Value>) -> Option<Self> {
        let name = element.name.clone()?;
        Some(Self {
            title: element.question.clone().unwrap_or_else(|| name.clone()),
            name,
            required: element.required,
            hint,
            options: element.option_values(),
            current: current
                .filter(|value| !value.is_null())
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                }),
        })
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut encoded, "{:02x}", byte);
    }
    encoded
}
