mod runner;
mod submitter;
mod wizard;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use component_form::{
    evaluate_condition, get_answer_schema, get_definition_schema, lint_form, score as form_score,
    validate_answers,
};
use form_spec::{
    EngineConfig, FieldRegistry, FlowEngine, FormDefinition, FormSession, LintIssue,
    NoopSubmitter, ScoreReport, Submitter, TimerConfig, TimerController, ValidationResult,
    answers_from_value, render_correction_text,
};
use runner::Runner;
use serde_json::{Value, json};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use submitter::{ExportFormat, FileSubmitter};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use wizard::{RenderMode, SlidePresenter, Verbosity};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEFAULT_LOG_FILTER: &str = "slideform=info,form_spec=warn";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Terminal host for slide forms",
    long_about = "Runs slide forms interactively with an optional countdown, and checks, scores and inspects form definitions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill in a form slide by slide.
    Run {
        /// Path to the form definition JSON.
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        /// Optional JSON file containing initial answers.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        /// Message language (defaults to SLIDEFORM_LANG, then `en`).
        #[arg(long)]
        lang: Option<String>,
        /// Countdown length in seconds; the form is submitted when it runs out.
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
        /// RFC 3339 instant the countdown started at, for resumed sessions.
        #[arg(long, value_name = "INSTANT", requires = "duration")]
        started_at: Option<String>,
        /// Show the graded correction after submitting an auto-solvable form.
        #[arg(long)]
        show_correction: bool,
        /// Write the submitted answers to this file.
        #[arg(long, value_name = "PATH")]
        out: Option<PathBuf>,
        /// Encoding of the answers file.
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        export: ExportFormat,
        /// Show verbose output (status, visible fields, choices).
        #[arg(long, alias = "debug")]
        verbose: bool,
        /// Also print the submitted answers as JSON.
        #[arg(long)]
        answers_json: bool,
        /// Render output mode for slides.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Lint a definition and optionally validate answers against it.
    Check {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Grade answers against the declared correct answers.
    Score {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a condition against a set of answers.
    Eval {
        /// Condition source, e.g. `age >= 18 && country == 'FR'`.
        expression: String,
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
    },
    /// Print the JSON Schema of form definitions.
    Schema,
    /// Print the JSON Schema of a form's answers.
    AnswersSchema {
        #[arg(long, value_name = "FORM")]
        form: PathBuf,
    },
}

#[tokio::main]
async fn main() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            form,
            answers,
            lang,
            duration,
            started_at,
            show_correction,
            out,
            export,
            verbose,
            answers_json,
            format,
        } => {
            let options = RunOptions {
                language: resolve_language(lang),
                duration: duration.map(Duration::from_secs),
                started_at: started_at.as_deref().map(parse_instant).transpose()?,
                show_correction,
                out,
                export,
                presenter: SlidePresenter::new(Verbosity::from_verbose(verbose), format, answers_json),
            };
            run_form(&form, answers.as_deref(), options).await
        }
        Command::Check {
            form,
            answers,
            lang,
        } => run_check(&form, answers.as_deref(), &resolve_language(lang)),
        Command::Score {
            form,
            answers,
            json,
        } => run_score(&form, &answers, json),
        Command::Eval {
            expression,
            answers,
        } => run_eval(&expression, answers.as_deref()),
        Command::Schema => print_component_result(&get_definition_schema()),
        Command::AnswersSchema { form } => {
            let (form_id, config_json) = load_form(&form, "en")?;
            print_component_result(&get_answer_schema(&form_id, &config_json))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn resolve_language(flag: Option<String>) -> String {
    flag.or_else(|| env::var("SLIDEFORM_LANG").ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "en".to_string())
}

fn parse_instant(raw: &str) -> CliResult<DateTime<Utc>> {
    let instant = DateTime::parse_from_rfc3339(raw)
        .map_err(|err| format!("invalid --started-at '{}': {}", raw, err))?;
    Ok(instant.with_timezone(&Utc))
}

struct RunOptions {
    language: String,
    duration: Option<Duration>,
    started_at: Option<DateTime<Utc>>,
    show_correction: bool,
    out: Option<PathBuf>,
    export: ExportFormat,
    presenter: SlidePresenter,
}

async fn run_form(form_path: &Path, answers_path: Option<&Path>, options: RunOptions) -> CliResult<()> {
    let definition = Arc::new(FormDefinition::from_json(&fs::read_to_string(form_path)?)?);
    let answers = match answers_path {
        Some(path) => answers_from_value(read_json(path)?),
        None => Default::default(),
    };
    tracing::debug!(form_id = definition.id(), language = %options.language, "starting form");

    let config = EngineConfig::default()
        .with_language(options.language)
        .with_show_correction(options.show_correction);
    let engine = FlowEngine::new(Arc::clone(&definition), config).with_answers(answers);
    let submitter: Arc<dyn Submitter> = match options.out {
        Some(path) => Arc::new(FileSubmitter::new(path, definition, options.export)),
        None => Arc::new(NoopSubmitter),
    };
    let session = FormSession::new(engine, submitter);

    let timer = options.duration.map(|duration| {
        let mut config = TimerConfig::new(duration);
        if let Some(started_at) = options.started_at {
            config = config.started_at(started_at);
        }
        TimerController::new(session.clone(), config).spawn()
    });

    let input = BufReader::new(tokio::io::stdin());
    Runner::new(session, FieldRegistry::default(), options.presenter, input, timer)
        .run()
        .await
}

fn read_json(path: &Path) -> CliResult<Value> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Reads a definition and packs it into a component config.
fn load_form(path: &Path, language: &str) -> CliResult<(String, String)> {
    let form_json = fs::read_to_string(path)?;
    let definition = FormDefinition::from_json(&form_json)?;
    let config_json = json!({ "form_json": form_json, "language": language }).to_string();
    Ok((definition.id().to_string(), config_json))
}

fn run_check(form_path: &Path, answers_path: Option<&Path>, language: &str) -> CliResult<()> {
    let (form_id, config_json) = load_form(form_path, language)?;
    let issues: Vec<LintIssue> =
        serde_json::from_value(parse_component_result(&lint_form(&form_id, &config_json))?)?;
    describe_lint(&issues);
    let lint_failed = form_spec::lint::has_errors(&issues);

    let mut answers_invalid = false;
    if let Some(path) = answers_path {
        let answers = read_json(path)?;
        let result: ValidationResult = serde_json::from_value(parse_component_result(
            &validate_answers(&form_id, &config_json, &answers.to_string()),
        )?)?;
        println!(
            "Validation result: {}",
            if result.valid { "valid" } else { "invalid" }
        );
        describe_validation(&result);
        answers_invalid = !result.valid;
    }

    if lint_failed {
        Err("definition has lint errors".into())
    } else if answers_invalid {
        Err("validation failed".into())
    } else {
        Ok(())
    }
}

fn describe_lint(issues: &[LintIssue]) {
    if issues.is_empty() {
        println!("Definition OK");
        return;
    }
    for issue in issues {
        let mut location = String::new();
        if let Some(slide) = issue.slide_index {
            location.push_str(&format!(" slide {}", slide));
        }
        if let Some(element) = &issue.element {
            location.push_str(&format!(" `{}`", element));
        }
        println!(
            "{} [{}]{}: {}",
            issue.severity.as_str(),
            issue.code,
            location,
            issue.message
        );
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!(
                "  {} (slide {}) - {}",
                error.name, error.slide_index, error.message
            );
        }
    }
    if !result.missing_required.is_empty() {
        println!(
            "Missing required answers: {}",
            result.missing_required.join(", ")
        );
    }
    if !result.unknown_fields.is_empty() {
        println!(
            "Unknown answer fields: {}",
            result.unknown_fields.join(", ")
        );
    }
}

fn run_score(form_path: &Path, answers_path: &Path, as_json: bool) -> CliResult<()> {
    let (form_id, config_json) = load_form(form_path, "en")?;
    let answers = read_json(answers_path)?;
    let report = parse_component_result(&form_score(&form_id, &config_json, &answers.to_string()))?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let report: ScoreReport = serde_json::from_value(report)?;
        println!("{}", render_correction_text(&report));
    }
    Ok(())
}

fn run_eval(expression: &str, answers_path: Option<&Path>) -> CliResult<()> {
    let answers = match answers_path {
        Some(path) => read_json(path)?,
        None => json!({}),
    };
    let response = parse_component_result(&evaluate_condition(expression, &answers.to_string()))?;
    if let Some(diagnostic) = response.get("diagnostic").and_then(Value::as_str) {
        return Err(format!("condition does not parse: {}", diagnostic).into());
    }
    println!("{}", response["result"].as_bool().unwrap_or(false));
    Ok(())
}

fn print_component_result(response: &str) -> CliResult<()> {
    let value = parse_component_result(response)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}
