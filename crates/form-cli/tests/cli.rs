use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};

const DEMO_FORM: &str = include_str!("../../form-spec/tests/fixtures/demo_form.json");
const BRANCHING_FORM: &str = include_str!("../../form-spec/tests/fixtures/branching_form.json");

fn slideform() -> Command {
    let mut cmd = Command::cargo_bin("slideform").expect("binary");
    cmd.env_remove("SLIDEFORM_LANG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn run_walks_the_quiz_to_its_correction() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("demo.json");
    form.write_str(DEMO_FORM)?;
    let out = workspace.child("answers.json");

    slideform()
        .arg("run")
        .arg("--form")
        .arg(form.path())
        .arg("--show-correction")
        .arg("--out")
        .arg(out.path())
        .write_stdin("Ada\n\nparis\nAsia, Europe\nn\n4\ns\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Form: demo-quiz [filling] slide 1/7"))
        .stdout(predicate::str::contains("Review your answers:"))
        .stdout(predicate::str::contains("Score: 15 / 20 (75%)"))
        .stdout(predicate::str::contains("Done ✅"));

    let written: Value = serde_json::from_str(&std::fs::read_to_string(out.path())?)?;
    assert_eq!(written["form_id"], "demo-quiz");
    assert_eq!(written["answers"]["continents"], json!(["Asia", "Europe"]));
    assert_eq!(written["answers"]["bonus"], json!(false));
    assert_eq!(written["score"]["total"], 15.0);
    Ok(())
}

#[test]
fn run_reprompts_until_required_fields_are_filled() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("branching.json");
    form.write_str(BRANCHING_FORM)?;

    slideform()
        .arg("run")
        .arg("--form")
        .arg(form.path())
        .write_stdin("\n3\n2\nsouth\n\ns\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("x: This field is required."))
        .stderr(predicate::str::contains(
            "x: Please choose one of the available options.",
        ))
        .stdout(predicate::str::contains("Path two"))
        .stdout(predicate::str::contains("Done"));
    Ok(())
}

#[test]
fn expired_countdown_submits_without_input() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("branching.json");
    form.write_str(BRANCHING_FORM)?;
    let out = workspace.child("answers.json");

    slideform()
        .arg("run")
        .arg("--form")
        .arg(form.path())
        .arg("--duration")
        .arg("60")
        .arg("--started-at")
        .arg("2000-01-01T00:00:00Z")
        .arg("--out")
        .arg(out.path())
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Time is up."));

    out.assert(predicate::path::exists());
    let written: Value = serde_json::from_str(&std::fs::read_to_string(out.path())?)?;
    assert_eq!(written["form_id"], "branching");
    assert_eq!(written["answers"], json!({}));
    Ok(())
}

#[test]
fn closed_input_without_countdown_fails() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("branching.json");
    form.write_str(BRANCHING_FORM)?;

    slideform()
        .arg("run")
        .arg("--form")
        .arg(form.path())
        .write_stdin("1\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "input closed before the form was submitted",
        ));
    Ok(())
}

#[test]
fn check_reports_lint_errors() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("broken.json");
    form.write_str(
        &json!({
            "settings": { "id": "broken" },
            "slides": [
                { "elements": [{ "type": "text", "name": "a" }, { "type": "text", "name": "a" }] },
                { "elements": [], "slideOptions": { "jumpCondition": "a ==" } }
            ]
        })
        .to_string(),
    )?;

    slideform()
        .arg("check")
        .arg("--form")
        .arg(form.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("error [duplicate_name] slide 0 `a`"))
        .stdout(predicate::str::contains("error [malformed_condition] slide 1"));
    Ok(())
}

#[test]
fn check_validates_answers_in_the_configured_language() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("demo.json");
    form.write_str(DEMO_FORM)?;
    let answers = workspace.child("answers.json");
    answers.write_str(r#"{"player":"Ada","email":"not-an-email","extra":1}"#)?;

    slideform()
        .env("SLIDEFORM_LANG", "fr")
        .arg("check")
        .arg("--form")
        .arg(form.path())
        .arg("--answers")
        .arg(answers.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Definition OK"))
        .stdout(predicate::str::contains("Validation result: invalid"))
        .stdout(predicate::str::contains(
            "email (slide 1) - Veuillez saisir une adresse e-mail valide.",
        ))
        .stdout(predicate::str::contains("Missing required answers: capital"))
        .stdout(predicate::str::contains("Unknown answer fields: extra"));
    Ok(())
}

#[test]
fn score_prints_the_correction() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("demo.json");
    form.write_str(DEMO_FORM)?;
    let answers = workspace.child("answers.json");
    answers.write_str(r#"{"capital":" PARIS","rivers":3}"#)?;

    slideform()
        .arg("score")
        .arg("--form")
        .arg(form.path())
        .arg("--answers")
        .arg(answers.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Score: 10 / 20 (50%)"))
        .stdout(predicate::str::contains("correct answer: 10"));
    Ok(())
}

#[test]
fn eval_prints_the_condition_result() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let answers = workspace.child("answers.json");
    answers.write_str(r#"{"age":"21","country":"FR"}"#)?;

    slideform()
        .arg("eval")
        .arg("age >= 18 && country == 'FR'")
        .arg("--answers")
        .arg(answers.path())
        .assert()
        .success()
        .stdout("true\n");

    slideform()
        .arg("eval")
        .arg("age >=")
        .assert()
        .failure()
        .stderr(predicate::str::contains("condition does not parse"));
    Ok(())
}

#[test]
fn schemas_are_printed() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = TempDir::new()?;
    let form = workspace.child("demo.json");
    form.write_str(DEMO_FORM)?;

    slideform()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"settings\""));

    slideform()
        .arg("answers-schema")
        .arg("--form")
        .arg(form.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"capital\""))
        .stdout(predicate::str::contains("\"title\": \"demo-quiz\""));
    Ok(())
}
