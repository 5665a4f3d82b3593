//! Static checks over a definition. Lint never blocks loading; hosts decide
//! what to do with the issues.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::spec::form::FormDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
}

impl LintIssue {
    fn new(severity: Severity, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            slide_index: None,
            element: None,
        }
    }

    fn at(mut self, slide_index: usize, element: Option<&str>) -> Self {
        self.slide_index = Some(slide_index);
        self.element = element.map(str::to_string);
        self
    }
}

pub fn has_errors(issues: &[LintIssue]) -> bool {
    issues.iter().any(|issue| issue.severity == Severity::Error)
}

pub fn lint(definition: &FormDefinition) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let traversal = definition.traversal();
    if traversal.is_empty() {
        issues.push(LintIssue::new(
            Severity::Warning,
            "empty_form",
            "definition has no slides",
        ));
        return issues;
    }

    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    let declared: BTreeSet<&str> = definition
        .named_elements()
        .filter_map(|element| element.name.as_deref())
        .collect();

    for (slide_index, slide_ref) in traversal.iter().enumerate() {
        let Some(slide) = definition.slide(*slide_ref) else {
            continue;
        };
        if let Some(condition) = slide.jump_condition() {
            check_condition(condition, &declared, slide_index, None, &mut issues);
        }

        for element in &slide.elements {
            let name = element.name.as_deref();
            if let Some(name) = name
                && let Some(first) = seen.insert(name, slide_index)
            {
                issues.push(
                    LintIssue::new(
                        Severity::Error,
                        "duplicate_name",
                        format!("`{name}` is also declared on slide {first}"),
                    )
                    .at(slide_index, Some(name)),
                );
            }
            if element.is_graded() && name.is_none() {
                issues.push(
                    LintIssue::new(
                        Severity::Warning,
                        "graded_without_name",
                        format!("graded `{}` element has no name and is never scored", element.kind),
                    )
                    .at(slide_index, None),
                );
            }
            if element.kind.is_unknown() {
                issues.push(
                    LintIssue::new(
                        Severity::Info,
                        "unknown_type",
                        format!("element type `{}` is not built in", element.kind),
                    )
                    .at(slide_index, name),
                );
            }
            if let Some(pattern) = element.pattern.as_deref()
                && let Err(error) = Regex::new(pattern)
            {
                issues.push(
                    LintIssue::new(
                        Severity::Warning,
                        "invalid_pattern",
                        format!("pattern `{pattern}` is ignored: {error}"),
                    )
                    .at(slide_index, name),
                );
            }
            if let Some(condition) = element.display_condition() {
                check_condition(condition, &declared, slide_index, name, &mut issues);
            }
        }
    }

    issues
}

fn check_condition(
    source: &str,
    declared: &BTreeSet<&str>,
    slide_index: usize,
    element: Option<&str>,
    issues: &mut Vec<LintIssue>,
) {
    match Expr::parse(source) {
        Ok(expr) => {
            for name in expr.identifiers() {
                if !declared.contains(name) {
                    issues.push(
                        LintIssue::new(
                            Severity::Warning,
                            "unknown_reference",
                            format!("condition `{source}` reads `{name}`, which no element declares"),
                        )
                        .at(slide_index, element),
                    );
                }
            }
        }
        Err(error) => issues.push(
            LintIssue::new(
                Severity::Error,
                "malformed_condition",
                format!("condition `{source}` does not parse: {error}"),
            )
            .at(slide_index, element),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn codes(issues: &[LintIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.code.as_str()).collect()
    }

    #[test]
    fn clean_definition_has_no_issues() {
        let definition = FormDefinition::from_value(json!({
            "settings": { "id": "clean" },
            "slides": [
                { "elements": [{ "type": "switch", "name": "pet" }] },
                { "elements": [{ "type": "text", "name": "petName" }], "slideOptions": { "jumpCondition": "pet" } }
            ]
        }))
        .unwrap();
        assert!(lint(&definition).is_empty());
    }

    #[test]
    fn reports_every_kind_of_problem() {
        let definition = FormDefinition::from_value(json!({
            "settings": { "id": "messy" },
            "slides": [
                { "elements": [
                    { "type": "text", "name": "a", "pattern": "(" },
                    { "type": "text", "answer": "x", "score": 1 }
                ] },
                { "elements": [
                    { "type": "text", "name": "a", "displayCondition": "b == 1" },
                    { "type": "signature", "name": "sig" }
                ], "slideOptions": { "jumpCondition": "a ==" } }
            ]
        }))
        .unwrap();
        let issues = lint(&definition);
        assert_eq!(
            codes(&issues),
            vec![
                "invalid_pattern",
                "graded_without_name",
                "malformed_condition",
                "duplicate_name",
                "unknown_reference",
                "unknown_type",
            ]
        );
        assert!(has_errors(&issues));
        assert_eq!(issues[3].slide_index, Some(1));
        assert_eq!(issues[3].element.as_deref(), Some("a"));
    }

    #[test]
    fn empty_definitions_are_flagged() {
        let definition = FormDefinition::from_value(json!({ "settings": { "id": "empty" } })).unwrap();
        assert_eq!(codes(&lint(&definition)), vec!["empty_form"]);
    }
}
