//! Condition language for `jumpCondition` and `displayCondition`.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := equality ( "&&" equality )*
//! equality   := relational ( ( "==" | "!=" | "===" | "!==" ) relational )*
//! relational := unary ( ( "<" | "<=" | ">" | ">=" ) unary )*
//! unary      := "!" unary | "-" number | primary
//! primary    := number | string | true | false | null | undefined | identifier | "(" or ")"
//! ```
//!
//! Identifiers resolve against the answers map and nothing else.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::iter::Peekable;
use std::str::CharIndices;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::answers::AnswersMap;
use crate::coerce::{compare, is_truthy, loose_eq, strict_eq};

const MAX_DEPTH: usize = 64;

/// Failure to turn a condition string into an [`Expr`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nests too deeply")]
    TooDeep,
    #[error("expression is empty")]
    Empty,
}

/// Failure while evaluating a parsed expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("'{0}' has not been answered")]
    Unresolved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::LooseEq => "==",
            CompareOp::LooseNe => "!=",
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn apply(&self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::LooseEq => loose_eq(left, right),
            CompareOp::LooseNe => !loose_eq(left, right),
            CompareOp::StrictEq => strict_eq(left, right),
            CompareOp::StrictNe => !strict_eq(left, right),
            CompareOp::Lt => compare(left, right) == Some(Ordering::Less),
            CompareOp::Le => matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => compare(left, right) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

/// Parsed condition AST.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: Value,
    },
    Var {
        name: String,
    },
    Not {
        expression: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        cmp: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = lex(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
            }),
        }
    }

    /// Answer names referenced anywhere in the expression.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Var { name } => {
                names.insert(name);
            }
            Expr::Not { expression } => expression.collect_identifiers(names),
            Expr::And { left, right }
            | Expr::Or { left, right }
            | Expr::Compare { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
        }
    }

    /// Evaluates to a value. `&&`/`||` yield one of their operands.
    pub fn evaluate_value(&self, answers: &AnswersMap) -> Result<Value, EvalError> {
        match self {
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Var { name } => answers
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::Unresolved(name.clone())),
            Expr::Not { expression } => {
                Ok(Value::Bool(!is_truthy(&expression.evaluate_value(answers)?)))
            }
            Expr::And { left, right } => {
                let left = left.evaluate_value(answers)?;
                if is_truthy(&left) {
                    right.evaluate_value(answers)
                } else {
                    Ok(left)
                }
            }
            Expr::Or { left, right } => {
                let left = left.evaluate_value(answers)?;
                if is_truthy(&left) {
                    Ok(left)
                } else {
                    right.evaluate_value(answers)
                }
            }
            Expr::Compare { cmp, left, right } => {
                let left = left.evaluate_value(answers)?;
                let right = right.evaluate_value(answers)?;
                Ok(Value::Bool(cmp.apply(&left, &right)))
            }
        }
    }

    /// Boolean result. Any reference to an unanswered name makes the whole
    /// condition false, even on a branch that would short-circuit.
    pub fn evaluate(&self, answers: &AnswersMap) -> Result<bool, EvalError> {
        if let Some(missing) = self
            .identifiers()
            .into_iter()
            .find(|name| !answers.contains_key(*name))
        {
            return Err(EvalError::Unresolved(missing.to_string()));
        }
        self.evaluate_value(answers).map(|value| is_truthy(&value))
    }

    pub fn to_source(&self) -> String {
        match self {
            Expr::Literal { value } => value.to_string(),
            Expr::Var { name } => name.clone(),
            Expr::Not { expression } => format!("!{}", expression.to_source_grouped()),
            Expr::And { left, right } => format!(
                "{} && {}",
                left.to_source_grouped(),
                right.to_source_grouped()
            ),
            Expr::Or { left, right } => format!(
                "{} || {}",
                left.to_source_grouped(),
                right.to_source_grouped()
            ),
            Expr::Compare { cmp, left, right } => format!(
                "{} {} {}",
                left.to_source_grouped(),
                cmp.symbol(),
                right.to_source_grouped()
            ),
        }
    }

    fn to_source_grouped(&self) -> String {
        match self {
            Expr::Literal { .. } | Expr::Var { .. } | Expr::Not { .. } => self.to_source(),
            _ => format!("({})", self.to_source()),
        }
    }
}

/// Evaluates an optional condition string against the answers.
///
/// Absent or blank conditions are unconditionally true. Malformed conditions
/// are reported through `tracing` and evaluate to false.
pub fn evaluate_condition(expression: Option<&str>, answers: &AnswersMap) -> bool {
    let Some(source) = expression.map(str::trim).filter(|source| !source.is_empty()) else {
        return true;
    };
    let expr = match Expr::parse(source) {
        Ok(expr) => expr,
        Err(error) => {
            tracing::warn!(expression = source, %error, "malformed condition evaluated as false");
            return false;
        }
    };
    match expr.evaluate(answers) {
        Ok(result) => result,
        Err(error) => {
            tracing::debug!(expression = source, %error, "condition depends on an unanswered question");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Minus,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Number(number) => format!("number {}", number),
            TokenKind::Str(text) => format!("string '{}'", text),
            TokenKind::True => "'true'".into(),
            TokenKind::False => "'false'".into(),
            TokenKind::Null => "'null'".into(),
            TokenKind::LooseEq => "'=='".into(),
            TokenKind::LooseNe => "'!='".into(),
            TokenKind::StrictEq => "'==='".into(),
            TokenKind::StrictNe => "'!=='".into(),
            TokenKind::Lt => "'<'".into(),
            TokenKind::Le => "'<='".into(),
            TokenKind::Gt => "'>'".into(),
            TokenKind::Ge => "'>='".into(),
            TokenKind::AndAnd => "'&&'".into(),
            TokenKind::OrOr => "'||'".into(),
            TokenKind::Bang => "'!'".into(),
            TokenKind::Minus => "'-'".into(),
            TokenKind::LParen => "'('".into(),
            TokenKind::RParen => "')'".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '$'
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if is_ident_start(ch) {
            let mut ident = String::new();
            while let Some(&(_, next)) = chars.peek() {
                if !is_ident_continue(next) {
                    break;
                }
                ident.push(next);
                chars.next();
            }
            let kind = match ident.as_str() {
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "null" | "undefined" => TokenKind::Null,
                _ => TokenKind::Ident(ident),
            };
            tokens.push(Token { kind, offset });
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && next_is_digit(source, offset + 1)) {
            let mut text = String::new();
            let mut previous = '\0';
            while let Some(&(_, next)) = chars.peek() {
                let exponent_sign = matches!(next, '+' | '-') && matches!(previous, 'e' | 'E');
                if !(next.is_ascii_alphanumeric() || next == '.' || exponent_sign) {
                    break;
                }
                text.push(next);
                previous = next;
                chars.next();
            }
            let number = text
                .parse::<f64>()
                .ok()
                .filter(|number| number.is_finite())
                .ok_or_else(|| ExprError::InvalidNumber {
                    text: text.clone(),
                    offset,
                })?;
            tokens.push(Token {
                kind: TokenKind::Number(number),
                offset,
            });
            continue;
        }

        if ch == '"' || ch == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, next)) = chars.next() {
                match next {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, 'r')) => text.push('\r'),
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    },
                    quote if quote == ch => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(ExprError::UnterminatedString { offset });
            }
            tokens.push(Token {
                kind: TokenKind::Str(text),
                offset,
            });
            continue;
        }

        chars.next();
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '-' => TokenKind::Minus,
            '=' if follows(&mut chars, '=') => {
                if follows(&mut chars, '=') {
                    TokenKind::StrictEq
                } else {
                    TokenKind::LooseEq
                }
            }
            '!' => {
                if follows(&mut chars, '=') {
                    if follows(&mut chars, '=') {
                        TokenKind::StrictNe
                    } else {
                        TokenKind::LooseNe
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if follows(&mut chars, '=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if follows(&mut chars, '=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' if follows(&mut chars, '&') => TokenKind::AndAnd,
            '|' if follows(&mut chars, '|') => TokenKind::OrOr,
            other => return Err(ExprError::UnexpectedChar { ch: other, offset }),
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn follows(chars: &mut Peekable<CharIndices<'_>>, expected: char) -> bool {
    if chars.peek().map(|&(_, next)| next) == Some(expected) {
        chars.next();
        true
    } else {
        false
    }
}

fn next_is_digit(source: &str, offset: usize) -> bool {
    source
        .get(offset..)
        .and_then(|rest| rest.chars().next())
        .is_some_and(|ch| ch.is_ascii_digit())
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            Err(ExprError::TooDeep)
        } else {
            Ok(())
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == Some(&TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.peek_kind() == Some(&TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::And {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_relational()?;
        loop {
            let cmp = match self.peek_kind() {
                Some(TokenKind::LooseEq) => CompareOp::LooseEq,
                Some(TokenKind::LooseNe) => CompareOp::LooseNe,
                Some(TokenKind::StrictEq) => CompareOp::StrictEq,
                Some(TokenKind::StrictNe) => CompareOp::StrictNe,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::Compare {
                cmp,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let cmp = match self.peek_kind() {
                Some(TokenKind::Lt) => CompareOp::Lt,
                Some(TokenKind::Le) => CompareOp::Le,
                Some(TokenKind::Gt) => CompareOp::Gt,
                Some(TokenKind::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Compare {
                cmp,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let expr = match self.peek_kind() {
            Some(TokenKind::Bang) => {
                self.advance();
                Expr::Not {
                    expression: Box::new(self.parse_unary()?),
                }
            }
            Some(TokenKind::Minus) => {
                let minus = self.advance().ok_or(ExprError::UnexpectedEnd)?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::Number(number),
                        ..
                    }) => Expr::Literal {
                        value: number_literal(-number),
                    },
                    Some(token) => {
                        return Err(ExprError::UnexpectedToken {
                            found: token.kind.describe(),
                            offset: token.offset,
                        });
                    }
                    None => {
                        return Err(ExprError::UnexpectedToken {
                            found: minus.kind.describe(),
                            offset: minus.offset,
                        });
                    }
                }
            }
            _ => self.parse_primary()?,
        };
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.advance().ok_or(ExprError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(number) => Ok(Expr::Literal {
                value: number_literal(number),
            }),
            TokenKind::Str(text) => Ok(Expr::Literal {
                value: Value::String(text),
            }),
            TokenKind::True => Ok(Expr::Literal {
                value: Value::Bool(true),
            }),
            TokenKind::False => Ok(Expr::Literal {
                value: Value::Bool(false),
            }),
            TokenKind::Null => Ok(Expr::Literal { value: Value::Null }),
            TokenKind::Ident(name) => Ok(Expr::Var { name }),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken {
                        found: other.kind.describe(),
                        offset: other.offset,
                    }),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            other => Err(ExprError::UnexpectedToken {
                found: other.describe(),
                offset: token.offset,
            }),
        }
    }
}

fn number_literal(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answers(value: Value) -> AnswersMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn empty_condition_is_unconditional() {
        assert!(evaluate_condition(None, &AnswersMap::new()));
        assert!(evaluate_condition(Some("   "), &AnswersMap::new()));
    }

    #[test]
    fn equality_against_literals() {
        let answers = answers(json!({ "x": 2, "color": "red", "agree": true }));
        assert!(evaluate_condition(Some("x == 2"), &answers));
        assert!(evaluate_condition(Some("x == '2'"), &answers));
        assert!(!evaluate_condition(Some("x === '2'"), &answers));
        assert!(evaluate_condition(Some("color != \"blue\""), &answers));
        assert!(evaluate_condition(Some("agree == true"), &answers));
    }

    #[test]
    fn logical_operators_and_grouping() {
        let answers = answers(json!({ "a": 1, "b": 2 }));
        assert!(evaluate_condition(Some("a == 1 && b == 2"), &answers));
        assert!(evaluate_condition(Some("a == 5 || b == 2"), &answers));
        assert!(!evaluate_condition(Some("a == 1 && (b == 3 || b == 4)"), &answers));
        assert!(evaluate_condition(Some("!(a == 2)"), &answers));
    }

    #[test]
    fn relational_operators_compare_numerically() {
        let answers = answers(json!({ "age": "21" }));
        assert!(evaluate_condition(Some("age >= 18"), &answers));
        assert!(!evaluate_condition(Some("age < 18"), &answers));
        assert!(evaluate_condition(Some("age > -1"), &answers));
    }

    #[test]
    fn missing_answer_makes_condition_false() {
        let answers = answers(json!({ "a": 1 }));
        assert!(!evaluate_condition(Some("b == 1"), &answers));
        assert!(!evaluate_condition(Some("a == 1 || b == 1"), &answers));
        assert!(!evaluate_condition(Some("b != 1"), &answers));
    }

    #[test]
    fn malformed_conditions_are_false() {
        let answers = answers(json!({ "a": 1 }));
        assert!(!evaluate_condition(Some("a =="), &answers));
        assert!(!evaluate_condition(Some("a = 1"), &answers));
        assert!(!evaluate_condition(Some("(a == 1"), &answers));
        assert!(!evaluate_condition(Some("alert('x'); a == 1"), &answers));
        assert!(!evaluate_condition(Some("a.constructor == 1"), &answers));
    }

    #[test]
    fn parse_errors_report_offsets() {
        assert_eq!(
            Expr::parse("a == 'open"),
            Err(ExprError::UnterminatedString { offset: 5 })
        );
        assert_eq!(
            Expr::parse("a # b"),
            Err(ExprError::UnexpectedChar { ch: '#', offset: 2 })
        );
        assert_eq!(Expr::parse("a &&"), Err(ExprError::UnexpectedEnd));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("{}a{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(Expr::parse(&source), Err(ExprError::TooDeep));
    }

    #[test]
    fn identifiers_are_collected() {
        let expr = Expr::parse("q1 == 'yes' && (q2 > 3 || !q3)").expect("parse");
        let names: Vec<_> = expr.identifiers().into_iter().collect();
        assert_eq!(names, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn source_round_trips_through_parser() {
        let expr = Expr::parse("a == 1 && (b || !c)").expect("parse");
        let reparsed = Expr::parse(&expr.to_source()).expect("reparse");
        assert_eq!(expr, reparsed);
    }

    #[test]
    fn bare_identifier_uses_truthiness() {
        let answers = answers(json!({ "opt_in": false, "nickname": "bo" }));
        assert!(!evaluate_condition(Some("opt_in"), &answers));
        assert!(evaluate_condition(Some("nickname"), &answers));
    }
}
