use serde_json::Value;

use crate::coerce::{strict_eq, to_display_string};

/// Whether a submitted answer matches the declared correct answer.
///
/// Sequences compare as sets (both sides sorted, then element-wise strict
/// equality). Everything else compares as trimmed, case-insensitive strings so
/// `5` matches `"5 "` and `"paris "` matches `"Paris"`.
pub fn is_correct(user_answer: Option<&Value>, correct_answer: Option<&Value>) -> bool {
    let Some(correct) = correct_answer else {
        return false;
    };
    let user = match user_answer {
        None | Some(Value::Null) => return false,
        Some(Value::String(text)) if text.is_empty() => return false,
        Some(user) => user,
    };

    if let Value::Array(expected) = correct {
        let Value::Array(given) = user else {
            return false;
        };
        if given.len() != expected.len() {
            return false;
        }
        let given = sorted(given);
        let expected = sorted(expected);
        return given
            .iter()
            .zip(expected.iter())
            .all(|(left, right)| strict_eq(left, right));
    }

    normalize(user) == normalize(correct)
}

fn normalize(value: &Value) -> String {
    to_display_string(value).trim().to_lowercase()
}

fn sorted(values: &[Value]) -> Vec<&Value> {
    let mut values = values.iter().collect::<Vec<_>>();
    values.sort_by_cached_key(|value| to_display_string(value));
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequences_compare_as_sets() {
        assert!(is_correct(Some(&json!(["b", "a"])), Some(&json!(["a", "b"]))));
        assert!(is_correct(Some(&json!([2, 1, 3])), Some(&json!([1, 2, 3]))));
        assert!(!is_correct(Some(&json!(["a"])), Some(&json!(["a", "b"]))));
        assert!(!is_correct(Some(&json!(["a", "c"])), Some(&json!(["a", "b"]))));
        assert!(!is_correct(Some(&json!("a,b")), Some(&json!(["a", "b"]))));
    }

    #[test]
    fn sequence_members_need_matching_types() {
        assert!(!is_correct(Some(&json!(["1", "2"])), Some(&json!([1, 2]))));
    }

    #[test]
    fn scalars_compare_loosely_after_trimming() {
        assert!(is_correct(Some(&json!("5")), Some(&json!(5))));
        assert!(is_correct(Some(&json!("5 ")), Some(&json!(5))));
        assert!(is_correct(Some(&json!(5)), Some(&json!("  5"))));
        assert!(is_correct(Some(&json!("paris ")), Some(&json!("Paris"))));
        assert!(is_correct(Some(&json!(2.5)), Some(&json!("2.5"))));
    }

    #[test]
    fn booleans_compare_by_their_text() {
        assert!(is_correct(Some(&json!(true)), Some(&json!("true"))));
        assert!(is_correct(Some(&json!(false)), Some(&json!("FALSE"))));
        assert!(!is_correct(Some(&json!(true)), Some(&json!(1))));
        assert!(!is_correct(Some(&json!(1)), Some(&json!(true))));
    }

    #[test]
    fn missing_or_blank_answers_are_wrong() {
        assert!(!is_correct(Some(&json!("")), Some(&json!("5"))));
        assert!(!is_correct(None, Some(&json!("5"))));
        assert!(!is_correct(Some(&json!(null)), Some(&json!("null"))));
        assert!(!is_correct(Some(&json!("5")), None));
    }

    #[test]
    fn zero_is_a_real_answer() {
        assert!(is_correct(Some(&json!(0)), Some(&json!("0"))));
    }
}
