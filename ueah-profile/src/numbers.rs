//! Numeric coercion helpers centralizing safe casts for untyped input.

use num_traits::cast::cast;
use serde_json::Value;

use crate::constants::{SCORE_MAX, SCORE_MIN};

/// Coerce a loosely-typed JSON value into a finite number.
///
/// Missing, `null`, blank strings, containers and anything that does not
/// parse to a finite number yield `None`. Booleans count as `1`/`0`.
#[must_use]
pub fn number_or_null(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }?;
    number.is_finite().then_some(number)
}

/// Round a score and clamp it into `0..=100`, returning 0 for NaN.
#[must_use]
pub fn clamp_score(value: f64) -> u8 {
    if value.is_nan() {
        return SCORE_MIN;
    }
    let clamped = value
        .round()
        .clamp(f64::from(SCORE_MIN), f64::from(SCORE_MAX));
    cast::<f64, u8>(clamped).unwrap_or(SCORE_MIN)
}

/// Rounded arithmetic mean of a set of scores.
#[must_use]
pub fn mean_score(scores: &[u8]) -> Option<u8> {
    if scores.is_empty() {
        return None;
    }
    let total: u32 = scores.iter().map(|&s| u32::from(s)).sum();
    let count = cast::<usize, f64>(scores.len())?;
    Some(clamp_score(f64::from(total) / count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_or_null_follows_loose_coercion() {
        assert_eq!(number_or_null(None), None);
        assert_eq!(number_or_null(Some(&Value::Null)), None);
        assert_eq!(number_or_null(Some(&json!(""))), None);
        assert_eq!(number_or_null(Some(&json!("   "))), None);
        assert_eq!(number_or_null(Some(&json!("abc"))), None);
        assert_eq!(number_or_null(Some(&json!(" 42 "))), Some(42.0));
        assert_eq!(number_or_null(Some(&json!(7.5))), Some(7.5));
        assert_eq!(number_or_null(Some(&json!(true))), Some(1.0));
        assert_eq!(number_or_null(Some(&json!([1]))), None);
        assert_eq!(number_or_null(Some(&json!("NaN"))), None);
        assert_eq!(number_or_null(Some(&json!("inf"))), None);
    }

    #[test]
    fn clamp_score_rounds_and_bounds() {
        assert_eq!(clamp_score(150.0), 100);
        assert_eq!(clamp_score(-20.0), 0);
        assert_eq!(clamp_score(74.5), 75);
        assert_eq!(clamp_score(74.4), 74);
        assert_eq!(clamp_score(f64::NAN), 0);
        assert_eq!(clamp_score(f64::INFINITY), 100);
    }

    #[test]
    fn mean_score_rounds_to_nearest() {
        assert_eq!(mean_score(&[80, 70, 60, 90]), Some(75));
        assert_eq!(mean_score(&[1, 2]), Some(2));
        assert_eq!(mean_score(&[]), None);
    }
}
