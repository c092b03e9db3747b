use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::sheet::GradingConvention;

pub const TEXT_INPUT_MAX_CHARS: usize = 500;

static SCRIPT_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)javascript:").expect("script scheme pattern"));
static EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)on\w+\s*=").expect("event handler pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    Grade,
    Counter,
    Text,
}

/// Constrain a typed grade to `[0, max_grade]`.
///
/// Keeps digits and the first decimal point; the digits after any later dot are
/// folded into the fractional part. Text that does not parse becomes `""`. A value
/// above the maximum is replaced by the maximum, anything else is returned as typed.
pub fn validate_grade_input(raw: &str, max_grade: f64) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut seen_dot = false;
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            cleaned.push(ch);
        } else if ch == '.' && !seen_dot {
            seen_dot = true;
            cleaned.push(ch);
        }
    }

    let Ok(value) = cleaned.parse::<f64>() else {
        return String::new();
    };
    if !value.is_finite() {
        return String::new();
    }
    if value > max_grade {
        return format_number(max_grade);
    }
    cleaned
}

/// Digits only, for lesson/hour counters.
pub fn validate_numeric_input(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn sanitize_text_input(raw: &str) -> String {
    let mut out: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
    // Removing one match can splice a new one together, so run to a fixed point.
    loop {
        let next = SCRIPT_SCHEME.replace_all(&out, "");
        let next = EVENT_HANDLER.replace_all(&next, "").into_owned();
        if next == out {
            break;
        }
        out = next;
    }
    out.chars().take(TEXT_INPUT_MAX_CHARS).collect()
}

pub fn validate_input(kind: InputKind, raw: &str, convention: GradingConvention) -> String {
    match kind {
        InputKind::Grade => validate_grade_input(raw, convention.max_grade()),
        InputKind::Counter => validate_numeric_input(raw),
        InputKind::Text => sanitize_text_input(raw),
    }
}

/// Render a number without a trailing `.0` for whole values.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_range_or_empty(out: &str, max: f64) -> bool {
        out.is_empty()
            || out
                .parse::<f64>()
                .map(|v| (0.0..=max).contains(&v))
                .unwrap_or(false)
    }

    #[test]
    fn grade_input_is_empty_or_within_bounds() {
        let samples = [
            "", "abc", ".", "..", "12", "12.5", "12.", ".5", "-4", "25", "1.2.3", "1e9", "20,5",
            " 7 ", "100", "150.75", "0", "0000", "19.999", "٣",
        ];
        for max in [20.0, 100.0] {
            for s in samples {
                let out = validate_grade_input(s, max);
                assert!(in_range_or_empty(&out, max), "{s:?} -> {out:?} (max {max})");
            }
        }
    }

    #[test]
    fn grade_input_clamps_and_collapses_dots() {
        assert_eq!(validate_grade_input("25", 20.0), "20");
        assert_eq!(validate_grade_input("25", 100.0), "25");
        assert_eq!(validate_grade_input("150.5", 100.0), "100");
        assert_eq!(validate_grade_input("1.2.3", 20.0), "1.23");
        assert_eq!(validate_grade_input("-4", 20.0), "4");
        assert_eq!(validate_grade_input("12.", 20.0), "12.");
        assert_eq!(validate_grade_input("abc", 20.0), "");
        assert_eq!(validate_grade_input(".", 20.0), "");
    }

    #[test]
    fn numeric_input_keeps_digits() {
        assert_eq!(validate_numeric_input("12h30"), "1230");
        assert_eq!(validate_numeric_input("-"), "");
    }

    #[test]
    fn sanitize_strips_markup_and_handlers() {
        let out = sanitize_text_input("<script>alert(1)</script>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));
        assert!(!out.to_ascii_lowercase().contains("javascript:"));

        let out = sanitize_text_input("a href=JavaScript:alert(1) onClick = x");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
        assert!(!out.to_ascii_lowercase().contains("onclick"));

        let out = sanitize_text_input("javajavascript:script:go");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
    }

    #[test]
    fn sanitize_truncates_by_chars() {
        let long = "é".repeat(600);
        assert_eq!(sanitize_text_input(&long).chars().count(), TEXT_INPUT_MAX_CHARS);
    }

    #[test]
    fn validate_input_dispatches_on_kind() {
        assert_eq!(
            validate_input(InputKind::Grade, "35", GradingConvention::TwentyPoint),
            "20"
        );
        assert_eq!(
            validate_input(InputKind::Grade, "35", GradingConvention::HundredPoint),
            "35"
        );
        assert_eq!(
            validate_input(InputKind::Counter, "4 lessons", GradingConvention::TwentyPoint),
            "4"
        );
        assert_eq!(
            validate_input(InputKind::Text, "<b>ok</b>", GradingConvention::TwentyPoint),
            "bok/b"
        );
    }
}
