//! Arithmetic evaluation over flattened expression text
//!
//! Used by the failure explainer, which only ever sees rendered strings. The
//! grammar is deliberately small: `+ - * / %`, unary minus, parentheses and
//! numeric literals. Anything else (identifiers with no value, array accesses,
//! calls) evaluates to `0`.

use regex::Regex;
use std::collections::BTreeMap;

/// Evaluate arithmetic text; whitespace is ignored
///
/// Right-to-left scanning at depth zero makes `-` and `/` left-associative:
/// `8 - 3 - 2` is `(8 - 3) - 2`.
pub fn evaluate(text: &str) -> f64 {
    let compact: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    additive(&compact)
}

/// Substitute `values` into `text` (whole words only) and evaluate
pub fn evaluate_with(text: &str, values: &BTreeMap<String, f64>) -> f64 {
    evaluate(&substitute_values(text, values))
}

/// Replace whole-word occurrences of each name with its value
///
/// Negative values are parenthesized so `a - b` with `b = -2` becomes
/// `a - (-2)`. Longer names are replaced first so `ab` is never clobbered by `a`.
pub fn substitute_values(text: &str, values: &BTreeMap<String, f64>) -> String {
    let mut names: Vec<&String> = values.keys().collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut out = text.to_string();
    for name in names {
        let value = values[name];
        let rendered = if value < 0.0 {
            format!("({})", format_number(value))
        } else {
            format_number(value)
        };
        out = replace_word(&out, name, &rendered);
    }
    out
}

/// Replace whole-word occurrences of `word` in `text`
pub fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    match word_pattern(word) {
        Some(pattern) => pattern
            .replace_all(text, regex::NoExpand(replacement))
            .into_owned(),
        None => text.to_string(),
    }
}

/// Whole-word pattern for a name that may itself contain `.` or `[...]`
fn word_pattern(name: &str) -> Option<Regex> {
    let first = name.chars().next()?;
    let last = name.chars().last()?;
    let is_word = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut pattern = String::new();
    if is_word(first) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(name));
    if is_word(last) {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern).ok()
}

/// Render a number the way the explainer prints it: integral values without a fraction
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Rewrite `!(x CMP y)` into the complementary comparison
///
/// `>=` -> `<`, `<=` -> `>`, `==` -> `!=`, `!=` -> `==`, `>` -> `<=`, `<` -> `>=`.
/// Input that is not a negation, or whose body joins several comparisons with
/// `&&`/`||`, is returned unchanged.
pub fn normalize_negation(condition: &str) -> String {
    let trimmed = condition.trim();
    let Some(rest) = trimmed.strip_prefix('!') else {
        return condition.to_string();
    };
    let rest = rest.trim();
    let inner = if rest.starts_with('(') && closing_paren(rest.as_bytes(), 0) == Some(rest.len() - 1)
    {
        &rest[1..rest.len() - 1]
    } else {
        rest
    };

    if inner.contains("&&") || inner.contains("||") {
        return condition.to_string();
    }

    if inner.contains(">=") {
        inner.replace(">=", "<")
    } else if inner.contains("<=") {
        inner.replace("<=", ">")
    } else if inner.contains("==") {
        inner.replace("==", "!=")
    } else if inner.contains("!=") {
        inner.replace("!=", "==")
    } else if inner.contains('>') {
        inner.replace('>', "<=")
    } else if inner.contains('<') {
        inner.replace('<', ">=")
    } else {
        condition.to_string()
    }
}

/// Index of the parenthesis closing the one at `open`
fn closing_paren(s: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, &b) in s.iter().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A `+`/`-` at `i` is binary unless it follows another operator or an opening
/// parenthesis, or is the sign of an exponent (`1e-5`)
fn is_binary_sign(s: &[u8], i: usize) -> bool {
    if i == 0 {
        return false;
    }
    let prev = s[i - 1];
    if matches!(prev, b'(' | b'*' | b'/' | b'%' | b'+' | b'-') {
        return false;
    }
    if matches!(prev, b'e' | b'E') && i >= 2 && s[i - 2].is_ascii_digit() {
        let start = s[..i - 1]
            .iter()
            .rposition(|b| !(b.is_ascii_digit() || *b == b'.'))
            .map_or(0, |p| p + 1);
        // only a number when the mantissa starts the token
        if start == 0 || !s[start - 1].is_ascii_alphabetic() {
            return false;
        }
    }
    true
}

fn additive(s: &[u8]) -> f64 {
    let mut depth = 0i32;
    for i in (0..s.len()).rev() {
        match s[i] {
            b')' => depth += 1,
            b'(' => depth -= 1,
            b'+' | b'-' if depth == 0 && is_binary_sign(s, i) => {
                let left = additive(&s[..i]);
                let right = multiplicative(&s[i + 1..]);
                return if s[i] == b'+' {
                    left + right
                } else {
                    left - right
                };
            }
            _ => {}
        }
    }
    multiplicative(s)
}

fn multiplicative(s: &[u8]) -> f64 {
    let mut depth = 0i32;
    for i in (0..s.len()).rev() {
        match s[i] {
            b')' => depth += 1,
            b'(' => depth -= 1,
            b'*' | b'/' | b'%' if depth == 0 && i > 0 => {
                let left = multiplicative(&s[..i]);
                let right = primary(&s[i + 1..]);
                return match s[i] {
                    b'*' => left * right,
                    b'/' => left / right,
                    _ => left % right,
                };
            }
            _ => {}
        }
    }
    primary(s)
}

fn primary(s: &[u8]) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    if s[0] == b'(' && closing_paren(s, 0) == Some(s.len() - 1) {
        return additive(&s[1..s.len() - 1]);
    }
    match s[0] {
        b'-' => return -primary(&s[1..]),
        b'+' => return primary(&s[1..]),
        _ => {}
    }
    let text = String::from_utf8_lossy(s);
    match text.parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            tracing::debug!(operand = %text, "unresolved operand evaluates to 0");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_grouped_difference() {
        assert_eq!(evaluate("(2 + 3) - (2 * 3)"), -1.0);
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(evaluate("8 - 3 - 2"), 3.0);
        assert_eq!(evaluate("24 / 4 / 2"), 3.0);
        assert_eq!(evaluate("2 + 3 * 4"), 14.0);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(evaluate("-5"), -5.0);
        assert_eq!(evaluate("2 * -3"), -6.0);
        assert_eq!(evaluate("4 - (-2)"), 6.0);
        assert_eq!(evaluate("-(1 + 2)"), -3.0);
    }

    #[test]
    fn test_unresolved_operands_are_zero() {
        assert_eq!(evaluate("x"), 0.0);
        assert_eq!(evaluate("arr[0] + 1"), 1.0);
        assert_eq!(evaluate(""), 0.0);
    }

    #[test]
    fn test_decimal_and_exponent() {
        assert_eq!(evaluate("0.5 * 4"), 2.0);
        assert_eq!(evaluate("1e-1 * 10"), 1.0);
    }

    #[test]
    fn test_substitution_whole_words() {
        let vals = values(&[("a", 2.0), ("ab", 10.0), ("b", -3.0)]);
        assert_eq!(substitute_values("ab + a - b", &vals), "10 + 2 - (-3)");
        assert_eq!(evaluate_with("ab + a - b", &vals), 15.0);
    }

    #[test]
    fn test_replace_word_is_literal() {
        assert_eq!(replace_word("x + xy", "x", "$1"), "$1 + xy");
        assert_eq!(replace_word("arr[0] * 2", "arr[0]", "(a + b)"), "(a + b) * 2");
    }

    #[test]
    fn test_substitution_of_dotted_names() {
        let vals = values(&[("p.age", 30.0), ("arr[0]", 4.0)]);
        assert_eq!(evaluate_with("p.age - arr[0]", &vals), 26.0);
    }

    #[test]
    fn test_normalize_negation() {
        assert_eq!(normalize_negation("!(x >= y)"), "x < y");
        assert_eq!(normalize_negation("!(x <= y)"), "x > y");
        assert_eq!(normalize_negation("!(x == y)"), "x != y");
        assert_eq!(normalize_negation("!(x != y)"), "x == y");
        assert_eq!(normalize_negation("!(x > y)"), "x <= y");
        assert_eq!(normalize_negation("!(x < y)"), "x >= y");
    }

    #[test]
    fn test_normalize_negation_leaves_others() {
        assert_eq!(normalize_negation("(x > y)"), "(x > y)");
        assert_eq!(normalize_negation("!(flag)"), "!(flag)");
        assert_eq!(normalize_negation("!(a > 0 && b > 0)"), "!(a > 0 && b > 0)");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-1.0), "-1");
        assert_eq!(format_number(2.5), "2.5");
    }
}
